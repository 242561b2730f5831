mod client;
mod types;

pub use client::{RegistryClient, RegistryEndpoints};
pub use types::{LoginSuccess, SessionRecord};

pub(crate) use types::LogoutAllResponse;
