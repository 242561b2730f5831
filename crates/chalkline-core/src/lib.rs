//! Core library for the Chalkline learning platform clients: credential
//! storage, single-flight token refresh, and the authenticated call wrapper
//! shared by the CLI and other front-ends.

pub mod api;
pub mod auth;
pub mod config;
pub mod registry;
pub mod services;
