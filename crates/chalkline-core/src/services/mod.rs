pub mod sessions;

pub use sessions::SessionService;
