mod client;

pub use client::{ApiClient, ApiError, ApiRequest, ApiResponse, ApiResult};
