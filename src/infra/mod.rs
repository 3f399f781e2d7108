#[cfg(feature = "browser")]
pub mod browser;
pub mod http_client;
pub mod job_api;
