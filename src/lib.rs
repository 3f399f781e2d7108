pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod types;

// Layered boundaries: async ports and their infrastructure adapters
pub mod app;
pub mod infra;
