// Core modules
pub mod analyzer;
pub mod api;
pub mod config;
pub mod db;
pub mod execution;
pub mod models;
pub mod profit;
pub mod sampler;

// Re-export commonly used types
pub use api::Exchange;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
