pub mod app;
pub mod config;
pub mod decision;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod preprocessing;
pub mod server;
pub mod telemetry;
pub mod worker;

// Re-export common types
pub use error::{ApiError, InferenceError};
