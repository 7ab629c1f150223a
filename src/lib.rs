// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod analyze;
pub mod api;
pub mod bootstrap;
pub mod category;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod lms;
pub mod metrics;
pub mod orchestrator;
pub mod prediction;
pub mod ratings;
pub mod strength;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::api::router;
pub use crate::error::PredictError;
pub use crate::orchestrator::{PredictRequest, Predictor};
