//! RedDisc Observability
//!
//! This crate provides observability features:
//! - Structured logging setup
//! - Metrics collection (Prometheus)
//! - Health and metrics endpoints

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{HealthState, health_router};
pub use logging::{LoggingConfig, init_logging};
pub use metrics::Metrics;
