//! Core types for the backup monitor.
//!
//! - **IDs**: Opaque subscription tokens handed out by a notification bus
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration for logging and monitor delivery behavior

mod config;
mod errors;
mod ids;

pub use config::{
    Config, MalformedPayloadPolicy, MonitorConfig, ObservabilityConfig, ENV_LOG_FORMAT,
    ENV_LOG_LEVEL, ENV_STRICT_PAYLOADS,
};
pub use errors::{Error, Result};
pub use ids::SubscriptionToken;
