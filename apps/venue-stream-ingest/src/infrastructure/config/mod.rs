//! Configuration Module
//!
//! Configuration loading for the ingestion service.

mod settings;

pub use settings::{AuthToken, ConfigError, IngestConfig, ServerSettings, TimingSettings};
