//! Infrastructure Layer - Adapters and external integrations.
//!
//! Venue adapters implement the feed port; the supervisor drives them and
//! publishes into the broadcast hub.

/// Output event hub.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Per-venue connection supervisors.
pub mod supervisor;

/// Logging and OpenTelemetry tracing setup.
pub mod telemetry;

/// Venue adapters.
pub mod venues;
