#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Venue Stream Ingest - Multi-venue Market Data Ingestion
//!
//! Keeps one supervised connection per trading venue, normalizes every
//! venue's spelling of the tracked instrument to a single canonical symbol
//! (`TONUSDT`) and republishes top-of-book and mark prices on typed output
//! channels.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Canonical types, no I/O
//!   - `symbol`: Venue spelling → canonical symbol
//!   - `market_data`: Price / order-book / trade events, top-of-book extraction
//!
//! - **Application**: Port definitions
//!   - `ports`: The `FeedAdapter` contract and market map types
//!
//! - **Infrastructure**: Adapters and runtime
//!   - `venues`: DeDust, Extended, Lighter, Variational, Vest
//!   - `supervisor`: Generic reconnecting / polling loop per venue
//!   - `broadcast`: Bounded output channels
//!   - `config`, `metrics`, `telemetry`: Ambient services
//!
//! # Data Flow
//!
//! ```text
//! DeDust REST ───────┐
//! Extended WS ───────┤     ┌────────────┐     ┌──────────┐
//! Lighter WS ────────┼────►│ Supervisor │────►│ EventHub │──► prices
//! Variational REST ──┤     │ (per venue)│     │          │──► orderbooks
//! Vest WS ───────────┘     └────────────┘     └──────────┘──► trades
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Canonical types with no external dependencies.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market_data::{
    FeedEvent, OrderbookEvent, PriceEvent, TradeEvent, TradeSide, Venue,
};
pub use domain::symbol::{CanonicalSymbol, SymbolCanonicalizer};

// Ports
pub use application::ports::{FeedAdapter, MarketBinding, MarketMap, Transport, VenueMarketId};

// Infrastructure config
pub use infrastructure::config::{ConfigError, IngestConfig};

// Output hub
pub use infrastructure::broadcast::{EventHub, HubConfig, OverflowPolicy, SharedEventHub};

// Supervisors
pub use infrastructure::supervisor::{FeedSupervisor, SupervisorSet, SupervisorSettings};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
