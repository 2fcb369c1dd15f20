//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Events**: canonical events published, per venue and kind
//! - **Drops**: payloads that produced no event, hub overflow
//! - **Connections**: live WebSocket connections and reconnects per venue
//! - **Polling**: failed poll cycles per venue
//! - **Quality**: crossed books seen per venue
//!
//! # Integration
//!
//! Metrics are served at `/metrics` on `INGEST_METRICS_PORT` by the
//! exporter's own HTTP listener. Until [`init_metrics`] runs, every
//! recording function is a no-op.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::market_data::Venue;

// =============================================================================
// Exporter Installation
// =============================================================================

/// Install the Prometheus recorder and start its HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// address cannot be bound.
pub fn init_metrics(port: u16) -> Result<SocketAddr, BuildError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    Ok(addr)
}

fn register_metrics() {
    describe_counter!(
        "venue_ingest_events_published_total",
        "Canonical events published to the output hub"
    );
    describe_counter!(
        "venue_ingest_messages_dropped_total",
        "Venue payloads that produced no published event"
    );
    describe_counter!(
        "venue_ingest_reconnects_total",
        "WebSocket reconnection attempts"
    );
    describe_gauge!(
        "venue_ingest_connections",
        "Live WebSocket connections per venue"
    );
    describe_counter!(
        "venue_ingest_poll_failures_total",
        "Failed REST poll cycles"
    );
    describe_counter!(
        "venue_ingest_crossed_books_total",
        "Order book events with best bid above best ask"
    );
    describe_counter!(
        "venue_ingest_hub_dropped_total",
        "Events discarded by the output hub overflow policy"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a payload produced no published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payload was malformed, unrelated or had no usable prices.
    Unparseable,
    /// The consumer side of the hub is gone.
    HubClosed,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Unparseable => "unparseable",
            Self::HubClosed => "hub_closed",
        }
    }
}

/// Record a canonical event published to the hub.
pub fn record_event_published(venue: Venue, kind: &'static str) {
    counter!(
        "venue_ingest_events_published_total",
        "venue" => venue.key(),
        "kind" => kind
    )
    .increment(1);
}

/// Record a payload that produced no published event.
pub fn record_message_dropped(venue: Venue, reason: DropReason) {
    counter!(
        "venue_ingest_messages_dropped_total",
        "venue" => venue.key(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a WebSocket reconnection attempt.
pub fn record_reconnect(venue: Venue) {
    counter!("venue_ingest_reconnects_total", "venue" => venue.key()).increment(1);
}

/// Mark a venue's WebSocket as connected or disconnected.
pub fn set_connected(venue: Venue, connected: bool) {
    gauge!("venue_ingest_connections", "venue" => venue.key()).set(if connected { 1.0 } else { 0.0 });
}

/// Record a failed poll cycle.
pub fn record_poll_failure(venue: Venue) {
    counter!("venue_ingest_poll_failures_total", "venue" => venue.key()).increment(1);
}

/// Record a crossed order book.
pub fn record_crossed_book(venue: Venue) {
    counter!("venue_ingest_crossed_books_total", "venue" => venue.key()).increment(1);
}

/// Record events discarded by the hub's overflow policy.
pub fn record_hub_dropped(channel: &'static str, count: u64) {
    counter!("venue_ingest_hub_dropped_total", "channel" => channel).increment(count);
}

// =============================================================================
// Tests
// =============================================================================
