//! Port Interfaces
//!
//! Defines the feed adapter contract every venue implements. The
//! supervisor state machine is written once against [`FeedAdapter`] and
//! parameterized by the adapter, so a venue only supplies:
//!
//! - `resolve_market`: one-time discovery of its internal market identifier
//! - `bind`: choice of the market to follow for the tracked symbol
//! - `transport`: how to reach the data (REST poll or WebSocket stream)
//! - `parse_message`: decoding of one raw payload into a canonical event

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::market_data::{FeedEvent, Venue};
use crate::domain::symbol::{CanonicalSymbol, SymbolCanonicalizer};

// =============================================================================
// Market Map
// =============================================================================

/// Venue-internal identifier of a market, channel or pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VenueMarketId {
    /// Textual identifier (market name, ticker, pool asset address).
    Name(String),
    /// Numeric identifier (order-book id).
    Numeric(i64),
}

impl VenueMarketId {
    /// Build a textual identifier.
    #[must_use]
    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    /// Textual form, if this is a named market.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Numeric(_) => None,
        }
    }

    /// Numeric form, if this is a numbered market.
    #[must_use]
    pub const fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Name(_) => None,
            Self::Numeric(id) => Some(*id),
        }
    }
}

impl fmt::Display for VenueMarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Numeric(id) => write!(f, "{id}"),
        }
    }
}

/// Lookup from canonical symbol to venue market, built once per supervisor
/// start and immutable afterwards.
pub type MarketMap = HashMap<CanonicalSymbol, VenueMarketId>;

/// The market a supervisor follows for its canonical symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketBinding {
    /// Canonical symbol events are published under.
    pub symbol: CanonicalSymbol,
    /// Venue-internal market identifier.
    pub market: VenueMarketId,
}

impl MarketBinding {
    /// Create a binding.
    #[must_use]
    pub const fn new(symbol: CanonicalSymbol, market: VenueMarketId) -> Self {
        Self { symbol, market }
    }
}

// =============================================================================
// Transport Description
// =============================================================================

/// Periodic liveness message required by some WebSocket venues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    /// Interval between keep-alive messages.
    pub interval: Duration,
    /// Text frame to send.
    pub message: String,
}

/// Persistent WebSocket connection description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    /// WebSocket URL to dial.
    pub url: String,
    /// `User-Agent` header sent with the upgrade request.
    pub user_agent: Option<String>,
    /// Subscription handshake frames, sent in order after connecting.
    pub subscriptions: Vec<String>,
    /// Keep-alive requirement, if any.
    pub keep_alive: Option<KeepAlive>,
}

/// REST polling description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    /// URL fetched on every poll.
    pub url: String,
    /// `User-Agent` header sent with each request.
    pub user_agent: Option<String>,
}

/// How a supervisor reaches a venue's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Fetch a REST endpoint on a fixed timer.
    Poll(PollSpec),
    /// Hold a WebSocket connection and read frames.
    Stream(StreamSpec),
}

// =============================================================================
// Errors
// =============================================================================

/// Failure of a one-shot REST fetch (market discovery or a poll cycle).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request could not be sent or the body could not be read.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Body was not the expected JSON document.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

// =============================================================================
// Feed Adapter
// =============================================================================

/// Venue-specific capabilities consumed by the generic feed supervisor.
///
/// Parsing never fails loudly: anything that cannot be turned into a
/// canonical event yields `None` and is dropped by the caller.
#[async_trait]
pub trait FeedAdapter: Send + Sync + 'static {
    /// Venue this adapter speaks to.
    fn venue(&self) -> Venue;

    /// Canonicalizer for the tracked instrument.
    fn canonicalizer(&self) -> &SymbolCanonicalizer;

    /// Discover the venue market(s) for the tracked instrument.
    ///
    /// An empty map is a valid result meaning "no qualifying market right
    /// now"; errors are reserved for transport and decode failures.
    async fn resolve_market(&self, http: &reqwest::Client) -> Result<MarketMap, FetchError>;

    /// Choose the market to follow for `symbol`.
    ///
    /// The default looks the symbol up in the discovered map. Venues with a
    /// fallback identifier override this to use it when discovery came back
    /// empty.
    fn bind(&self, symbol: &CanonicalSymbol, markets: &MarketMap) -> Option<MarketBinding> {
        markets
            .get(symbol)
            .map(|market| MarketBinding::new(symbol.clone(), market.clone()))
    }

    /// Describe how to reach the bound market.
    fn transport(&self, binding: &MarketBinding) -> Transport;

    /// Decode one raw payload into a canonical event.
    fn parse_message(&self, binding: &MarketBinding, payload: &[u8]) -> Option<FeedEvent>;
}

// =============================================================================
// Tests
// =============================================================================
