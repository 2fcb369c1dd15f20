//! Market Data Types
//!
//! Canonical event types republished by every venue supervisor, plus the
//! shared best-bid / best-ask extraction used by the order-book parsers.
//!
//! These types are codec-agnostic: each venue adapter decodes its own wire
//! format and produces one of the [`FeedEvent`] variants.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::symbol::CanonicalSymbol;

// =============================================================================
// Venue
// =============================================================================

/// Trading venues this engine ingests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    /// DeDust AMM pools (spot, REST polled).
    #[serde(rename = "DeDust")]
    DeDust,
    /// Extended perpetual futures (WebSocket order book).
    #[serde(rename = "extended_futures")]
    Extended,
    /// Lighter perpetual futures (WebSocket order book).
    #[serde(rename = "lighter_futures")]
    Lighter,
    /// Variational perpetuals (REST polled quotes / mark).
    #[serde(rename = "variational_perps")]
    Variational,
    /// Vest perpetual futures (WebSocket depth).
    #[serde(rename = "vest_futures")]
    Vest,
}

impl Venue {
    /// Every supported venue, in start-up order.
    pub const ALL: [Self; 5] = [
        Self::DeDust,
        Self::Extended,
        Self::Lighter,
        Self::Variational,
        Self::Vest,
    ];

    /// Source tag written into every event from this venue.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeDust => "DeDust",
            Self::Extended => "extended_futures",
            Self::Lighter => "lighter_futures",
            Self::Variational => "variational_perps",
            Self::Vest => "vest_futures",
        }
    }

    /// Short lower-case name used in configuration and metric labels.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::DeDust => "dedust",
            Self::Extended => "extended",
            Self::Lighter => "lighter",
            Self::Variational => "variational",
            Self::Vest => "vest",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a venue name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown venue: {0}")]
pub struct UnknownVenue(pub String);

impl FromStr for Venue {
    type Err = UnknownVenue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|venue| venue.key() == wanted || venue.as_str().to_lowercase() == wanted)
            .ok_or_else(|| UnknownVenue(s.trim().to_string()))
    }
}

// =============================================================================
// Canonical Events
// =============================================================================

/// A single mark / derived price from a venue that exposes no book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEvent {
    /// Canonical instrument.
    pub symbol: CanonicalSymbol,
    /// Venue that produced the price.
    pub source: Venue,
    /// Price, always strictly positive.
    pub price: Decimal,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Top-of-book snapshot from a venue that exposes depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookEvent {
    /// Canonical instrument.
    pub symbol: CanonicalSymbol,
    /// Venue that produced the book.
    pub source: Venue,
    /// Highest bid price.
    pub best_bid: Decimal,
    /// Lowest ask price.
    pub best_ask: Decimal,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl OrderbookEvent {
    /// Whether the best bid is above the best ask.
    ///
    /// Crossed books are still published; callers flag them.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        self.best_bid > self.best_ask
    }
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buyer-initiated.
    Buy,
    /// Seller-initiated.
    Sell,
}

/// An executed trade.
///
/// Reserved on the output contract: no venue currently produces trades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Canonical instrument.
    pub symbol: CanonicalSymbol,
    /// Venue the trade printed on.
    pub source: Venue,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Aggressor side, when the venue reports one.
    pub side: Option<TradeSide>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Any canonical event a venue parser can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Mark / derived price.
    Price(PriceEvent),
    /// Top of book.
    Orderbook(OrderbookEvent),
    /// Executed trade.
    Trade(TradeEvent),
}

impl FeedEvent {
    /// Canonical symbol of the event.
    #[must_use]
    pub const fn symbol(&self) -> &CanonicalSymbol {
        match self {
            Self::Price(e) => &e.symbol,
            Self::Orderbook(e) => &e.symbol,
            Self::Trade(e) => &e.symbol,
        }
    }

    /// Venue of the event.
    #[must_use]
    pub const fn source(&self) -> Venue {
        match self {
            Self::Price(e) => e.source,
            Self::Orderbook(e) => e.source,
            Self::Trade(e) => e.source,
        }
    }

    /// Short label of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Price(_) => "price",
            Self::Orderbook(_) => "orderbook",
            Self::Trade(_) => "trade",
        }
    }
}

// =============================================================================
// Top-of-Book Extraction
// =============================================================================

/// Best bid and best ask extracted from a set of price levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopOfBook {
    /// Highest parseable bid price.
    pub best_bid: Decimal,
    /// Lowest parseable ask price.
    pub best_ask: Decimal,
}

impl TopOfBook {
    /// Scan bid and ask price strings and keep the best of each side.
    ///
    /// Unparseable and non-positive prices are skipped. Returns `None` when
    /// either side has no usable price at all.
    pub fn from_levels<'a, B, A>(bids: B, asks: A) -> Option<Self>
    where
        B: IntoIterator<Item = &'a str>,
        A: IntoIterator<Item = &'a str>,
    {
        let best_bid = bids.into_iter().filter_map(parse_positive).max()?;
        let best_ask = asks.into_iter().filter_map(parse_positive).min()?;
        Some(Self { best_bid, best_ask })
    }

    /// Build the canonical order-book event for this top of book.
    #[must_use]
    pub fn into_event(self, symbol: CanonicalSymbol, source: Venue, timestamp: i64) -> OrderbookEvent {
        OrderbookEvent {
            symbol,
            source,
            best_bid: self.best_bid,
            best_ask: self.best_ask,
            timestamp,
        }
    }
}

/// Parse a venue decimal string, tolerating surrounding whitespace and
/// scientific notation.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Parse a venue decimal string and keep it only if strictly positive.
#[must_use]
pub fn parse_positive(raw: &str) -> Option<Decimal> {
    parse_decimal(raw).filter(|value| value.is_sign_positive() && !value.is_zero())
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Use the venue timestamp when present and positive, otherwise stamp with
/// ingestion time.
#[must_use]
pub fn venue_or_now(venue_ts: Option<i64>) -> i64 {
    venue_ts.filter(|ts| *ts > 0).unwrap_or_else(now_millis)
}

// =============================================================================
// Tests
// =============================================================================
