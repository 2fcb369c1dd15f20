//! Variational Quote Poller
//!
//! Variational publishes per-listing statistics including RFQ quotes for
//! fixed notional sizes. The 1k-notional quote is used as top of book;
//! when it is unusable the listing's mark price is published instead.
//!
//! # Endpoint
//!
//! - `GET https://omni-client-api.prod.ap-northeast-1.variational.io/metadata/stats`

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{
    FeedAdapter, FetchError, MarketBinding, MarketMap, PollSpec, Transport, VenueMarketId,
};
use crate::domain::market_data::{
    FeedEvent, OrderbookEvent, PriceEvent, Venue, now_millis, parse_positive,
};
use crate::domain::symbol::SymbolCanonicalizer;

use super::lenient_text;

/// Default statistics endpoint.
pub const DEFAULT_STATS_URL: &str =
    "https://omni-client-api.prod.ap-northeast-1.variational.io/metadata/stats";

/// Variational adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationalConfig {
    /// Statistics URL fetched on every poll.
    pub stats_url: String,
}

impl Default for VariationalConfig {
    fn default() -> Self {
        Self {
            stats_url: DEFAULT_STATS_URL.to_string(),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// `GET /metadata/stats` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsResponse {
    /// Listed instruments.
    #[serde(default)]
    pub listings: Vec<Listing>,
}

/// One listed instrument.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listing {
    /// Underlying ticker (`TON`).
    #[serde(default)]
    pub ticker: String,
    /// Venue mark price.
    #[serde(default, deserialize_with = "lenient_text")]
    pub mark_price: Option<String>,
    /// Quotes keyed by notional bucket.
    #[serde(default)]
    pub quotes: Quotes,
}

/// Quote buckets of a listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Quotes {
    /// Quote for a 1k notional.
    #[serde(default)]
    pub size_1k: Quote,
}

/// Two-sided quote.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Quote {
    /// Bid price.
    #[serde(default, deserialize_with = "lenient_text")]
    pub bid: Option<String>,
    /// Ask price.
    #[serde(default, deserialize_with = "lenient_text")]
    pub ask: Option<String>,
}

// =============================================================================
// Signal Extraction
// =============================================================================

/// Best signal a listing offers this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSignal {
    /// Both quote sides are usable.
    Book {
        /// Quoted bid.
        bid: Decimal,
        /// Quoted ask.
        ask: Decimal,
    },
    /// Quote unusable; positive mark price.
    Mark(Decimal),
}

/// Find the listing for `ticker`, matched case-insensitively.
#[must_use]
pub fn find_listing<'a>(stats: &'a StatsResponse, ticker: &str) -> Option<&'a Listing> {
    stats
        .listings
        .iter()
        .find(|listing| listing.ticker.eq_ignore_ascii_case(ticker))
}

/// Prefer the 1k quote when both sides are strictly positive, otherwise
/// the mark price when strictly positive.
#[must_use]
pub fn listing_signal(listing: &Listing) -> Option<ListingSignal> {
    let quote = &listing.quotes.size_1k;
    let bid = quote.bid.as_deref().and_then(parse_positive);
    let ask = quote.ask.as_deref().and_then(parse_positive);

    if let (Some(bid), Some(ask)) = (bid, ask) {
        return Some(ListingSignal::Book { bid, ask });
    }

    listing
        .mark_price
        .as_deref()
        .and_then(parse_positive)
        .map(ListingSignal::Mark)
}

/// Venue ticker for the tracked instrument.
#[must_use]
pub fn venue_ticker(canonicalizer: &SymbolCanonicalizer) -> String {
    canonicalizer.root().to_string()
}

// =============================================================================
// Adapter
// =============================================================================

/// Variational feed adapter.
#[derive(Debug, Clone)]
pub struct VariationalAdapter {
    config: VariationalConfig,
    canonicalizer: SymbolCanonicalizer,
}

impl VariationalAdapter {
    /// Create a new adapter.
    #[must_use]
    pub const fn new(config: VariationalConfig, canonicalizer: SymbolCanonicalizer) -> Self {
        Self {
            config,
            canonicalizer,
        }
    }
}

#[async_trait]
impl FeedAdapter for VariationalAdapter {
    fn venue(&self) -> Venue {
        Venue::Variational
    }

    fn canonicalizer(&self) -> &SymbolCanonicalizer {
        &self.canonicalizer
    }

    /// Listings are keyed by ticker; no discovery call is needed.
    async fn resolve_market(&self, _http: &reqwest::Client) -> Result<MarketMap, FetchError> {
        let mut markets = MarketMap::new();
        markets.insert(
            self.canonicalizer.canonical().clone(),
            VenueMarketId::Name(venue_ticker(&self.canonicalizer)),
        );
        Ok(markets)
    }

    fn transport(&self, _binding: &MarketBinding) -> Transport {
        Transport::Poll(PollSpec {
            url: self.config.stats_url.clone(),
            user_agent: None,
        })
    }

    fn parse_message(&self, binding: &MarketBinding, payload: &[u8]) -> Option<FeedEvent> {
        let stats: StatsResponse = match serde_json::from_slice(payload) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!(venue = %Venue::Variational, error = %e, "Failed to decode stats");
                return None;
            }
        };

        let ticker = binding.market.as_name()?;
        let listing = find_listing(&stats, ticker)?;
        let timestamp = now_millis();

        match listing_signal(listing)? {
            ListingSignal::Book { bid, ask } => Some(FeedEvent::Orderbook(OrderbookEvent {
                symbol: binding.symbol.clone(),
                source: Venue::Variational,
                best_bid: bid,
                best_ask: ask,
                timestamp,
            })),
            ListingSignal::Mark(price) => Some(FeedEvent::Price(PriceEvent {
                symbol: binding.symbol.clone(),
                source: Venue::Variational,
                price,
                timestamp,
            })),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
