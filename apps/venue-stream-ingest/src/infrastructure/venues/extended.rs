//! Extended Order Book Stream
//!
//! Market discovery goes through the REST markets list; the book is then
//! streamed from a per-market WebSocket endpoint at depth 1.
//!
//! # Endpoints
//!
//! - REST: `{rest}/info/markets`
//! - WebSocket: `{ws}/orderbooks/{market}?depth=1`
//!
//! # Book Message
//!
//! ```json
//! {"type": "SNAPSHOT",
//!  "data": {"m": "TON-USD", "b": [{"p": "2.10", "q": "5"}], "a": [{"p": "2.11", "q": "3"}]},
//!  "ts": 1700000000000, "seq": 1}
//! ```

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{
    FeedAdapter, FetchError, MarketBinding, MarketMap, StreamSpec, Transport, VenueMarketId,
};
use crate::domain::market_data::{FeedEvent, TopOfBook, Venue, venue_or_now};
use crate::domain::symbol::{CanonicalSymbol, SymbolCanonicalizer};

use super::http::{SCANNER_USER_AGENT, get_json, join_url};

/// Default REST base URL.
pub const DEFAULT_REST_URL: &str = "https://api.starknet.extended.exchange/api/v1";

/// Default WebSocket base URL.
pub const DEFAULT_WS_URL: &str = "wss://api.starknet.extended.exchange/stream.extended.exchange/v1";

/// Extended adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedConfig {
    /// REST base URL used for market discovery.
    pub rest_url: String,
    /// WebSocket base URL.
    pub ws_url: String,
}

impl Default for ExtendedConfig {
    fn default() -> Self {
        Self {
            rest_url: DEFAULT_REST_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// `GET /info/markets` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketsResponse {
    /// Listed markets.
    #[serde(default)]
    pub data: Vec<MarketRow>,
}

/// One listed market.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRow {
    /// Market name used in stream paths (`TON-USD`).
    #[serde(default)]
    pub name: String,
    /// Base asset.
    #[serde(default)]
    pub asset_name: String,
    /// Collateral / quote asset.
    #[serde(default)]
    pub collateral_asset_name: String,
    /// Trading status, informational only.
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
struct BookEnvelope {
    #[serde(default)]
    data: BookData,
    #[serde(default)]
    ts: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct BookData {
    #[serde(default)]
    m: Option<String>,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    b: Vec<BookLevel>,
    #[serde(default)]
    a: Vec<BookLevel>,
}

#[derive(Debug, Default, Deserialize)]
struct BookLevel {
    #[serde(default)]
    p: String,
}

// =============================================================================
// Market Selection
// =============================================================================

/// Preference rank of a collateral asset; higher wins.
#[must_use]
pub fn collateral_rank(collateral: &str) -> Option<u8> {
    match collateral.to_uppercase().as_str() {
        "USDT" => Some(30),
        "USDC" => Some(20),
        "USD" => Some(10),
        _ => None,
    }
}

/// Choose the best-ranked market listing `root` as its base asset.
///
/// Ties keep the first listing seen.
#[must_use]
pub fn select_market(rows: &[MarketRow], root: &str) -> Option<String> {
    let mut best: Option<(u8, &str)> = None;

    for row in rows {
        if !row.asset_name.eq_ignore_ascii_case(root) {
            continue;
        }
        let Some(rank) = collateral_rank(&row.collateral_asset_name) else {
            continue;
        };
        if best.is_none_or(|(best_rank, _)| rank > best_rank) {
            best = Some((rank, row.name.as_str()));
        }
    }

    best.map(|(_, name)| name.to_string())
}

/// Market used when discovery fails or finds nothing.
#[must_use]
pub fn fallback_market(canonicalizer: &SymbolCanonicalizer) -> String {
    format!("{}-USD", canonicalizer.root())
}

// =============================================================================
// Adapter
// =============================================================================

/// Extended feed adapter.
#[derive(Debug, Clone)]
pub struct ExtendedAdapter {
    config: ExtendedConfig,
    canonicalizer: SymbolCanonicalizer,
}

impl ExtendedAdapter {
    /// Create a new adapter.
    #[must_use]
    pub const fn new(config: ExtendedConfig, canonicalizer: SymbolCanonicalizer) -> Self {
        Self {
            config,
            canonicalizer,
        }
    }
}

#[async_trait]
impl FeedAdapter for ExtendedAdapter {
    fn venue(&self) -> Venue {
        Venue::Extended
    }

    fn canonicalizer(&self) -> &SymbolCanonicalizer {
        &self.canonicalizer
    }

    async fn resolve_market(&self, http: &reqwest::Client) -> Result<MarketMap, FetchError> {
        let url = join_url(&self.config.rest_url, "/info/markets");
        let response: MarketsResponse = get_json(http, &url, Some(SCANNER_USER_AGENT)).await?;

        let mut markets = MarketMap::new();
        if let Some(name) = select_market(&response.data, self.canonicalizer.root()) {
            markets.insert(self.canonicalizer.canonical().clone(), VenueMarketId::Name(name));
        }
        Ok(markets)
    }

    fn bind(&self, symbol: &CanonicalSymbol, markets: &MarketMap) -> Option<MarketBinding> {
        let market = markets
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| VenueMarketId::Name(fallback_market(&self.canonicalizer)));
        Some(MarketBinding::new(symbol.clone(), market))
    }

    fn transport(&self, binding: &MarketBinding) -> Transport {
        let path = format!("/orderbooks/{}?depth=1", binding.market);
        Transport::Stream(StreamSpec {
            url: join_url(&self.config.ws_url, &path),
            user_agent: Some(SCANNER_USER_AGENT.to_string()),
            subscriptions: Vec::new(),
            keep_alive: None,
        })
    }

    fn parse_message(&self, _binding: &MarketBinding, payload: &[u8]) -> Option<FeedEvent> {
        let envelope: BookEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(venue = %Venue::Extended, error = %e, "Failed to decode book message");
                return None;
            }
        };

        let data = envelope.data;
        let market = data
            .m
            .filter(|m| !m.is_empty())
            .or(data.market)
            .unwrap_or_default();

        let Some(symbol) = self.canonicalizer.normalize(&market) else {
            tracing::debug!(venue = %Venue::Extended, market = %market, "Unknown market in book message");
            return None;
        };

        let top = TopOfBook::from_levels(
            data.b.iter().map(|level| level.p.as_str()),
            data.a.iter().map(|level| level.p.as_str()),
        )?;

        Some(FeedEvent::Orderbook(top.into_event(
            symbol,
            Venue::Extended,
            venue_or_now(envelope.ts),
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================
