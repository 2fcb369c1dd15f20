//! Lighter Order Book Stream
//!
//! Order books are addressed by numeric market id. The id is discovered
//! once from the REST order-book list, then a single shared WebSocket is
//! subscribed to the `order_book/{id}` channel.
//!
//! # Endpoints
//!
//! - REST: `{rest}/api/v1/orderBooks`
//! - WebSocket: `wss://mainnet.zklighter.elliot.ai/stream`
//!
//! # Messages
//!
//! ```json
//! {"type": "subscribe", "channel": "order_book/17", "auth": "..."}
//! {"type": "update/order_book", "channel": "order_book:17", "timestamp": 1700000000000,
//!  "order_book": {"bids": [{"price": "2.10", "size": "5"}], "asks": [{"price": "2.11", "size": "3"}]}}
//! ```
//!
//! The `auth` field is only sent when a read-only token is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{
    FeedAdapter, FetchError, MarketBinding, MarketMap, StreamSpec, Transport, VenueMarketId,
};
use crate::domain::market_data::{FeedEvent, TopOfBook, Venue, venue_or_now};
use crate::domain::symbol::SymbolCanonicalizer;
use crate::infrastructure::config::AuthToken;

use super::http::{SCANNER_USER_AGENT, get_json, join_url};

/// Default REST base URL.
pub const DEFAULT_REST_URL: &str = "https://mainnet.zklighter.elliot.ai";

/// Default WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://mainnet.zklighter.elliot.ai/stream";

const BOOK_UPDATE_TYPE: &str = "update/order_book";

/// Lighter adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LighterConfig {
    /// REST base URL used for market discovery.
    pub rest_url: String,
    /// WebSocket URL.
    pub ws_url: String,
    /// Optional read-only token attached to subscriptions.
    pub auth: Option<AuthToken>,
}

impl Default for LighterConfig {
    fn default() -> Self {
        Self {
            rest_url: DEFAULT_REST_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            auth: None,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// `GET /api/v1/orderBooks` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderBooksResponse {
    /// Venue status code.
    #[serde(default)]
    pub code: i64,
    /// Venue status message.
    #[serde(default)]
    pub message: Option<String>,
    /// Listed order books.
    #[serde(default)]
    pub order_books: Vec<OrderBookRow>,
}

/// One listed order book.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderBookRow {
    /// Venue symbol (`TON`, `TON-USDT`, ...).
    #[serde(default)]
    pub symbol: String,
    /// Numeric market id.
    #[serde(default)]
    pub market_id: i64,
    /// `perp` or `spot`.
    #[serde(default)]
    pub market_type: String,
    /// `active`, `inactive`, ...
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
struct BookUpdate {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    order_book: BookSides,
}

#[derive(Debug, Default, Deserialize)]
struct BookSides {
    #[serde(default)]
    bids: Vec<BookLevel>,
    #[serde(default)]
    asks: Vec<BookLevel>,
}

#[derive(Debug, Default, Deserialize)]
struct BookLevel {
    #[serde(default)]
    price: String,
}

// =============================================================================
// Market Discovery
// =============================================================================

/// Index active perpetual books whose base asset is `root`.
///
/// Each book is keyed both by its bare base (`TON`) and by its full
/// upper-cased venue symbol (`TON-USDT`).
#[must_use]
pub fn index_order_books(rows: &[OrderBookRow], root: &str) -> HashMap<String, i64> {
    let mut index = HashMap::new();

    for row in rows {
        if !row.market_type.eq_ignore_ascii_case("perp") || !row.status.eq_ignore_ascii_case("active") {
            continue;
        }

        let symbol = row.symbol.trim().to_uppercase();
        let base = symbol
            .split(['-', '/'])
            .next()
            .unwrap_or_default()
            .to_string();
        if base.is_empty() || base != root {
            continue;
        }

        index.insert(base, row.market_id);
        index.insert(symbol, row.market_id);
    }

    index
}

/// Pick the market id to follow: the bare root first, then `ROOT-USDT`.
#[must_use]
pub fn preferred_market_id(index: &HashMap<String, i64>, root: &str) -> Option<i64> {
    index
        .get(root)
        .or_else(|| index.get(&format!("{root}-USDT")))
        .copied()
}

/// Extract the market id from an `order_book:{id}` or `order_book/{id}`
/// channel name.
#[must_use]
pub fn channel_market_id(channel: &str) -> Option<i64> {
    let channel = channel.trim();
    channel
        .strip_prefix("order_book:")
        .or_else(|| channel.strip_prefix("order_book/"))
        .and_then(|id| id.parse::<i64>().ok())
        .filter(|id| *id >= 0)
}

// =============================================================================
// Adapter
// =============================================================================

/// Lighter feed adapter.
#[derive(Debug, Clone)]
pub struct LighterAdapter {
    config: LighterConfig,
    canonicalizer: SymbolCanonicalizer,
}

impl LighterAdapter {
    /// Create a new adapter.
    #[must_use]
    pub const fn new(config: LighterConfig, canonicalizer: SymbolCanonicalizer) -> Self {
        Self {
            config,
            canonicalizer,
        }
    }

    /// Subscription frame for one market id.
    #[must_use]
    pub fn subscribe_message(&self, market: &VenueMarketId) -> String {
        let mut message = serde_json::json!({
            "type": "subscribe",
            "channel": format!("order_book/{market}"),
        });
        if let Some(auth) = &self.config.auth {
            message["auth"] = serde_json::Value::String(auth.expose().to_string());
        }
        message.to_string()
    }
}

#[async_trait]
impl FeedAdapter for LighterAdapter {
    fn venue(&self) -> Venue {
        Venue::Lighter
    }

    fn canonicalizer(&self) -> &SymbolCanonicalizer {
        &self.canonicalizer
    }

    async fn resolve_market(&self, http: &reqwest::Client) -> Result<MarketMap, FetchError> {
        let url = join_url(&self.config.rest_url, "/api/v1/orderBooks");
        let response: OrderBooksResponse = get_json(http, &url, Some(SCANNER_USER_AGENT)).await?;

        let root = self.canonicalizer.root();
        let index = index_order_books(&response.order_books, root);
        tracing::debug!(
            venue = %Venue::Lighter,
            code = response.code,
            books = response.order_books.len(),
            matched = index.len(),
            "Order book list fetched"
        );

        let mut markets = MarketMap::new();
        if let Some(id) = preferred_market_id(&index, root) {
            markets.insert(self.canonicalizer.canonical().clone(), VenueMarketId::Numeric(id));
        }
        Ok(markets)
    }

    fn transport(&self, binding: &MarketBinding) -> Transport {
        Transport::Stream(StreamSpec {
            url: self.config.ws_url.clone(),
            user_agent: Some(SCANNER_USER_AGENT.to_string()),
            subscriptions: vec![self.subscribe_message(&binding.market)],
            keep_alive: None,
        })
    }

    fn parse_message(&self, binding: &MarketBinding, payload: &[u8]) -> Option<FeedEvent> {
        let update: BookUpdate = match serde_json::from_slice(payload) {
            Ok(update) => update,
            Err(e) => {
                tracing::debug!(venue = %Venue::Lighter, error = %e, "Failed to decode book update");
                return None;
            }
        };

        if update.kind != BOOK_UPDATE_TYPE {
            return None;
        }

        let market_id = channel_market_id(&update.channel)?;
        if binding.market.as_numeric() != Some(market_id) {
            return None;
        }

        let top = TopOfBook::from_levels(
            update.order_book.bids.iter().map(|level| level.price.as_str()),
            update.order_book.asks.iter().map(|level| level.price.as_str()),
        )?;

        Some(FeedEvent::Orderbook(top.into_event(
            binding.symbol.clone(),
            Venue::Lighter,
            venue_or_now(update.timestamp),
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================
