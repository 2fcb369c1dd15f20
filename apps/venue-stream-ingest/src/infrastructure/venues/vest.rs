//! Vest Depth Stream
//!
//! A single WebSocket subscribed to the `{SYMBOL}@depth` channel. The venue
//! drops idle clients, so a `PING` request is sent on a fixed interval.
//!
//! # Messages
//!
//! ```json
//! {"method": "SUBSCRIBE", "params": ["TON-PERP@depth"], "id": 1}
//! {"method": "PING", "params": [], "id": 0}
//! {"channel": "TON-PERP@depth", "data": {"bids": [["100", "1"]], "asks": [["101", "1"]]}}
//! ```
//!
//! Depth messages carry no timestamp; events are stamped on arrival.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{
    FeedAdapter, FetchError, KeepAlive, MarketBinding, MarketMap, StreamSpec, Transport,
    VenueMarketId,
};
use crate::domain::market_data::{FeedEvent, TopOfBook, Venue, now_millis};
use crate::domain::symbol::SymbolCanonicalizer;

use super::http::BROWSER_USER_AGENT;

/// Default WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://ws-prod.hz.vestmarkets.com/ws-api?version=1.0";

/// Default interval between `PING` requests.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Vest adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VestConfig {
    /// WebSocket URL.
    pub ws_url: String,
    /// Interval between keep-alive `PING` requests.
    pub keepalive_interval: Duration,
}

impl Default for VestConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DepthMessage {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    data: DepthData,
}

#[derive(Debug, Default, Deserialize)]
struct DepthData {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

/// Venue symbol for the tracked instrument (`TON-PERP`).
#[must_use]
pub fn venue_symbol(canonicalizer: &SymbolCanonicalizer) -> String {
    format!("{}-PERP", canonicalizer.root())
}

/// Symbol part of a `{SYMBOL}@depth` channel name.
#[must_use]
pub fn channel_symbol(channel: &str) -> &str {
    channel.split_once('@').map_or(channel, |(symbol, _)| symbol)
}

fn level_prices(levels: &[Vec<String>]) -> impl Iterator<Item = &str> {
    levels
        .iter()
        .filter_map(|level| level.first())
        .map(String::as_str)
}

/// Vest feed adapter.
#[derive(Debug, Clone)]
pub struct VestAdapter {
    config: VestConfig,
    canonicalizer: SymbolCanonicalizer,
}

impl VestAdapter {
    /// Create a new adapter.
    #[must_use]
    pub const fn new(config: VestConfig, canonicalizer: SymbolCanonicalizer) -> Self {
        Self {
            config,
            canonicalizer,
        }
    }
}

#[async_trait]
impl FeedAdapter for VestAdapter {
    fn venue(&self) -> Venue {
        Venue::Vest
    }

    fn canonicalizer(&self) -> &SymbolCanonicalizer {
        &self.canonicalizer
    }

    async fn resolve_market(&self, _http: &reqwest::Client) -> Result<MarketMap, FetchError> {
        let mut markets = MarketMap::new();
        markets.insert(
            self.canonicalizer.canonical().clone(),
            VenueMarketId::Name(venue_symbol(&self.canonicalizer)),
        );
        Ok(markets)
    }

    fn transport(&self, binding: &MarketBinding) -> Transport {
        let subscribe = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@depth", binding.market)],
            "id": 1,
        });
        let ping = serde_json::json!({"method": "PING", "params": [], "id": 0});

        Transport::Stream(StreamSpec {
            url: self.config.ws_url.clone(),
            user_agent: Some(BROWSER_USER_AGENT.to_string()),
            subscriptions: vec![subscribe.to_string()],
            keep_alive: Some(KeepAlive {
                interval: self.config.keepalive_interval,
                message: ping.to_string(),
            }),
        })
    }

    fn parse_message(&self, _binding: &MarketBinding, payload: &[u8]) -> Option<FeedEvent> {
        let message: DepthMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(venue = %Venue::Vest, error = %e, "Failed to decode depth message");
                return None;
            }
        };

        let symbol = self.canonicalizer.normalize(channel_symbol(&message.channel))?;
        let top = TopOfBook::from_levels(
            level_prices(&message.data.bids),
            level_prices(&message.data.asks),
        )?;

        Some(FeedEvent::Orderbook(top.into_event(symbol, Venue::Vest, now_millis())))
    }
}

// =============================================================================
// Tests
// =============================================================================
