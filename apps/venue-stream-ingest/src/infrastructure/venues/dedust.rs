//! DeDust Pool Poller
//!
//! DeDust exposes no order book; the TON price is implied by the reserves
//! of its AMM pools. Every poll cycle fetches the full pool list and keeps
//! the pool with the deepest quote-side liquidity.
//!
//! # Endpoint
//!
//! - `GET https://api.dedust.io/v2/pools`
//!
//! # Pool Shape
//!
//! ```json
//! {"assets": [{"type": "native"}, {"type": "jetton", "address": "EQC..."}],
//!  "reserves": ["1000000000000", "5250000000"]}
//! ```
//!
//! Reserve amounts are integers in base units. They are scaled with fixed
//! per-asset decimals (9 for the native leg, 6 for the quote jetton), not
//! with the `decimals` the payload advertises.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{
    FeedAdapter, FetchError, MarketBinding, MarketMap, PollSpec, Transport, VenueMarketId,
};
use crate::domain::market_data::{FeedEvent, PriceEvent, Venue, now_millis, parse_decimal};
use crate::domain::symbol::SymbolCanonicalizer;

/// Default pools endpoint.
pub const DEFAULT_POOLS_URL: &str = "https://api.dedust.io/v2/pools";

/// Jetton master address of the tracked quote asset (USDT on TON).
pub const DEFAULT_QUOTE_JETTON: &str = "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs";

const NATIVE_DECIMALS: u32 = 9;
const QUOTE_DECIMALS: u32 = 6;

// =============================================================================
// Configuration
// =============================================================================

/// DeDust adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedustConfig {
    /// Pools list URL.
    pub pools_url: String,
    /// Jetton address of the quote asset.
    pub quote_jetton: String,
    /// Decimals applied to the native leg's reserve.
    pub base_decimals: u32,
    /// Decimals applied to the quote jetton's reserve.
    pub quote_decimals: u32,
}

impl Default for DedustConfig {
    fn default() -> Self {
        Self {
            pools_url: DEFAULT_POOLS_URL.to_string(),
            quote_jetton: DEFAULT_QUOTE_JETTON.to_string(),
            base_decimals: NATIVE_DECIMALS,
            quote_decimals: QUOTE_DECIMALS,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// One asset leg of a pool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolAsset {
    /// `native` or `jetton`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Jetton master address (absent for the native leg).
    #[serde(default)]
    pub address: Option<String>,
}

/// One liquidity pool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pool {
    /// Asset legs.
    #[serde(default)]
    pub assets: Vec<PoolAsset>,
    /// Reserve amounts in base units, index-aligned with `assets`.
    #[serde(default)]
    pub reserves: Vec<String>,
}

// =============================================================================
// Deepest Pool Selection
// =============================================================================

/// Price implied by the winning pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolQuote {
    /// Quote reserve divided by base reserve, both decimal-adjusted.
    pub price: Decimal,
    /// Decimal-adjusted quote reserve used to rank pools.
    pub liquidity: Decimal,
}

/// Pick the qualifying pool with the largest quote reserve.
///
/// A pool qualifies when it has exactly two legs, one `native` and one
/// jetton at `quote_jetton`, and a positive native reserve. Ties keep the
/// first pool seen.
#[must_use]
pub fn select_deepest_pool(pools: &[Pool], config: &DedustConfig, quote_jetton: &str) -> Option<PoolQuote> {
    let mut best: Option<PoolQuote> = None;

    for pool in pools {
        let Some(candidate) = pool_quote(pool, config, quote_jetton) else {
            continue;
        };
        if best.is_none_or(|current| candidate.liquidity > current.liquidity) {
            best = Some(candidate);
        }
    }

    best
}

fn pool_quote(pool: &Pool, config: &DedustConfig, quote_jetton: &str) -> Option<PoolQuote> {
    if pool.assets.len() != 2 {
        return None;
    }

    let mut base_reserve = None;
    let mut quote_reserve = None;

    for (index, asset) in pool.assets.iter().enumerate() {
        let raw = pool.reserves.get(index).map(String::as_str);
        if asset.kind == "native" {
            base_reserve = Some(scaled_reserve(raw, config.base_decimals));
        } else if asset.kind == "jetton" && asset.address.as_deref() == Some(quote_jetton) {
            quote_reserve = Some(scaled_reserve(raw, config.quote_decimals));
        }
    }

    let base = base_reserve?;
    let quote = quote_reserve?;
    if base <= Decimal::ZERO || quote <= Decimal::ZERO {
        return None;
    }

    let price = quote.checked_div(base)?.normalize();
    Some(PoolQuote {
        price,
        liquidity: quote,
    })
}

/// Missing or unparseable reserves count as zero.
fn scaled_reserve(raw: Option<&str>, decimals: u32) -> Decimal {
    let Some(amount) = raw.and_then(parse_decimal) else {
        return Decimal::ZERO;
    };
    let divisor = 10_u64
        .checked_pow(decimals)
        .map_or(Decimal::ONE, Decimal::from);
    amount.checked_div(divisor).unwrap_or(Decimal::ZERO)
}

// =============================================================================
// Adapter
// =============================================================================

/// DeDust feed adapter.
#[derive(Debug, Clone)]
pub struct DedustAdapter {
    config: DedustConfig,
    canonicalizer: SymbolCanonicalizer,
}

impl DedustAdapter {
    /// Create a new adapter.
    #[must_use]
    pub const fn new(config: DedustConfig, canonicalizer: SymbolCanonicalizer) -> Self {
        Self {
            config,
            canonicalizer,
        }
    }
}

#[async_trait]
impl FeedAdapter for DedustAdapter {
    fn venue(&self) -> Venue {
        Venue::DeDust
    }

    fn canonicalizer(&self) -> &SymbolCanonicalizer {
        &self.canonicalizer
    }

    /// Pools are ranked on every poll; the market is the quote jetton itself.
    async fn resolve_market(&self, _http: &reqwest::Client) -> Result<MarketMap, FetchError> {
        let mut markets = MarketMap::new();
        markets.insert(
            self.canonicalizer.canonical().clone(),
            VenueMarketId::name(self.config.quote_jetton.clone()),
        );
        Ok(markets)
    }

    fn transport(&self, _binding: &MarketBinding) -> Transport {
        Transport::Poll(PollSpec {
            url: self.config.pools_url.clone(),
            user_agent: None,
        })
    }

    fn parse_message(&self, binding: &MarketBinding, payload: &[u8]) -> Option<FeedEvent> {
        let pools: Vec<Pool> = match serde_json::from_slice(payload) {
            Ok(pools) => pools,
            Err(e) => {
                tracing::debug!(venue = %Venue::DeDust, error = %e, "Failed to decode pools");
                return None;
            }
        };

        let quote_jetton = binding.market.as_name().unwrap_or(&self.config.quote_jetton);
        let quote = select_deepest_pool(&pools, &self.config, quote_jetton)?;

        tracing::trace!(
            price = %quote.price,
            liquidity = %quote.liquidity,
            "Deepest DeDust pool selected"
        );

        Some(FeedEvent::Price(PriceEvent {
            symbol: binding.symbol.clone(),
            source: Venue::DeDust,
            price: quote.price,
            timestamp: now_millis(),
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::symbol::CanonicalSymbol;

    fn pool(assets: &[(&str, Option<&str>)], reserves: &[&str]) -> Pool {
        Pool {
            assets: assets
                .iter()
                .map(|(kind, address)| PoolAsset {
                    kind: (*kind).to_string(),
                    address: address.map(str::to_string),
                })
                .collect(),
            reserves: reserves.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    fn ton_usdt(ton: &str, usdt: &str) -> Pool {
        pool(
            &[("native", None), ("jetton", Some(DEFAULT_QUOTE_JETTON))],
            &[ton, usdt],
        )
    }

    fn binding() -> MarketBinding {
        MarketBinding::new(
            CanonicalSymbol::new("TONUSDT"),
            VenueMarketId::name(DEFAULT_QUOTE_JETTON),
        )
    }

    #[test]
    fn deepest_pool_wins() {
        let config = DedustConfig::default();
        // 100 TON / 500 USDT and 200 TON / 1200 USDT
        let pools = vec![
            ton_usdt("100000000000", "500000000"),
            ton_usdt("200000000000", "1200000000"),
        ];

        let quote = select_deepest_pool(&pools, &config, DEFAULT_QUOTE_JETTON).unwrap();
        assert_eq!(quote.liquidity, Decimal::from(1200));
        assert_eq!(quote.price, Decimal::from(6));
    }

    #[test]
    fn ties_keep_first_pool() {
        let config = DedustConfig::default();
        let pools = vec![
            ton_usdt("100000000000", "500000000"),
            ton_usdt("250000000000", "500000000"),
        ];

        let quote = select_deepest_pool(&pools, &config, DEFAULT_QUOTE_JETTON).unwrap();
        assert_eq!(quote.price, Decimal::from(5));
    }

    #[test]
    fn leg_order_does_not_matter() {
        let config = DedustConfig::default();
        let pools = vec![pool(
            &[("jetton", Some(DEFAULT_QUOTE_JETTON)), ("native", None)],
            &["525000000", "100000000000"],
        )];

        let quote = select_deepest_pool(&pools, &config, DEFAULT_QUOTE_JETTON).unwrap();
        assert_eq!(quote.price, Decimal::new(525, 2));
    }

    #[test]
    fn non_qualifying_pools_are_ignored() {
        let config = DedustConfig::default();
        let other_jetton = pool(&[("native", None), ("jetton", Some("EQother"))], &["1", "999999999999"]);
        let three_legs = pool(
            &[("native", None), ("jetton", Some(DEFAULT_QUOTE_JETTON)), ("jetton", Some("EQx"))],
            &["100000000000", "900000000000", "1"],
        );
        let empty_base = ton_usdt("0", "900000000000");
        let garbage_base = ton_usdt("lots", "900000000000");

        let pools = vec![other_jetton, three_legs, empty_base, garbage_base];
        assert!(select_deepest_pool(&pools, &config, DEFAULT_QUOTE_JETTON).is_none());
    }

    #[test]
    fn no_pools_yields_nothing() {
        let config = DedustConfig::default();
        assert!(select_deepest_pool(&[], &config, DEFAULT_QUOTE_JETTON).is_none());
    }

    #[test]
    fn parse_message_emits_price_event() {
        let adapter = DedustAdapter::new(DedustConfig::default(), SymbolCanonicalizer::default());
        let payload = format!(
            r#"[
                {{"assets":[{{"type":"native","metadata":{{"decimals":9}}}},
                           {{"type":"jetton","address":"{DEFAULT_QUOTE_JETTON}","metadata":{{"decimals":6}}}}],
                 "reserves":["100000000000","525000000"],
                 "totalSupply":"1"}}
            ]"#
        );

        let event = adapter.parse_message(&binding(), payload.as_bytes()).unwrap();
        let FeedEvent::Price(price) = event else {
            panic!("expected price event");
        };
        assert_eq!(price.symbol.as_str(), "TONUSDT");
        assert_eq!(price.source, Venue::DeDust);
        assert_eq!(price.price, Decimal::new(525, 2));
        assert!(price.timestamp > 0);
    }

    #[test]
    fn parse_message_drops_malformed_payload() {
        let adapter = DedustAdapter::new(DedustConfig::default(), SymbolCanonicalizer::default());
        assert!(adapter.parse_message(&binding(), b"{not json").is_none());
        assert!(adapter.parse_message(&binding(), b"[]").is_none());
    }

    #[tokio::test]
    async fn resolve_binds_quote_jetton() {
        let adapter = DedustAdapter::new(DedustConfig::default(), SymbolCanonicalizer::default());
        let client = reqwest::Client::new();
        let markets = adapter.resolve_market(&client).await.unwrap();
        let bound = adapter.bind(&CanonicalSymbol::new("TONUSDT"), &markets).unwrap();
        assert_eq!(bound, binding());
    }
}
