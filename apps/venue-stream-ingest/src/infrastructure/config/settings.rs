//! Ingestion Configuration Settings
//!
//! Configuration types for the ingestion service, loaded from environment
//! variables. Unparseable numeric values fall back to their defaults; an
//! unknown venue or overflow policy name is an error.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::market_data::{UnknownVenue, Venue};
use crate::domain::symbol::DEFAULT_CANONICAL;
use crate::infrastructure::broadcast::{HubConfig, OverflowPolicy, UnknownOverflowPolicy};
use crate::infrastructure::supervisor::SupervisorSettings;
use crate::infrastructure::supervisor::reconnect::ReconnectConfig;
use crate::infrastructure::venues::{
    DedustConfig, ExtendedConfig, LighterConfig, VariationalConfig, VestConfig,
};

/// Read-only venue token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token, ignoring blank values.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// Get the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

/// Reconnect, poll and timeout settings shared by every supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Backoff jitter fraction (0 = none).
    pub reconnect_jitter: f64,
    /// Pause between a stream ending and the next dial.
    pub stream_restart_pause: Duration,
    /// Interval between successful polls.
    pub poll_interval: Duration,
    /// Stale-stream timeout (`None` = disabled).
    pub stale_timeout: Option<Duration>,
    /// Pause before a supervisor with no market stops.
    pub unresolved_pause: Duration,
    /// REST request timeout.
    pub http_timeout: Duration,
    /// WebSocket dial and subscription timeout.
    pub connect_timeout: Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let reconnect = ReconnectConfig::default();
        let supervisor = SupervisorSettings::default();
        Self {
            reconnect_delay_initial: reconnect.initial_delay,
            reconnect_delay_max: reconnect.max_delay,
            reconnect_delay_multiplier: reconnect.multiplier,
            reconnect_jitter: reconnect.jitter_factor,
            stream_restart_pause: supervisor.stream_restart_pause,
            poll_interval: supervisor.poll_interval,
            stale_timeout: supervisor.stale_timeout,
            unresolved_pause: supervisor.unresolved_pause,
            http_timeout: supervisor.http_timeout,
            connect_timeout: supervisor.connect_timeout,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { metrics_port: 9090 }
    }
}

/// Complete ingestion configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Requested symbols, before canonicalization.
    pub symbols: Vec<String>,
    /// Venues to supervise, in start order.
    pub venues: Vec<Venue>,
    /// Supervisor timing.
    pub timing: TimingSettings,
    /// Output hub capacities and overflow policy.
    pub hub: HubConfig,
    /// Server port settings.
    pub server: ServerSettings,
    /// DeDust endpoints.
    pub dedust: DedustConfig,
    /// Extended endpoints.
    pub extended: ExtendedConfig,
    /// Lighter endpoints and token.
    pub lighter: LighterConfig,
    /// Variational endpoint.
    pub variational: VariationalConfig,
    /// Vest endpoint and keep-alive interval.
    pub vest: VestConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            symbols: vec![DEFAULT_CANONICAL.to_string()],
            venues: Venue::ALL.to_vec(),
            timing: TimingSettings::default(),
            hub: HubConfig::default(),
            server: ServerSettings::default(),
            dedust: DedustConfig::default(),
            extended: ExtendedConfig::default(),
            lighter: LighterConfig::default(),
            variational: VariationalConfig::default(),
            vest: VestConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a venue list or overflow policy is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a venue list or overflow policy is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let symbols = env
            .list("INGEST_SYMBOLS")
            .unwrap_or_else(|| defaults.symbols.clone());

        let venues = match env.list("INGEST_VENUES") {
            Some(names) => parse_venues(&names)?,
            None => defaults.venues.clone(),
        };

        let timing = TimingSettings {
            reconnect_delay_initial: env.nonzero_millis(
                "INGEST_RECONNECT_DELAY_INITIAL_MS",
                defaults.timing.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.nonzero_secs(
                "INGEST_RECONNECT_DELAY_MAX_SECS",
                defaults.timing.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env
                .finite("INGEST_RECONNECT_DELAY_MULTIPLIER", defaults.timing.reconnect_delay_multiplier)
                .max(1.0),
            reconnect_jitter: env
                .finite("INGEST_RECONNECT_JITTER", defaults.timing.reconnect_jitter)
                .clamp(0.0, 1.0),
            stream_restart_pause: env.nonzero_millis(
                "INGEST_STREAM_RESTART_PAUSE_MS",
                defaults.timing.stream_restart_pause,
            ),
            poll_interval: env.nonzero_millis("INGEST_POLL_INTERVAL_MS", defaults.timing.poll_interval),
            stale_timeout: Some(env.secs("INGEST_STALE_TIMEOUT_SECS", Duration::ZERO))
                .filter(|timeout| !timeout.is_zero()),
            unresolved_pause: env.secs("INGEST_UNRESOLVED_PAUSE_SECS", defaults.timing.unresolved_pause),
            http_timeout: env.nonzero_secs("INGEST_HTTP_TIMEOUT_SECS", defaults.timing.http_timeout),
            connect_timeout: env.nonzero_secs(
                "INGEST_CONNECT_TIMEOUT_SECS",
                defaults.timing.connect_timeout,
            ),
        };

        let overflow = match env.text("INGEST_OVERFLOW_POLICY") {
            Some(raw) => OverflowPolicy::from_str(&raw)?,
            None => defaults.hub.overflow,
        };
        let hub = HubConfig {
            price_capacity: env.capacity("INGEST_PRICE_CAPACITY", defaults.hub.price_capacity),
            orderbook_capacity: env.capacity("INGEST_ORDERBOOK_CAPACITY", defaults.hub.orderbook_capacity),
            trade_capacity: env.capacity("INGEST_TRADE_CAPACITY", defaults.hub.trade_capacity),
            overflow,
        };

        let server = ServerSettings {
            metrics_port: env.parsed("INGEST_METRICS_PORT", defaults.server.metrics_port),
        };

        let dedust = DedustConfig {
            pools_url: env.text_or("DEDUST_POOLS_URL", &defaults.dedust.pools_url),
            quote_jetton: env.text_or("DEDUST_QUOTE_JETTON", &defaults.dedust.quote_jetton),
            ..defaults.dedust
        };
        let extended = ExtendedConfig {
            rest_url: env.text_or("EXTENDED_REST_URL", &defaults.extended.rest_url),
            ws_url: env.text_or("EXTENDED_WS_URL", &defaults.extended.ws_url),
        };
        let lighter = LighterConfig {
            rest_url: env.text_or("LIGHTER_REST_URL", &defaults.lighter.rest_url),
            ws_url: env.text_or("LIGHTER_WS_URL", &defaults.lighter.ws_url),
            auth: env
                .text("LIGHTER_READONLY_AUTH")
                .or_else(|| env.text("LIGHTER_AUTH"))
                .and_then(|raw| AuthToken::new(&raw)),
        };
        let variational = VariationalConfig {
            stats_url: env.text_or("VARIATIONAL_STATS_URL", &defaults.variational.stats_url),
        };
        let vest = VestConfig {
            ws_url: env.text_or("VEST_WS_URL", &defaults.vest.ws_url),
            keepalive_interval: env.nonzero_secs(
                "INGEST_KEEPALIVE_INTERVAL_SECS",
                defaults.vest.keepalive_interval,
            ),
        };

        Ok(Self {
            symbols,
            venues,
            timing,
            hub,
            server,
            dedust,
            extended,
            lighter,
            variational,
            vest,
        })
    }

    /// Whether `venue` should be supervised.
    #[must_use]
    pub fn is_enabled(&self, venue: Venue) -> bool {
        self.venues.contains(&venue)
    }

    /// Settings handed to every supervisor.
    #[must_use]
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            symbols: self.symbols.clone(),
            reconnect: ReconnectConfig {
                initial_delay: self.timing.reconnect_delay_initial,
                max_delay: self.timing.reconnect_delay_max,
                multiplier: self.timing.reconnect_delay_multiplier,
                jitter_factor: self.timing.reconnect_jitter,
            },
            stream_restart_pause: self.timing.stream_restart_pause,
            poll_interval: self.timing.poll_interval,
            unresolved_pause: self.timing.unresolved_pause,
            stale_timeout: self.timing.stale_timeout,
            http_timeout: self.timing.http_timeout,
            connect_timeout: self.timing.connect_timeout,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `INGEST_VENUES` names a venue that does not exist.
    #[error(transparent)]
    UnknownVenue(#[from] UnknownVenue),
    /// `INGEST_OVERFLOW_POLICY` is not a known policy.
    #[error(transparent)]
    UnknownOverflowPolicy(#[from] UnknownOverflowPolicy),
}

fn parse_venues(names: &[String]) -> Result<Vec<Venue>, ConfigError> {
    let mut venues = Vec::with_capacity(names.len());
    for name in names {
        let venue = Venue::from_str(name)?;
        if !venues.contains(&venue) {
            venues.push(venue);
        }
    }
    Ok(venues)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank trimmed value.
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Comma-separated list; `None` when unset or blank.
    fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .text(key)?
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.text(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn finite(&self, key: &str, default: f64) -> f64 {
        Some(self.parsed(key, default))
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    fn capacity(&self, key: &str, default: usize) -> usize {
        self.parsed(key, default).max(1)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.text(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    /// Zero falls back to `default`.
    fn nonzero_secs(&self, key: &str, default: Duration) -> Duration {
        Some(self.secs(key, default))
            .filter(|d| !d.is_zero())
            .unwrap_or(default)
    }

    /// Zero falls back to `default`.
    fn nonzero_millis(&self, key: &str, default: Duration) -> Duration {
        self.text(key)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IngestConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.symbols, vec!["TONUSDT".to_string()]);
        assert_eq!(config.venues, Venue::ALL.to_vec());
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.timing.stale_timeout, None);
        assert!(config.lighter.auth.is_none());
    }

    #[test]
    fn symbols_and_venues_are_split_and_trimmed() {
        let config = config_from(&[
            ("INGEST_SYMBOLS", " TONUSDT , TON-USD ,"),
            ("INGEST_VENUES", "vest, Lighter ,vest"),
        ])
        .unwrap();
        assert_eq!(config.symbols, vec!["TONUSDT".to_string(), "TON-USD".to_string()]);
        assert_eq!(config.venues, vec![Venue::Vest, Venue::Lighter]);
        assert!(config.is_enabled(Venue::Vest));
        assert!(!config.is_enabled(Venue::DeDust));
    }

    #[test]
    fn blank_venue_list_means_all() {
        let config = config_from(&[("INGEST_VENUES", " , ")]).unwrap();
        assert_eq!(config.venues, Venue::ALL.to_vec());
    }

    #[test]
    fn unknown_venue_is_rejected() {
        let err = config_from(&[("INGEST_VENUES", "vest,binance")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVenue(_)));
        assert!(err.to_string().contains("binance"));
    }

    #[test]
    fn overflow_policy_parsing() {
        let config = config_from(&[("INGEST_OVERFLOW_POLICY", "drop-oldest")]).unwrap();
        assert_eq!(config.hub.overflow, OverflowPolicy::DropOldest);

        let err = config_from(&[("INGEST_OVERFLOW_POLICY", "spill")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOverflowPolicy(_)));
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("INGEST_POLL_INTERVAL_MS", "soon"),
            ("INGEST_METRICS_PORT", "99999"),
            ("INGEST_PRICE_CAPACITY", "-4"),
        ])
        .unwrap();
        assert_eq!(config.timing.poll_interval, Duration::from_secs(2));
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.hub.price_capacity, 1_024);
    }

    #[test]
    fn timing_overrides() {
        let config = config_from(&[
            ("INGEST_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("INGEST_RECONNECT_DELAY_MAX_SECS", "5"),
            ("INGEST_RECONNECT_DELAY_MULTIPLIER", "0.5"),
            ("INGEST_RECONNECT_JITTER", "3"),
            ("INGEST_STALE_TIMEOUT_SECS", "45"),
            ("INGEST_KEEPALIVE_INTERVAL_SECS", "15"),
            ("INGEST_ORDERBOOK_CAPACITY", "0"),
        ])
        .unwrap();
        let settings = config.supervisor_settings();
        assert_eq!(settings.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(settings.reconnect.max_delay, Duration::from_secs(5));
        assert!((settings.reconnect.multiplier - 1.0).abs() < f64::EPSILON);
        assert!((settings.reconnect.jitter_factor - 1.0).abs() < f64::EPSILON);
        assert_eq!(settings.stale_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.vest.keepalive_interval, Duration::from_secs(15));
        assert_eq!(config.hub.orderbook_capacity, 1);
    }

    #[test]
    fn zero_intervals_fall_back_to_defaults() {
        let config = config_from(&[
            ("INGEST_POLL_INTERVAL_MS", "0"),
            ("INGEST_STREAM_RESTART_PAUSE_MS", "0"),
            ("INGEST_KEEPALIVE_INTERVAL_SECS", "0"),
            ("INGEST_RECONNECT_DELAY_INITIAL_MS", "0"),
            ("INGEST_RECONNECT_DELAY_MAX_SECS", "0"),
            ("INGEST_HTTP_TIMEOUT_SECS", "0"),
            ("INGEST_CONNECT_TIMEOUT_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.timing.poll_interval, Duration::from_secs(2));
        assert_eq!(config.timing.stream_restart_pause, Duration::from_secs(2));
        assert_eq!(config.vest.keepalive_interval, Duration::from_secs(20));
        assert_eq!(config.timing.connect_timeout, Duration::from_secs(45));
    }

    #[test]
    fn connect_timeout_override() {
        let config = config_from(&[("INGEST_CONNECT_TIMEOUT_SECS", "7")]).unwrap();
        assert_eq!(
            config.supervisor_settings().connect_timeout,
            Duration::from_secs(7)
        );
    }

    #[test]
    fn supervisor_settings_match_defaults() {
        assert_eq!(
            IngestConfig::default().supervisor_settings(),
            SupervisorSettings::default()
        );
    }

    #[test]
    fn endpoint_overrides() {
        let config = config_from(&[
            ("EXTENDED_WS_URL", "ws://127.0.0.1:9001"),
            ("VARIATIONAL_STATS_URL", "http://127.0.0.1:9002/stats"),
            ("DEDUST_QUOTE_JETTON", "EQ-test"),
        ])
        .unwrap();
        assert_eq!(config.extended.ws_url, "ws://127.0.0.1:9001");
        assert_eq!(config.extended.rest_url, ExtendedConfig::default().rest_url);
        assert_eq!(config.variational.stats_url, "http://127.0.0.1:9002/stats");
        assert_eq!(config.dedust.quote_jetton, "EQ-test");
        assert_eq!(config.dedust.base_decimals, 9);
    }

    #[test]
    fn readonly_token_preferred_over_legacy() {
        let config = config_from(&[("LIGHTER_READONLY_AUTH", "ro"), ("LIGHTER_AUTH", "legacy")]).unwrap();
        assert_eq!(config.lighter.auth.unwrap().expose(), "ro");

        let config = config_from(&[("LIGHTER_READONLY_AUTH", "  "), ("LIGHTER_AUTH", "legacy")]).unwrap();
        assert_eq!(config.lighter.auth.unwrap().expose(), "legacy");
    }

    #[test]
    fn auth_token_redacted_debug() {
        let token = AuthToken::new("secret456").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));

        let config = config_from(&[("LIGHTER_AUTH", "secret456")]).unwrap();
        assert!(!format!("{config:?}").contains("secret456"));
    }

    #[test]
    fn blank_token_is_ignored() {
        assert!(AuthToken::new("   ").is_none());
        assert_eq!(AuthToken::new(" t ").unwrap().expose(), "t");
    }
}
