//! Output Hub
//!
//! The three typed output channels every venue supervisor writes into and
//! the downstream consumer reads from.
//!
//! # Architecture
//!
//! `EventHub` holds one bounded channel per event kind:
//! - prices (mark / AMM-derived prices)
//! - order books (top of book)
//! - trades (reserved, nothing publishes yet)
//!
//! # Overflow
//!
//! - [`OverflowPolicy::Block`]: a bounded `mpsc` channel per kind. A full
//!   channel makes the publishing supervisor wait, which stalls its read
//!   loop. One consumer per channel.
//! - [`OverflowPolicy::DropOldest`]: a `broadcast` channel per kind. A
//!   lagging consumer skips the oldest events; any number of consumers.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use super::metrics;
use crate::domain::market_data::{FeedEvent, OrderbookEvent, PriceEvent, TradeEvent};

// =============================================================================
// Configuration
// =============================================================================

/// What the hub does when a channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Writers wait for capacity.
    #[default]
    Block,
    /// The oldest unread events are overwritten.
    DropOldest,
}

impl OverflowPolicy {
    /// Label used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::DropOldest => "drop_oldest",
        }
    }
}

/// Error returned for an unknown overflow policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown overflow policy: {0}")]
pub struct UnknownOverflowPolicy(pub String);

impl FromStr for OverflowPolicy {
    type Err = UnknownOverflowPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "block" => Ok(Self::Block),
            "drop_oldest" => Ok(Self::DropOldest),
            other => Err(UnknownOverflowPolicy(other.to_string())),
        }
    }
}

/// Channel capacities and overflow policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the price channel.
    pub price_capacity: usize,
    /// Capacity of the order-book channel.
    pub orderbook_capacity: usize,
    /// Capacity of the trade channel.
    pub trade_capacity: usize,
    /// Behavior when a channel is full.
    pub overflow: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            price_capacity: 1_024,
            orderbook_capacity: 4_096,
            trade_capacity: 1_024,
            overflow: OverflowPolicy::Block,
        }
    }
}

/// Errors returned when publishing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The consumer of a blocking channel dropped its receiver.
    #[error("{0} channel closed")]
    Closed(&'static str),
}

// =============================================================================
// Channel
// =============================================================================

enum Sender<T> {
    Block(mpsc::Sender<T>),
    DropOldest(broadcast::Sender<T>),
}

struct Channel<T> {
    name: &'static str,
    tx: Sender<T>,
    pending_rx: Mutex<Option<mpsc::Receiver<T>>>,
}

impl<T: Clone + Send + 'static> Channel<T> {
    fn new(name: &'static str, capacity: usize, overflow: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        match overflow {
            OverflowPolicy::Block => {
                let (tx, rx) = mpsc::channel(capacity);
                Self {
                    name,
                    tx: Sender::Block(tx),
                    pending_rx: Mutex::new(Some(rx)),
                }
            }
            OverflowPolicy::DropOldest => Self {
                name,
                tx: Sender::DropOldest(broadcast::channel(capacity).0),
                pending_rx: Mutex::new(None),
            },
        }
    }

    async fn publish(&self, event: T) -> Result<(), HubError> {
        match &self.tx {
            Sender::Block(tx) => tx.send(event).await.map_err(|_| HubError::Closed(self.name)),
            Sender::DropOldest(tx) => {
                if tx.send(event).is_err() {
                    metrics::record_hub_dropped(self.name, 1);
                }
                Ok(())
            }
        }
    }

    fn subscribe(&self) -> Option<EventReceiver<T>> {
        let inner = match &self.tx {
            Sender::Block(_) => Receiver::Block(self.pending_rx.lock().take()?),
            Sender::DropOldest(tx) => Receiver::DropOldest(tx.subscribe()),
        };
        Some(EventReceiver {
            channel: self.name,
            inner,
        })
    }
}

// =============================================================================
// Receiver
// =============================================================================

enum Receiver<T> {
    Block(mpsc::Receiver<T>),
    DropOldest(broadcast::Receiver<T>),
}

/// Consumer end of one hub channel, independent of the overflow policy.
pub struct EventReceiver<T> {
    channel: &'static str,
    inner: Receiver<T>,
}

impl<T: Clone> EventReceiver<T> {
    /// Receive the next event.
    ///
    /// Returns `None` once the hub is dropped. Under
    /// [`OverflowPolicy::DropOldest`] skipped events are counted and
    /// receiving continues with the oldest retained event.
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.inner {
            Receiver::Block(rx) => rx.recv().await,
            Receiver::DropOldest(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = self.channel, skipped, "Consumer lagged, events dropped");
                        metrics::record_hub_dropped(self.channel, skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Name of the channel this receiver reads.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        self.channel
    }
}

impl<T> std::fmt::Debug for EventReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Event Hub
// =============================================================================

/// Central hub for the price, order-book and trade channels.
///
/// # Example
///
/// ```rust
/// use venue_stream_ingest::infrastructure::broadcast::{EventHub, HubConfig};
///
/// let hub = EventHub::new(HubConfig::default());
/// let orderbooks = hub.orderbooks_rx();
/// assert!(orderbooks.is_some());
///
/// // Under the default blocking policy each channel has a single consumer.
/// assert!(hub.orderbooks_rx().is_none());
/// ```
pub struct EventHub {
    config: HubConfig,
    prices: Channel<PriceEvent>,
    orderbooks: Channel<OrderbookEvent>,
    trades: Channel<TradeEvent>,
}

/// Shared hub handle.
pub type SharedEventHub = Arc<EventHub>;

impl EventHub {
    /// Create a hub with the given capacities and overflow policy.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            prices: Channel::new("prices", config.price_capacity, config.overflow),
            orderbooks: Channel::new("orderbooks", config.orderbook_capacity, config.overflow),
            trades: Channel::new("trades", config.trade_capacity, config.overflow),
        }
    }

    /// Create a hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(HubConfig::default())
    }

    /// Publish any canonical event on its channel.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the channel's only consumer is gone.
    pub async fn publish(&self, event: FeedEvent) -> Result<(), HubError> {
        match event {
            FeedEvent::Price(e) => self.prices.publish(e).await,
            FeedEvent::Orderbook(e) => self.orderbooks.publish(e).await,
            FeedEvent::Trade(e) => self.trades.publish(e).await,
        }
    }

    /// Receiver for price events.
    ///
    /// Under the blocking policy only the first call returns `Some`.
    #[must_use]
    pub fn prices_rx(&self) -> Option<EventReceiver<PriceEvent>> {
        self.prices.subscribe()
    }

    /// Receiver for order-book events.
    #[must_use]
    pub fn orderbooks_rx(&self) -> Option<EventReceiver<OrderbookEvent>> {
        self.orderbooks.subscribe()
    }

    /// Receiver for trade events.
    #[must_use]
    pub fn trades_rx(&self) -> Option<EventReceiver<TradeEvent>> {
        self.trades.subscribe()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub").field("config", &self.config).finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
