//! Feed Supervisor
//!
//! One long-lived task per venue, written once against
//! [`FeedAdapter`] and parameterized by it.
//!
//! # Lifecycle
//!
//! ```text
//! start ──► filter symbols ──► resolve market ──► bind ──┬──► poll loop
//!              │ none               │ error → empty map   └──► stream loop
//!              ▼                    ▼ no binding
//!           skipped            pause, then stop
//! ```
//!
//! # Stream Loop
//!
//! `Disconnected(backoff) → Connecting → Subscribing → Streaming → Disconnected`
//!
//! - Dial or handshake failure: wait the current backoff, double it (capped)
//!   and redial. Retries never give up.
//! - Reaching `Streaming` resets the backoff.
//! - A dial that does not finish within the connect timeout counts as a
//!   dial failure.
//! - A read error, close frame, end of stream or stale timeout waits a short
//!   fixed pause before redialing. That pause is separate from the dial backoff.
//! - Venues with a keep-alive requirement get a per-connection keep-alive
//!   task, cancelled and joined when the connection ends. Outbound
//!   keep-alives do not hold off the stale timeout; only inbound frames do.
//!
//! # Poll Loop
//!
//! Fetch immediately, then once per poll interval. A failed fetch waits the
//! current backoff instead; a successful one resets it.
//!
//! Every wait is raced against the supervisor's cancellation token.

pub mod keepalive;
pub mod reconnect;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use self::keepalive::{KeepAliveEvent, KeepAliveHandle};
use self::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::broadcast::SharedEventHub;
use super::metrics::{self, DropReason};
use super::venues::http;
use crate::application::ports::{
    FeedAdapter, FetchError, KeepAlive, MarketBinding, MarketMap, PollSpec, StreamSpec, Transport,
};
use crate::domain::market_data::{FeedEvent, Venue};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors raised inside a supervisor. All of them are recoverable.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket dial failed.
    #[error("WebSocket connection failed: {0}")]
    Dial(#[source] tungstenite::Error),

    /// Sending a subscription frame failed.
    #[error("subscription handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    /// Read or write on an established socket failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// `User-Agent` value is not a valid header.
    #[error("invalid user agent header: {0}")]
    InvalidHeader(String),

    /// Dial and subscription did not finish in time.
    #[error("connection not established within {0:?}")]
    ConnectTimeout(Duration),

    /// Server closed the connection.
    #[error("connection closed")]
    Closed,

    /// No frame arrived within the stale timeout.
    #[error("no message received for {0:?}")]
    Stale(Duration),

    /// REST fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

// =============================================================================
// Settings
// =============================================================================

/// Timing and symbol settings shared by every supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorSettings {
    /// Raw configured symbols, filtered through each adapter's canonicalizer.
    pub symbols: Vec<String>,
    /// Dial / poll-failure backoff.
    pub reconnect: ReconnectConfig,
    /// Pause between a stream ending and the next dial.
    pub stream_restart_pause: Duration,
    /// Interval between successful polls.
    pub poll_interval: Duration,
    /// Pause before stopping when no market can be bound.
    pub unresolved_pause: Duration,
    /// Treat a silent stream as dead after this long.
    pub stale_timeout: Option<Duration>,
    /// Timeout for REST requests.
    pub http_timeout: Duration,
    /// Upper bound on dialing a stream and sending its subscriptions.
    pub connect_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            symbols: vec![crate::domain::symbol::DEFAULT_CANONICAL.to_string()],
            reconnect: ReconnectConfig::default(),
            stream_restart_pause: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            unresolved_pause: Duration::from_secs(30),
            stale_timeout: None,
            http_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(45),
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

enum StreamOutcome {
    Cancelled,
    Ended(FeedError),
}

/// Connection supervisor for one venue.
pub struct FeedSupervisor<A: FeedAdapter> {
    adapter: A,
    settings: SupervisorSettings,
    hub: SharedEventHub,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl<A: FeedAdapter> FeedSupervisor<A> {
    /// Create a supervisor.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        adapter: A,
        settings: SupervisorSettings,
        hub: SharedEventHub,
        cancel: CancellationToken,
    ) -> Result<Self, FeedError> {
        let http = http::build_client(settings.http_timeout)?;
        Ok(Self {
            adapter,
            settings,
            hub,
            http,
            cancel,
        })
    }

    /// Venue this supervisor drives.
    pub fn venue(&self) -> Venue {
        self.adapter.venue()
    }

    /// Run until cancelled, or until startup finds nothing to follow.
    pub async fn run(self) {
        let venue = self.venue();

        let symbols = self.adapter.canonicalizer().filter_symbols(&self.settings.symbols);
        let Some(symbol) = symbols.first() else {
            tracing::info!(
                venue = %venue,
                symbols = ?self.settings.symbols,
                "No tracked symbol configured, supervisor skipped"
            );
            return;
        };

        let resolved = tokio::select! {
            () = self.cancel.cancelled() => return,
            result = self.adapter.resolve_market(&self.http) => result,
        };
        let markets = resolved.unwrap_or_else(|e| {
            tracing::warn!(venue = %venue, error = %e, "Market discovery failed");
            MarketMap::new()
        });

        let Some(binding) = self.adapter.bind(symbol, &markets) else {
            tracing::warn!(
                venue = %venue,
                symbol = %symbol,
                pause_secs = self.settings.unresolved_pause.as_secs(),
                "Unable to resolve venue market, pausing"
            );
            self.sleep(self.settings.unresolved_pause).await;
            return;
        };

        tracing::info!(
            venue = %venue,
            symbol = %binding.symbol,
            market = %binding.market,
            "Venue market resolved"
        );

        match self.adapter.transport(&binding) {
            Transport::Poll(spec) => self.poll_loop(&binding, &spec).await,
            Transport::Stream(spec) => self.stream_loop(&binding, &spec).await,
        }

        tracing::info!(venue = %venue, "Supervisor stopped");
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    // =========================================================================
    // Poll Loop
    // =========================================================================

    async fn poll_loop(&self, binding: &MarketBinding, spec: &PollSpec) {
        let venue = self.venue();
        let mut policy = ReconnectPolicy::new(self.settings.reconnect);

        tracing::info!(venue = %venue, url = %spec.url, "Polling venue");

        loop {
            let fetched = tokio::select! {
                () = self.cancel.cancelled() => return,
                result = http::get_bytes(&self.http, &spec.url, spec.user_agent.as_deref()) => {
                    result.map_err(FeedError::from)
                }
            };

            let wait = match fetched {
                Ok(body) => {
                    policy.reset();
                    self.dispatch(binding, &body).await;
                    self.settings.poll_interval
                }
                Err(e) => {
                    metrics::record_poll_failure(venue);
                    let delay = policy.next_delay();
                    tracing::warn!(
                        venue = %venue,
                        error = %e,
                        attempt = policy.failures(),
                        delay_ms = delay.as_millis(),
                        "Poll failed, backing off"
                    );
                    delay
                }
            };

            if !self.sleep(wait).await {
                return;
            }
        }
    }

    // =========================================================================
    // Stream Loop
    // =========================================================================

    async fn stream_loop(&self, binding: &MarketBinding, spec: &StreamSpec) {
        let venue = self.venue();
        let mut policy = ReconnectPolicy::new(self.settings.reconnect);

        loop {
            tracing::info!(venue = %venue, url = %spec.url, "Connecting to venue stream");

            let connected = tokio::select! {
                () = self.cancel.cancelled() => return,
                result = tokio::time::timeout(self.settings.connect_timeout, connect(spec)) => {
                    result.unwrap_or(Err(FeedError::ConnectTimeout(self.settings.connect_timeout)))
                }
            };

            let ws = match connected {
                Ok(ws) => ws,
                Err(e) => {
                    metrics::record_reconnect(venue);
                    let delay = policy.next_delay();
                    tracing::warn!(
                        venue = %venue,
                        error = %e,
                        attempt = policy.failures(),
                        delay_ms = delay.as_millis(),
                        "Venue connection failed, retrying"
                    );
                    if !self.sleep(delay).await {
                        return;
                    }
                    continue;
                }
            };

            policy.reset();
            metrics::set_connected(venue, true);
            tracing::info!(venue = %venue, market = %binding.market, "Venue stream subscribed");

            let outcome = self.stream(ws, binding, spec.keep_alive.as_ref()).await;
            metrics::set_connected(venue, false);

            match outcome {
                StreamOutcome::Cancelled => return,
                StreamOutcome::Ended(reason) => {
                    tracing::warn!(
                        venue = %venue,
                        reason = %reason,
                        pause_ms = self.settings.stream_restart_pause.as_millis(),
                        "Venue stream ended, reconnecting"
                    );
                }
            }

            metrics::record_reconnect(venue);
            if !self.sleep(self.settings.stream_restart_pause).await {
                return;
            }
        }
    }

    /// Read one connection until it ends or the supervisor is cancelled.
    async fn stream(
        &self,
        ws: WsStream,
        binding: &MarketBinding,
        keep_alive: Option<&KeepAlive>,
    ) -> StreamOutcome {
        let venue = self.venue();
        let (mut write, mut read) = ws.split();

        let keep_alive_frame = keep_alive.map(|k| k.message.clone());
        let mut keep_alive_task = keep_alive.map(|k| KeepAliveHandle::spawn(k.interval, &self.cancel));

        let stale_timeout = self.settings.stale_timeout;
        let mut last_frame = Instant::now();

        let outcome = loop {
            tokio::select! {
                () = self.cancel.cancelled() => break StreamOutcome::Cancelled,

                event = next_keep_alive(&mut keep_alive_task) => {
                    let sent = match (event, &keep_alive_frame) {
                        (Some(KeepAliveEvent::Send), Some(frame)) => {
                            write.send(Message::Text(frame.clone().into())).await
                        }
                        _ => Err(tungstenite::Error::AlreadyClosed),
                    };
                    if let Err(e) = sent {
                        tracing::debug!(venue = %venue, error = %e, "Keep-alive stopped");
                        if let Some(task) = keep_alive_task.take() {
                            task.shutdown().await;
                        }
                    }
                }

                limit = stale_after(stale_timeout, last_frame) => {
                    break StreamOutcome::Ended(FeedError::Stale(limit));
                }

                frame = read.next() => {
                    last_frame = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch(binding, text.as_bytes()).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.dispatch(binding, &data).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break StreamOutcome::Ended(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(venue = %venue, "Server sent close frame");
                            break StreamOutcome::Ended(FeedError::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break StreamOutcome::Ended(e.into()),
                        None => break StreamOutcome::Ended(FeedError::Closed),
                    }
                }
            }
        };

        if let Some(task) = keep_alive_task.take() {
            task.shutdown().await;
        }
        if matches!(outcome, StreamOutcome::Cancelled)
            && let Err(e) = write.send(Message::Close(None)).await
        {
            tracing::debug!(venue = %venue, error = %e, "Close frame not sent");
        }

        outcome
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Parse one payload and publish the resulting event, if any.
    async fn dispatch(&self, binding: &MarketBinding, payload: &[u8]) {
        let venue = self.venue();
        let Some(event) = self.adapter.parse_message(binding, payload) else {
            metrics::record_message_dropped(venue, DropReason::Unparseable);
            tracing::trace!(venue = %venue, bytes = payload.len(), "Payload produced no event");
            return;
        };
        self.publish(event).await;
    }

    async fn publish(&self, event: FeedEvent) {
        let venue = self.venue();

        if let FeedEvent::Orderbook(book) = &event
            && book.is_crossed()
        {
            metrics::record_crossed_book(venue);
            tracing::warn!(
                venue = %venue,
                best_bid = %book.best_bid,
                best_ask = %book.best_ask,
                "Crossed book published"
            );
        }

        let kind = event.kind();
        let published = tokio::select! {
            () = self.cancel.cancelled() => return,
            result = self.hub.publish(event) => result,
        };

        match published {
            Ok(()) => metrics::record_event_published(venue, kind),
            Err(e) => {
                metrics::record_message_dropped(venue, DropReason::HubClosed);
                tracing::warn!(venue = %venue, error = %e, "Event dropped");
            }
        }
    }
}

/// Dial the stream and send the subscription handshake.
async fn connect(spec: &StreamSpec) -> Result<WsStream, FeedError> {
    let mut request = spec.url.as_str().into_client_request().map_err(FeedError::Dial)?;
    if let Some(agent) = &spec.user_agent {
        let value = HeaderValue::from_str(agent).map_err(|e| FeedError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert(USER_AGENT, value);
    }

    let (mut ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(FeedError::Dial)?;

    for frame in &spec.subscriptions {
        ws.send(Message::Text(frame.clone().into()))
            .await
            .map_err(FeedError::Handshake)?;
    }

    Ok(ws)
}

/// Resolve once `limit` has passed since `since`. Never resolves without a limit.
async fn stale_after(limit: Option<Duration>, since: Instant) -> Duration {
    match limit {
        Some(limit) => {
            tokio::time::sleep_until(since + limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

async fn next_keep_alive(task: &mut Option<KeepAliveHandle>) -> Option<KeepAliveEvent> {
    match task {
        Some(handle) => handle.events.recv().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Supervisor Set
// =============================================================================

/// Every running venue supervisor, sharing one cancellation token.
pub struct SupervisorSet {
    cancel: CancellationToken,
    tasks: JoinSet<Venue>,
}

impl SupervisorSet {
    /// Create an empty set whose supervisors stop when `cancel` fires.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: JoinSet::new(),
        }
    }

    /// Start a supervisor for `adapter` as its own task.
    ///
    /// # Errors
    ///
    /// Returns an error if the supervisor's HTTP client cannot be built.
    pub fn spawn<A: FeedAdapter>(
        &mut self,
        adapter: A,
        settings: SupervisorSettings,
        hub: SharedEventHub,
    ) -> Result<(), FeedError> {
        let supervisor = FeedSupervisor::new(adapter, settings, hub, self.cancel.child_token())?;
        let venue = supervisor.venue();
        self.tasks.spawn(async move {
            supervisor.run().await;
            venue
        });
        tracing::info!(venue = %venue, "Supervisor started");
        Ok(())
    }

    /// Number of supervisors not yet joined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no supervisor is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every supervisor.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for every supervisor to finish.
    pub async fn join_all(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(venue) => tracing::debug!(venue = %venue, "Supervisor joined"),
                Err(e) => tracing::error!(error = %e, "Supervisor task failed"),
            }
        }
    }
}

impl std::fmt::Debug for SupervisorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorSet")
            .field("running", &self.tasks.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
