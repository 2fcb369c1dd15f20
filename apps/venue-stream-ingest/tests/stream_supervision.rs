//! Stream Supervision Integration Tests
//!
//! Drives WebSocket venue supervisors against a local server: handshake,
//! publication, keep-alive, ping handling and reconnection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use venue_stream_ingest::domain::symbol::SymbolCanonicalizer;
use venue_stream_ingest::infrastructure::broadcast::EventReceiver;
use venue_stream_ingest::infrastructure::config::AuthToken;
use venue_stream_ingest::infrastructure::supervisor::reconnect::ReconnectConfig;
use venue_stream_ingest::infrastructure::venues::{
    ExtendedAdapter, ExtendedConfig, LighterAdapter, LighterConfig, VestAdapter, VestConfig,
};
use venue_stream_ingest::{
    EventHub, FeedAdapter, FeedSupervisor, OrderbookEvent, SupervisorSettings, Venue,
};

const WAIT: Duration = Duration::from_secs(5);

/// One accepted client connection.
struct Accepted {
    path: String,
    user_agent: Option<String>,
    ws: WebSocketStream<TcpStream>,
}

/// Start a WebSocket server that hands every accepted connection to the test.
async fn spawn_ws_server() -> (String, mpsc::Receiver<Accepted>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let (meta_tx, meta_rx) = oneshot::channel();
                let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    let user_agent = request
                        .headers()
                        .get(USER_AGENT)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let _ = meta_tx.send((request.uri().to_string(), user_agent));
                    Ok(response)
                };
                if let Ok(ws) = accept_hdr_async(stream, callback).await {
                    let (path, user_agent) = meta_rx.await.unwrap_or_default();
                    let _ = tx.send(Accepted { path, user_agent, ws }).await;
                }
            });
        }
    });

    (format!("ws://{addr}"), rx)
}

/// Start a TCP server that records when each connection arrives.
///
/// Connections whose index is in `upgrade` complete the WebSocket handshake,
/// read the subscription and close. Every other connection is dropped before
/// the upgrade, so the client's dial fails.
async fn spawn_scripted_server(upgrade: &'static [usize]) -> (String, mpsc::UnboundedReceiver<Instant>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((stream, _)) = listener.accept().await {
            let _ = tx.send(Instant::now());
            if upgrade.contains(&index) {
                tokio::spawn(async move {
                    if let Ok(mut ws) = accept_async(stream).await {
                        let _ = ws.next().await;
                        let _ = ws.close(None).await;
                    }
                });
            } else {
                drop(stream);
            }
            index += 1;
        }
    });

    (format!("ws://{addr}"), rx)
}

/// Gaps between the first `count + 1` arrivals.
async fn arrival_gaps(arrivals: &mut mpsc::UnboundedReceiver<Instant>, count: usize) -> Vec<Duration> {
    let mut last = timeout(WAIT, arrivals.recv()).await.unwrap().unwrap();
    let mut gaps = Vec::with_capacity(count);
    for _ in 0..count {
        let next = timeout(WAIT, arrivals.recv()).await.unwrap().unwrap();
        gaps.push(next - last);
        last = next;
    }
    gaps
}

fn backoff_settings(initial_ms: u64, max_ms: u64, multiplier: f64) -> SupervisorSettings {
    SupervisorSettings {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier,
            jitter_factor: 0.0,
        },
        ..fast_settings()
    }
}

fn at_least(gap: Duration, ms: u64) -> bool {
    gap + Duration::from_millis(20) >= Duration::from_millis(ms)
}

fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
            jitter_factor: 0.0,
        },
        stream_restart_pause: Duration::from_millis(50),
        poll_interval: Duration::from_millis(50),
        unresolved_pause: Duration::from_millis(50),
        ..SupervisorSettings::default()
    }
}

/// Start a supervisor and return the order-book receiver and its token.
fn start<A: FeedAdapter>(
    adapter: A,
    settings: SupervisorSettings,
) -> (
    EventReceiver<OrderbookEvent>,
    CancellationToken,
    tokio::task::JoinHandle<()>,
) {
    let hub = Arc::new(EventHub::with_defaults());
    let books = hub.orderbooks_rx().unwrap();
    let cancel = CancellationToken::new();
    let supervisor = FeedSupervisor::new(adapter, settings, hub, cancel.clone()).unwrap();
    let task = tokio::spawn(supervisor.run());
    (books, cancel, task)
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
    loop {
        match timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn stop(cancel: CancellationToken, task: tokio::task::JoinHandle<()>) {
    cancel.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

fn vest(ws_url: &str, keepalive_interval: Duration) -> VestAdapter {
    VestAdapter::new(
        VestConfig {
            ws_url: ws_url.to_string(),
            keepalive_interval,
        },
        SymbolCanonicalizer::default(),
    )
}

const VEST_DEPTH: &str = r#"{"channel":"TON-PERP@depth","data":{"bids":[["100","1"]],"asks":[["101","1"]]}}"#;

#[tokio::test]
async fn vest_subscribes_and_publishes_top_of_book() {
    let (url, mut connections) = spawn_ws_server().await;
    let (mut books, cancel, task) = start(vest(&url, Duration::from_secs(60)), fast_settings());

    let mut conn = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    assert!(conn.user_agent.unwrap().starts_with("Mozilla/5.0"));

    let subscribe = next_text(&mut conn.ws).await;
    assert_eq!(
        subscribe,
        serde_json::json!({"method": "SUBSCRIBE", "params": ["TON-PERP@depth"], "id": 1})
    );

    conn.ws.send(Message::Text(r#"{"result":null,"id":1}"#.into())).await.unwrap();
    conn.ws.send(Message::Text(VEST_DEPTH.into())).await.unwrap();

    let book = timeout(WAIT, books.recv()).await.unwrap().unwrap();
    assert_eq!(book.symbol.as_str(), "TONUSDT");
    assert_eq!(book.source, Venue::Vest);
    assert_eq!(book.best_bid, Decimal::from(100));
    assert_eq!(book.best_ask, Decimal::from(101));

    stop(cancel, task).await;
}

#[tokio::test]
async fn vest_sends_keep_alive_after_interval() {
    let (url, mut connections) = spawn_ws_server().await;
    let (_books, cancel, task) = start(vest(&url, Duration::from_millis(100)), fast_settings());

    let mut conn = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let _subscribe = next_text(&mut conn.ws).await;

    let ping = next_text(&mut conn.ws).await;
    assert_eq!(ping, serde_json::json!({"method": "PING", "params": [], "id": 0}));
    let again = next_text(&mut conn.ws).await;
    assert_eq!(again["method"], "PING");

    stop(cancel, task).await;
}

#[tokio::test]
async fn reconnects_and_resubscribes_after_close() {
    let (url, mut connections) = spawn_ws_server().await;
    let (mut books, cancel, task) = start(vest(&url, Duration::from_secs(60)), fast_settings());

    let mut first = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let _subscribe = next_text(&mut first.ws).await;
    first.ws.close(None).await.unwrap();

    let mut second = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let resubscribe = next_text(&mut second.ws).await;
    assert_eq!(resubscribe["method"], "SUBSCRIBE");

    second.ws.send(Message::Text(VEST_DEPTH.into())).await.unwrap();
    let book = timeout(WAIT, books.recv()).await.unwrap().unwrap();
    assert_eq!(book.best_bid, Decimal::from(100));

    stop(cancel, task).await;
}

#[tokio::test]
async fn stale_stream_is_redialed() {
    let (url, mut connections) = spawn_ws_server().await;
    let settings = SupervisorSettings {
        stale_timeout: Some(Duration::from_millis(200)),
        ..fast_settings()
    };
    let (_books, cancel, task) = start(vest(&url, Duration::from_secs(60)), settings);

    let mut first = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let _subscribe = next_text(&mut first.ws).await;

    let second = timeout(WAIT, connections.recv()).await.unwrap();
    assert!(second.is_some());

    stop(cancel, task).await;
}

#[tokio::test]
async fn stale_stream_is_redialed_despite_keep_alive() {
    let (url, mut connections) = spawn_ws_server().await;
    let settings = SupervisorSettings {
        stale_timeout: Some(Duration::from_millis(300)),
        ..fast_settings()
    };
    let (_books, cancel, task) = start(vest(&url, Duration::from_millis(100)), settings);

    let mut first = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let _subscribe = next_text(&mut first.ws).await;
    let ping = next_text(&mut first.ws).await;
    assert_eq!(ping["method"], "PING");

    let second = timeout(WAIT, connections.recv()).await.unwrap();
    assert!(second.is_some());
    drop(first);

    stop(cancel, task).await;
}

#[tokio::test]
async fn dial_without_upgrade_times_out_and_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
            let _ = accepted_tx.send(());
        }
    });

    let settings = SupervisorSettings {
        connect_timeout: Duration::from_millis(200),
        ..fast_settings()
    };
    let (_books, cancel, task) = start(vest(&url, Duration::from_secs(60)), settings);

    for _ in 0..3 {
        timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    }

    stop(cancel, task).await;
}

#[tokio::test]
async fn dial_failures_back_off_exponentially() {
    let (url, mut arrivals) = spawn_scripted_server(&[]).await;
    let (_books, cancel, task) = start(vest(&url, Duration::from_secs(60)), backoff_settings(100, 10_000, 2.0));

    let gaps = arrival_gaps(&mut arrivals, 3).await;
    assert!(at_least(gaps[0], 100), "{gaps:?}");
    assert!(at_least(gaps[1], 200), "{gaps:?}");
    assert!(at_least(gaps[2], 400), "{gaps:?}");

    stop(cancel, task).await;
}

#[tokio::test]
async fn dial_backoff_is_capped() {
    let (url, mut arrivals) = spawn_scripted_server(&[]).await;
    let (_books, cancel, task) = start(vest(&url, Duration::from_secs(60)), backoff_settings(100, 150, 3.0));

    let gaps = arrival_gaps(&mut arrivals, 3).await;
    assert!(at_least(gaps[0], 100), "{gaps:?}");
    for gap in &gaps[1..] {
        assert!(at_least(*gap, 150), "{gaps:?}");
        assert!(*gap < Duration::from_millis(280), "{gaps:?}");
    }

    stop(cancel, task).await;
}

#[tokio::test]
async fn successful_stream_resets_backoff_and_uses_restart_pause() {
    let (url, mut arrivals) = spawn_scripted_server(&[3]).await;
    let settings = SupervisorSettings {
        stream_restart_pause: Duration::from_millis(250),
        ..backoff_settings(100, 10_000, 2.0)
    };
    let (_books, cancel, task) = start(vest(&url, Duration::from_secs(60)), settings);

    // Three failed dials, one stream that the server closes, then one more failed dial.
    let gaps = arrival_gaps(&mut arrivals, 5).await;
    assert!(at_least(gaps[0], 100), "{gaps:?}");
    assert!(at_least(gaps[1], 200), "{gaps:?}");
    assert!(at_least(gaps[2], 400), "{gaps:?}");
    assert!(at_least(gaps[3], 250), "{gaps:?}");
    assert!(gaps[3] < Duration::from_millis(700), "{gaps:?}");
    assert!(at_least(gaps[4], 100), "{gaps:?}");
    assert!(gaps[4] < Duration::from_millis(700), "{gaps:?}");

    stop(cancel, task).await;
}

#[tokio::test]
async fn extended_streams_discovered_market() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "OK",
            "data": [
                {"name": "BTC-USD", "assetName": "BTC", "collateralAssetName": "USD"},
                {"name": "TON-USD", "assetName": "TON", "collateralAssetName": "USD", "status": "ACTIVE"}
            ]
        })))
        .mount(&rest)
        .await;

    let (url, mut connections) = spawn_ws_server().await;
    let adapter = ExtendedAdapter::new(
        ExtendedConfig {
            rest_url: rest.uri(),
            ws_url: url,
        },
        SymbolCanonicalizer::default(),
    );
    let (mut books, cancel, task) = start(adapter, fast_settings());

    let mut conn = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    assert_eq!(conn.path, "/orderbooks/TON-USD?depth=1");
    assert_eq!(
        conn.user_agent.as_deref(),
        Some("crypto-futures-arbitrage-scanner/1.0")
    );

    conn.ws
        .send(Message::Text(
            r#"{"type":"SNAPSHOT","data":{"m":"TON-USD","b":[{"p":"2.10","q":"5"}],"a":[{"p":"2.12","q":"3"}]},"ts":1700000000000}"#.into(),
        ))
        .await
        .unwrap();

    let book = timeout(WAIT, books.recv()).await.unwrap().unwrap();
    assert_eq!(book.source, Venue::Extended);
    assert_eq!(book.best_bid, Decimal::new(210, 2));
    assert_eq!(book.best_ask, Decimal::new(212, 2));
    assert_eq!(book.timestamp, 1_700_000_000_000);

    stop(cancel, task).await;
}

#[tokio::test]
async fn extended_falls_back_when_discovery_fails() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/markets"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&rest)
        .await;

    let (url, mut connections) = spawn_ws_server().await;
    let adapter = ExtendedAdapter::new(
        ExtendedConfig {
            rest_url: rest.uri(),
            ws_url: url,
        },
        SymbolCanonicalizer::default(),
    );
    let (_books, cancel, task) = start(adapter, fast_settings());

    let conn = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    assert_eq!(conn.path, "/orderbooks/TON-USD?depth=1");

    stop(cancel, task).await;
}

#[tokio::test]
async fn server_ping_is_answered_with_pong() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&rest)
        .await;

    let (url, mut connections) = spawn_ws_server().await;
    let adapter = ExtendedAdapter::new(
        ExtendedConfig {
            rest_url: rest.uri(),
            ws_url: url,
        },
        SymbolCanonicalizer::default(),
    );
    let (_books, cancel, task) = start(adapter, fast_settings());

    let mut conn = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    conn.ws.send(Message::Ping(vec![7, 7].into())).await.unwrap();

    let pong = loop {
        if let Message::Pong(data) = timeout(WAIT, conn.ws.next()).await.unwrap().unwrap().unwrap() {
            break data;
        }
    };
    assert_eq!(&pong[..], &[7_u8, 7]);

    stop(cancel, task).await;
}

#[tokio::test]
async fn lighter_subscribes_to_discovered_book_with_token() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orderBooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 200,
            "order_books": [
                {"symbol": "ETH", "market_id": 0, "market_type": "perp", "status": "active"},
                {"symbol": "TON", "market_id": 17, "market_type": "perp", "status": "active"}
            ]
        })))
        .mount(&rest)
        .await;

    let (url, mut connections) = spawn_ws_server().await;
    let adapter = LighterAdapter::new(
        LighterConfig {
            rest_url: rest.uri(),
            ws_url: url,
            auth: AuthToken::new("ro-token"),
        },
        SymbolCanonicalizer::default(),
    );
    let (mut books, cancel, task) = start(adapter, fast_settings());

    let mut conn = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let subscribe = next_text(&mut conn.ws).await;
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(subscribe["channel"], "order_book/17");
    assert_eq!(subscribe["auth"], "ro-token");

    conn.ws
        .send(Message::Text(
            r#"{"type":"update/order_book","channel":"order_book:18","order_book":{"asks":[{"price":"9"}],"bids":[{"price":"8"}]}}"#.into(),
        ))
        .await
        .unwrap();
    conn.ws
        .send(Message::Text(
            r#"{"type":"update/order_book","channel":"order_book:17","order_book":{"asks":[{"price":"2.12"},{"price":"2.11"}],"bids":[{"price":"2.09"},{"price":"2.10"}]}}"#.into(),
        ))
        .await
        .unwrap();

    let book = timeout(WAIT, books.recv()).await.unwrap().unwrap();
    assert_eq!(book.source, Venue::Lighter);
    assert_eq!(book.best_bid, Decimal::new(210, 2));
    assert_eq!(book.best_ask, Decimal::new(211, 2));

    stop(cancel, task).await;
}

#[tokio::test]
async fn lighter_without_market_stops_after_pause() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orderBooks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&rest)
        .await;

    let (url, mut connections) = spawn_ws_server().await;
    let adapter = LighterAdapter::new(
        LighterConfig {
            rest_url: rest.uri(),
            ws_url: url,
            auth: None,
        },
        SymbolCanonicalizer::default(),
    );
    let (_books, _cancel, task) = start(adapter, fast_settings());

    timeout(WAIT, task).await.unwrap().unwrap();
    assert!(connections.try_recv().is_err());
}
