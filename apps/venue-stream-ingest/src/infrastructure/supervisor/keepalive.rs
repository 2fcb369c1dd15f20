//! Keep-Alive Manager
//!
//! Some venues close idle sockets unless the client sends an application
//! level ping on a fixed interval. The manager runs as its own task and
//! asks the connection loop to send the venue's keep-alive frame; the
//! connection loop owns the socket and performs the write.
//!
//! Each manager lives exactly as long as one connection: it runs under a
//! child of the supervisor's cancellation token and is cancelled and
//! joined when that connection ends.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Events emitted by the keep-alive manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveEvent {
    /// Time to send the keep-alive frame.
    Send,
}

/// Periodic keep-alive ticker for one connection.
pub struct KeepAliveManager {
    interval: Duration,
    event_tx: mpsc::Sender<KeepAliveEvent>,
    cancel: CancellationToken,
}

impl KeepAliveManager {
    /// Create a new manager.
    #[must_use]
    pub const fn new(
        interval: Duration,
        event_tx: mpsc::Sender<KeepAliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            interval,
            event_tx,
            cancel,
        }
    }

    /// Emit [`KeepAliveEvent::Send`] every interval, first one interval
    /// after start.
    ///
    /// Stops when cancelled or when the receiving side is gone.
    pub async fn run(self) {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keep-alive manager cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if self.event_tx.send(KeepAliveEvent::Send).await.is_err() {
                        tracing::debug!("Keep-alive receiver dropped, stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// A running keep-alive task bound to one connection.
pub struct KeepAliveHandle {
    /// Keep-alive requests for the connection loop.
    pub events: mpsc::Receiver<KeepAliveEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl KeepAliveHandle {
    /// Spawn a manager under a child of `parent`.
    #[must_use]
    pub fn spawn(interval: Duration, parent: &CancellationToken) -> Self {
        let (event_tx, events) = mpsc::channel(4);
        let cancel = parent.child_token();
        let task = tokio::spawn(KeepAliveManager::new(interval, event_tx, cancel.clone()).run());
        Self {
            events,
            cancel,
            task,
        }
    }

    /// Cancel the manager and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "Keep-alive task ended abnormally");
        }
    }
}
