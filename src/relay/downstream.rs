//! Guarded downstream sink.
//!
//! The sender half of the session's bounded channel lives behind an async
//! mutex. Forwarding and the terminal transition both take that lock, so the
//! watchdog and the read loop can never both close the channel, and nothing
//! is written after the terminal event.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex};

use crate::events::Event;
use crate::types::SessionId;

/// Result of a best-effort downstream write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Frame queued for the consumer.
    Delivered,
    /// Sink was already closed by this session; the frame was dropped.
    AlreadyClosed,
    /// Consumer hung up; the sink is now closed.
    ConsumerGone,
    /// Consumer did not accept the frame within the write timeout; the sink
    /// is now closed.
    Stalled,
}

/// Downstream half of a relay session.
#[derive(Debug)]
pub struct Downstream {
    session_id: SessionId,
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    write_timeout: Duration,
}

impl Downstream {
    /// Create a sink and the receiver the consumer reads from.
    pub fn channel(
        session_id: SessionId,
        capacity: usize,
        write_timeout: Duration,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                session_id,
                tx: Mutex::new(Some(tx)),
                write_timeout,
            },
            rx,
        )
    }

    /// Queue one frame. Never fails; see [`WriteOutcome`].
    pub async fn forward(&self, frame: Bytes) -> WriteOutcome {
        let mut guard = self.tx.lock().await;
        let Some(tx) = guard.as_ref() else {
            tracing::debug!(session = %self.session_id, "Dropping write after close");
            return WriteOutcome::AlreadyClosed;
        };

        match tx.send_timeout(frame, self.write_timeout).await {
            Ok(()) => WriteOutcome::Delivered,
            Err(SendTimeoutError::Closed(_)) => {
                tracing::info!(session = %self.session_id, "Consumer disconnected");
                *guard = None;
                WriteOutcome::ConsumerGone
            }
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    session = %self.session_id,
                    "Consumer stalled for {:?}, closing downstream",
                    self.write_timeout,
                );
                *guard = None;
                WriteOutcome::Stalled
            }
        }
    }

    /// Emit `event` as the last frame and close the channel.
    ///
    /// Returns `true` if this call performed the terminal transition, `false`
    /// if the sink was already closed (the event is dropped).
    pub async fn terminate(&self, event: &Event) -> bool {
        let mut guard = self.tx.lock().await;
        let Some(tx) = guard.take() else {
            tracing::debug!(
                session = %self.session_id,
                "Terminal {:?} event dropped, downstream already closed",
                event.kind(),
            );
            return false;
        };

        if let Err(e) = tx.send_timeout(event.encode(), self.write_timeout).await {
            tracing::info!(
                session = %self.session_id,
                "Terminal event not delivered: {}",
                e,
            );
        }
        true
    }

    /// Close without a synthesised event. Same single-transition rule as
    /// [`Downstream::terminate`].
    pub async fn close(&self) -> bool {
        self.tx.lock().await.take().is_some()
    }

    /// Resolves once the consumer has dropped its receiver. Pending forever
    /// if this session already closed the sink.
    pub async fn consumer_gone(&self) {
        let tx = self.tx.lock().await.clone();
        match tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_closed(&self) -> bool {
        self.tx.lock().await.is_none()
    }
}
