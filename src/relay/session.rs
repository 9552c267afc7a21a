//! Relay sessions — one upstream connection reframed onto one downstream
//! channel.
//!
//! State machine:
//! ```text
//!   Idle ──▶ Connecting ──▶ Streaming ──▶ Closed
//!               │                           ▲
//!               └───────────────────────────┘  (connect failure / timeout)
//! ```
//! Every path ends in `Closed`, and the downstream channel is closed exactly
//! once: either by the session itself or by the connect watchdog, both
//! through [`Downstream`].

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::downstream::{Downstream, WriteOutcome};
use super::reframer::Reframer;
use super::watchdog::Watchdog;
use crate::events::{peek_kind, Event, EventKind};
use crate::types::{Error, ErrorKind, RelayConfig, SessionId};
use crate::upstream::{ByteStream, Trigger, Upstream};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Upstream delivered its own `complete` event.
    Completed,
    /// Upstream delivered its own `error` event.
    UpstreamError,
    /// The relay synthesised the terminal error.
    Failed(ErrorKind),
    /// The connect watchdog fired.
    TimedOut,
    /// Consumer hung up before the terminal event.
    ConsumerGone,
    /// Consumer stopped reading for longer than the write timeout.
    ConsumerStalled,
}

/// Session factory shared by all requests.
#[derive(Debug, Clone)]
pub struct Relay {
    upstream: Arc<dyn Upstream>,
    config: RelayConfig,
    connect_timeout: Duration,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(upstream: Arc<dyn Upstream>, config: RelayConfig, connect_timeout: Duration) -> Self {
        Self {
            upstream,
            config,
            connect_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie every session to `shutdown`; cancelling it ends open sessions
    /// with a `Cancelled` error event.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    /// Start a session with a fresh id.
    pub fn open(&self, trigger: Trigger) -> RelayStream {
        self.open_with_id(trigger, SessionId::new())
    }

    /// Start a session and return its downstream stream.
    pub fn open_with_id(&self, trigger: Trigger, session_id: SessionId) -> RelayStream {
        let (downstream, rx) = Downstream::channel(
            session_id.clone(),
            self.config.channel_capacity,
            self.config.write_timeout,
        );

        let session = Session {
            id: session_id.clone(),
            trigger,
            upstream: self.upstream.clone(),
            downstream: Arc::new(downstream),
            cancel: self.shutdown.child_token(),
            state: SessionState::Idle,
            connect_timeout: self.connect_timeout,
            max_frame_bytes: self.config.max_buffer_bytes,
        };
        let task = tokio::spawn(session.run());

        RelayStream {
            session_id,
            frames: ReceiverStream::new(rx),
            task,
        }
    }
}

/// Downstream view of one session: the frames in emission order.
#[derive(Debug)]
pub struct RelayStream {
    session_id: SessionId,
    frames: ReceiverStream<Bytes>,
    task: JoinHandle<SessionOutcome>,
}

impl RelayStream {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Split into id, frame stream, and the session task.
    pub fn into_parts(self) -> (SessionId, ReceiverStream<Bytes>, JoinHandle<SessionOutcome>) {
        (self.session_id, self.frames, self.task)
    }
}

impl Stream for RelayStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        Pin::new(&mut self.frames).poll_next(cx)
    }
}

struct Session {
    id: SessionId,
    trigger: Trigger,
    upstream: Arc<dyn Upstream>,
    downstream: Arc<Downstream>,
    cancel: CancellationToken,
    state: SessionState,
    connect_timeout: Duration,
    max_frame_bytes: usize,
}

impl Session {
    async fn run(mut self) -> SessionOutcome {
        tracing::info!(
            session = %self.id,
            endpoint = ?self.trigger.endpoint(),
            "Relay session opened",
        );

        let outcome = self.relay().await;
        self.transition(SessionState::Closed);
        // Release the upstream connection whatever the path.
        self.cancel.cancel();

        tracing::info!(session = %self.id, ?outcome, "Relay session closed");
        outcome
    }

    async fn relay(&mut self) -> SessionOutcome {
        self.transition(SessionState::Connecting);
        let outcome = self.downstream.forward(Event::connecting().encode()).await;
        if let Some(outcome) = abandoned(outcome) {
            return outcome;
        }

        let watchdog = Watchdog::arm(
            self.connect_timeout,
            self.downstream.clone(),
            self.cancel.clone(),
        );
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled("relay shutting down")),
            _ = self.downstream.consumer_gone() => {
                watchdog.disarm().await;
                return self.consumer_left().await;
            }
            opened = self.upstream.open(&self.trigger, self.cancel.clone()) => opened,
        };
        if watchdog.disarm().await {
            // Any late response is dropped here, unread.
            return SessionOutcome::TimedOut;
        }

        match opened {
            Ok(body) => {
                self.transition(SessionState::Streaming);
                self.pump(body).await
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Sequential read loop: one upstream read in flight at a time.
    async fn pump(&mut self, mut body: ByteStream) -> SessionOutcome {
        let mut reframer = Reframer::new(self.max_frame_bytes);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.fail(Error::cancelled("relay shutting down")).await;
                }
                _ = self.downstream.consumer_gone() => return self.consumer_left().await,
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    reframer.push(&chunk);
                    loop {
                        match reframer.next_frame() {
                            Ok(Some(frame)) => {
                                if let Some(outcome) = self.forward_frame(frame).await {
                                    return outcome;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => return self.fail(e).await,
                        }
                    }
                }
                Some(Err(e)) => return self.fail(e).await,
                None => {
                    tracing::debug!(
                        session = %self.id,
                        "Upstream stream completed with {} bytes buffered",
                        reframer.buffered(),
                    );
                    if let Some(residual) = reframer.finish() {
                        tracing::debug!(
                            session = %self.id,
                            "Flushing {} residual bytes",
                            residual.len(),
                        );
                        if let Some(outcome) = self.forward_frame(residual).await {
                            return outcome;
                        }
                    }
                    return self
                        .fail(Error::stream_read(
                            "Upstream closed the stream before completing",
                        ))
                        .await;
                }
            }
        }
    }

    /// Forward one upstream frame verbatim. Returns an outcome once the
    /// session must stop: the frame was terminal, or the consumer is gone.
    async fn forward_frame(&mut self, frame: Bytes) -> Option<SessionOutcome> {
        let kind = peek_kind(&frame);
        tracing::debug!(session = %self.id, ?kind, "Forwarding {} byte frame", frame.len());

        if let Some(outcome) = abandoned(self.downstream.forward(frame).await) {
            return Some(outcome);
        }

        match kind {
            Some(EventKind::Complete) => {
                self.downstream.close().await;
                Some(SessionOutcome::Completed)
            }
            Some(EventKind::Error) => {
                tracing::warn!(session = %self.id, "Backend reported an error event");
                self.downstream.close().await;
                Some(SessionOutcome::UpstreamError)
            }
            _ => None,
        }
    }

    /// The consumer dropped its end while the upstream was quiet.
    async fn consumer_left(&self) -> SessionOutcome {
        tracing::info!(session = %self.id, "Consumer disconnected, abandoning upstream");
        self.downstream.close().await;
        SessionOutcome::ConsumerGone
    }

    /// Terminate with a synthesised error event.
    async fn fail(&mut self, err: Error) -> SessionOutcome {
        match &err {
            Error::Cancelled(_) => tracing::info!(session = %self.id, "{}", err),
            _ => tracing::warn!(session = %self.id, "Relay failed: {}", err),
        }

        if self.downstream.terminate(&Event::from_error(&err)).await {
            SessionOutcome::Failed(err.kind())
        } else {
            SessionOutcome::ConsumerGone
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(session = %self.id, "{:?} -> {:?}", self.state, next);
        debug_assert_ne!(self.state, SessionState::Closed, "session already closed");
        self.state = next;
    }
}

/// Map a failed write onto the outcome that ends the session.
fn abandoned(outcome: WriteOutcome) -> Option<SessionOutcome> {
    match outcome {
        WriteOutcome::Delivered => None,
        WriteOutcome::AlreadyClosed | WriteOutcome::ConsumerGone => {
            Some(SessionOutcome::ConsumerGone)
        }
        WriteOutcome::Stalled => Some(SessionOutcome::ConsumerStalled),
    }
}
