//! Connect-phase watchdog.
//!
//! Runs concurrently with the upstream connect. If response headers do not
//! arrive within the budget, it emits the timeout error as the session's
//! terminal event and cancels the shared token so the pending request aborts.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::downstream::Downstream;
use crate::events::Event;
use crate::types::Error;

#[derive(Debug)]
pub struct Watchdog {
    disarm: CancellationToken,
    handle: JoinHandle<bool>,
}

impl Watchdog {
    /// Start the timer. `cancel` is the token shared with the upstream call.
    pub fn arm(budget: Duration, downstream: Arc<Downstream>, cancel: CancellationToken) -> Self {
        let disarm = CancellationToken::new();
        let disarmed = disarm.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = disarmed.cancelled() => false,
                _ = tokio::time::sleep(budget) => {
                    let err = Error::timeout(format!(
                        "Backend did not respond within {}",
                        humantime_serde::re::humantime::format_duration(budget)
                    ));
                    tracing::warn!("Backend connection timeout after {:?}", budget);
                    downstream.terminate(&Event::from_error(&err)).await;
                    cancel.cancel();
                    true
                }
            }
        });

        Self { disarm, handle }
    }

    /// Stop the timer and report whether it had already fired.
    ///
    /// Waits for a firing in progress to finish, so once this returns the
    /// terminal transition (if any) has happened.
    pub async fn disarm(self) -> bool {
        self.disarm.cancel();
        match self.handle.await {
            Ok(fired) => fired,
            Err(e) => {
                tracing::error!("Watchdog task failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_budget() {
        let (downstream, mut rx) =
            Downstream::channel(SessionId::new(), 4, Duration::from_secs(10));
        let downstream = Arc::new(downstream);
        let cancel = CancellationToken::new();

        let watchdog = Watchdog::arm(Duration::from_secs(60), downstream.clone(), cancel.clone());
        cancel.cancelled().await;

        assert!(watchdog.disarm().await);
        assert!(downstream.is_closed().await);
        let frame = rx.recv().await.unwrap();
        assert!(String::from_utf8_lossy(&frame).contains("TimeoutExceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_before_budget() {
        let (downstream, _rx) = Downstream::channel(SessionId::new(), 4, Duration::from_secs(10));
        let downstream = Arc::new(downstream);
        let cancel = CancellationToken::new();

        let watchdog = Watchdog::arm(Duration::from_secs(60), downstream.clone(), cancel.clone());
        tokio::time::sleep(Duration::from_secs(59)).await;

        assert!(!watchdog.disarm().await);
        assert!(!cancel.is_cancelled());
        assert!(!downstream.is_closed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_budget_is_reported_exactly() {
        let (downstream, mut rx) =
            Downstream::channel(SessionId::new(), 4, Duration::from_secs(10));
        let cancel = CancellationToken::new();

        let watchdog = Watchdog::arm(Duration::from_millis(200), Arc::new(downstream), cancel.clone());
        cancel.cancelled().await;
        assert!(watchdog.disarm().await);

        match Event::decode(&rx.recv().await.unwrap()) {
            Some(Event::Error { error, .. }) => {
                assert_eq!(error, "timeout exceeded: Backend did not respond within 200ms")
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }
}
