//! Transport-loss recovery with a bounded, observable retry budget.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use frontdesk_config::ReconnectConfig;
use frontdesk_messages::MessageLifecycleStore;
use frontdesk_transport::{ConnectionManager, TransportStatus};

const RECONNECT_NOTICE: &str = "reconnecting…";

/// Caller-visible reconnection state.
///
/// `Failed` is terminal: the budget is bounded and exhaustion is surfaced
/// rather than retried silently forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectState {
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

/// Watches the manager's transport status and replays the join/resume
/// handshake after a loss.
///
/// On re-entering `Connected` the coordinator relies on the manager's
/// connect path for resynchronization: the handshake re-requests server
/// time, and local room membership is cleared so the server's
/// `room-details` snapshot replaces it wholesale. Local transcript notices
/// inserted during the outage are pruned.
pub struct ReconnectionCoordinator {
    manager: Arc<ConnectionManager>,
    store: Arc<Mutex<MessageLifecycleStore>>,
    config: ReconnectConfig,
}

impl ReconnectionCoordinator {
    pub fn new(
        manager: Arc<ConnectionManager>,
        store: Arc<Mutex<MessageLifecycleStore>>,
        config: ReconnectConfig,
    ) -> Self {
        Self {
            manager,
            store,
            config,
        }
    }

    /// Start the coordinator; returns the state watch and the task handle.
    pub fn spawn(self) -> (watch::Receiver<ReconnectState>, JoinHandle<()>) {
        let (state_tx, state_rx) = watch::channel(ReconnectState::Connected);
        let handle = tokio::spawn(self.run(state_tx));
        (state_rx, handle)
    }

    async fn run(self, state_tx: watch::Sender<ReconnectState>) {
        let mut status_rx = self.manager.status_watch();

        loop {
            while *status_rx.borrow_and_update() != TransportStatus::Disconnected {
                if status_rx.changed().await.is_err() {
                    return;
                }
            }

            let Some(identity) = self.manager.identity() else {
                // Explicit disconnect or logout: nothing to resume.
                if status_rx.changed().await.is_err() {
                    return;
                }
                continue;
            };

            warn!("transport lost, starting reconnect attempts");
            {
                let mut store = self.store.lock();
                for room_id in store.room_ids() {
                    store.insert_system_notice(&room_id, RECONNECT_NOTICE);
                }
            }

            let mut reconnected = false;
            for attempt in 1..=self.config.max_attempts {
                let _ = state_tx.send(ReconnectState::Reconnecting { attempt });
                tokio::time::sleep(self.backoff(attempt)).await;

                if self.manager.connect(identity.clone()).await.is_some() {
                    reconnected = true;
                    info!(attempt, "reconnected");
                    break;
                }
                warn!(attempt, "reconnect attempt failed");
            }

            {
                let mut store = self.store.lock();
                for room_id in store.room_ids() {
                    store.prune_system_notices(&room_id);
                }
            }

            if reconnected {
                let _ = state_tx.send(ReconnectState::Connected);
            } else {
                let _ = state_tx.send(ReconnectState::Failed);
                warn!(
                    max_attempts = self.config.max_attempts,
                    "reconnect budget exhausted"
                );
                return;
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }
}
