//! Ephemeral typing/presence state with debounce and TTL auto-clear.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outbound typing signal handed to the transport glue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub room_id: String,
    pub is_typing: bool,
}

struct OutboundTyping {
    last_emit: Instant,
    idle_task: JoinHandle<()>,
}

struct InboundTyping {
    is_typing: bool,
    last_updated: Instant,
    generation: u64,
    expiry_task: Option<JoinHandle<()>>,
}

/// Tracks typing state in both directions.
///
/// Outbound: `set_typing` is debounced so a keystroke burst emits at most
/// one signal per debounce window, and a stop signal fires automatically
/// after the idle window even if the caller never clears it.
///
/// Inbound: observed peer state expires after a TTL so a lost stop event
/// from a disconnected peer can never leave presence stuck on "typing".
pub struct TypingPresenceTracker {
    signals: mpsc::Sender<TypingSignal>,
    debounce: Duration,
    idle_stop: Duration,
    ttl: Duration,
    outbound: Arc<Mutex<HashMap<(String, String), OutboundTyping>>>,
    inbound: Arc<Mutex<HashMap<(String, String), InboundTyping>>>,
}

impl TypingPresenceTracker {
    pub fn new(
        signals: mpsc::Sender<TypingSignal>,
        debounce: Duration,
        idle_stop: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            signals,
            debounce,
            idle_stop,
            ttl,
            outbound: Arc::new(Mutex::new(HashMap::new())),
            inbound: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record local typing activity and emit the debounced outbound signal.
    pub fn set_typing(&self, room_id: &str, participant_id: &str, is_typing: bool) {
        let key = (room_id.to_string(), participant_id.to_string());
        let mut outbound = self.outbound.lock();

        if !is_typing {
            if let Some(entry) = outbound.remove(&key) {
                entry.idle_task.abort();
                self.emit(room_id, false);
            }
            return;
        }

        let now = Instant::now();
        let previous = outbound.remove(&key);
        let previous_emit = previous.as_ref().map(|entry| entry.last_emit);
        if let Some(entry) = previous {
            entry.idle_task.abort();
        }

        let should_emit = previous_emit
            .map_or(true, |last| now.duration_since(last) >= self.debounce);
        if should_emit {
            self.emit(room_id, true);
        }

        // Keep the window anchored at the last actual emit so a steady
        // keystroke stream still refreshes the remote TTL once per window.
        let last_emit = if should_emit {
            now
        } else {
            previous_emit.unwrap_or(now)
        };

        let idle_task = self.spawn_idle_stop(key.clone());
        outbound.insert(
            key,
            OutboundTyping {
                last_emit,
                idle_task,
            },
        );
    }

    fn spawn_idle_stop(&self, key: (String, String)) -> JoinHandle<()> {
        let outbound = Arc::clone(&self.outbound);
        let signals = self.signals.clone();
        let idle_stop = self.idle_stop;
        tokio::spawn(async move {
            tokio::time::sleep(idle_stop).await;
            let removed = outbound.lock().remove(&key).is_some();
            if removed {
                debug!(room_id = %key.0, "typing idle window elapsed, auto-stopping");
                let _ = signals.try_send(TypingSignal {
                    room_id: key.0,
                    is_typing: false,
                });
            }
        })
    }

    /// Apply an inbound typing event for a remote participant.
    pub fn observe(&self, room_id: &str, participant_id: &str, is_typing: bool) {
        let key = (room_id.to_string(), participant_id.to_string());
        let mut inbound = self.inbound.lock();

        let generation = inbound.get(&key).map_or(0, |entry| entry.generation) + 1;
        if let Some(previous) = inbound.remove(&key) {
            if let Some(task) = previous.expiry_task {
                task.abort();
            }
        }

        if !is_typing {
            inbound.insert(
                key,
                InboundTyping {
                    is_typing: false,
                    last_updated: Instant::now(),
                    generation,
                    expiry_task: None,
                },
            );
            return;
        }

        let expiry_task = {
            let inbound = Arc::clone(&self.inbound);
            let key = key.clone();
            let ttl = self.ttl;
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let mut inbound = inbound.lock();
                if let Some(entry) = inbound.get_mut(&key) {
                    if entry.generation == generation && entry.is_typing {
                        debug!(room_id = %key.0, participant_id = %key.1, "typing TTL expired without refresh");
                        entry.is_typing = false;
                        entry.expiry_task = None;
                    }
                }
            })
        };

        inbound.insert(
            key,
            InboundTyping {
                is_typing: true,
                last_updated: Instant::now(),
                generation,
                expiry_task: Some(expiry_task),
            },
        );
    }

    pub fn is_typing(&self, room_id: &str, participant_id: &str) -> bool {
        self.inbound
            .lock()
            .get(&(room_id.to_string(), participant_id.to_string()))
            .map_or(false, |entry| entry.is_typing)
    }

    /// Participants currently marked typing in a room.
    pub fn typing_participants(&self, room_id: &str) -> Vec<String> {
        let mut participants: Vec<String> = self
            .inbound
            .lock()
            .iter()
            .filter(|((room, _), entry)| room == room_id && entry.is_typing)
            .map(|((_, participant), _)| participant.clone())
            .collect();
        participants.sort();
        participants
    }

    pub fn last_updated(&self, room_id: &str, participant_id: &str) -> Option<Instant> {
        self.inbound
            .lock()
            .get(&(room_id.to_string(), participant_id.to_string()))
            .map(|entry| entry.last_updated)
    }

    /// Abort every timer this tracker owns.
    pub fn shutdown(&self) {
        let mut outbound = self.outbound.lock();
        for (_, entry) in outbound.drain() {
            entry.idle_task.abort();
        }
        let mut inbound = self.inbound.lock();
        for (_, entry) in inbound.drain() {
            if let Some(task) = entry.expiry_task {
                task.abort();
            }
        }
    }

    fn emit(&self, room_id: &str, is_typing: bool) {
        let signal = TypingSignal {
            room_id: room_id.to_string(),
            is_typing,
        };
        if self.signals.try_send(signal).is_err() {
            warn!(room_id, is_typing, "typing signal channel full, signal dropped");
        }
    }
}

impl Drop for TypingPresenceTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
