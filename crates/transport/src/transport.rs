//! The transport seam: anything that can open a framed bidirectional
//! channel for a given identity.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;

use crate::error::TransportResult;

const FRAME_BUFFER: usize = 64;

/// Identity and endpoint for opening the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub workspace_id: String,
    pub participant_id: String,
    pub token: String,
}

/// A live framed channel.
///
/// Dropping `outbound` closes the connection gracefully; the channel is
/// considered lost when `inbound` yields `None`.
pub struct TransportChannel {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &ConnectRequest) -> TransportResult<TransportChannel>;
}

/// Remote end of a [`ChannelTransport`] connection.
///
/// `sent` receives every frame the client emitted; `inject` pushes frames
/// that the client will observe as inbound. Dropping `inject` simulates
/// transport loss.
pub struct TransportPeer {
    pub request: ConnectRequest,
    pub sent: mpsc::Receiver<String>,
    pub inject: mpsc::Sender<String>,
}

/// In-memory transport backed by channel pairs.
///
/// Used by tests and local harnesses to stand in for the WebSocket: each
/// `open` call yields a fresh connection whose far end can be claimed with
/// [`ChannelTransport::take_peer`].
#[derive(Default)]
pub struct ChannelTransport {
    peers: Mutex<VecDeque<TransportPeer>>,
    failures_remaining: Mutex<usize>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the far end of the oldest unclaimed connection.
    pub fn take_peer(&self) -> Option<TransportPeer> {
        self.peers.lock().pop_front()
    }

    pub fn opened_connections(&self) -> usize {
        self.peers.lock().len()
    }

    /// Make the next `open` call fail, simulating an unreachable server.
    pub fn fail_next_open(&self) {
        self.fail_next_opens(1);
    }

    /// Make the next `count` open calls fail.
    pub fn fail_next_opens(&self, count: usize) {
        *self.failures_remaining.lock() = count;
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn open(&self, request: &ConnectRequest) -> TransportResult<TransportChannel> {
        {
            let mut failures = self.failures_remaining.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(crate::error::TransportError::connect(
                    "simulated connect failure",
                ));
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(FRAME_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(FRAME_BUFFER);

        self.peers.lock().push_back(TransportPeer {
            request: request.clone(),
            sent: outbound_rx,
            inject: inbound_tx,
        });

        Ok(TransportChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
