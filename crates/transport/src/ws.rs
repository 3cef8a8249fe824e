//! WebSocket transport built on tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::TransportResult;
use crate::transport::{ConnectRequest, Transport, TransportChannel};

const FRAME_BUFFER: usize = 64;

/// Production transport: one WebSocket per opened channel, identity
/// carried in the query string.
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }

    fn endpoint(request: &ConnectRequest) -> String {
        format!(
            "{}?workspaceId={}&participantId={}&token={}",
            request.url,
            urlencoding::encode(&request.workspace_id),
            urlencoding::encode(&request.participant_id),
            urlencoding::encode(&request.token),
        )
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, request: &ConnectRequest) -> TransportResult<TransportChannel> {
        let endpoint = Self::endpoint(request);
        let (stream, _response) = connect_async(endpoint.as_str()).await?;
        debug!(url = %request.url, "websocket established");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);

        // Outbound pump: forwards frames until the manager drops its
        // sender, then closes the socket gracefully.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(error) = sink.send(Message::Text(frame)).await {
                    warn!(%error, "websocket send failed");
                    return;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        // Inbound pump: text frames become inbound events, everything else
        // is transport chatter.
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("websocket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "websocket receive failed");
                        break;
                    }
                }
            }
        });

        Ok(TransportChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
