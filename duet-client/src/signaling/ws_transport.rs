use crate::error::{CallError, CallResult};
use crate::signaling::signaling_output::{
    SignalingChannel, SignalingEvent, SignalingOutput, SignalingTransport,
};
use async_trait::async_trait;
use duet_core::{PeerId, RoomId, SignalEnvelope, SignalMessage, SignalPayload};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Relay connection over a WebSocket carrying JSON `SignalMessage` frames.
#[derive(Debug, Clone)]
pub struct WsSignalingTransport {
    url: String,
}

impl WsSignalingTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SignalingTransport for WsSignalingTransport {
    async fn connect(&self, room: &RoomId) -> CallResult<SignalingChannel> {
        info!("Connecting to relay {}", self.url);
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| CallError::SignalingTransport(format!("{}: {}", self.url, e)))?;

        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::channel(256);
        let local_id: Arc<RwLock<Option<PeerId>>> = Arc::new(RwLock::new(None));

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
            debug!("Relay send task finished");
        });

        let recv_task = tokio::spawn({
            let local_id = local_id.clone();
            async move {
                let reason = loop {
                    let text = match receiver.next().await {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) => break "relay closed the connection".to_owned(),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => break format!("relay connection error: {}", e),
                        None => break "relay connection ended".to_owned(),
                    };

                    let frame = match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Invalid SignalMessage from relay: {:?}", e);
                            continue;
                        }
                    };

                    let Some(event) = translate_frame(frame, &local_id) else {
                        continue;
                    };
                    if event_tx.send(event).await.is_err() {
                        return;
                    }
                };

                info!("Relay connection lost: {}", reason);
                let _ = event_tx.send(SignalingEvent::Closed(reason)).await;
            }
        });

        let output = WsSignalingOutput {
            tx: Mutex::new(Some(tx)),
            local_id,
            recv_task: recv_task.abort_handle(),
        };
        output.send_frame(&SignalMessage::JoinRoom {
            room: room.to_string(),
        })?;

        Ok(SignalingChannel {
            output: Arc::new(output),
            events: event_rx,
        })
    }
}

fn translate_frame(
    frame: SignalMessage,
    local_id: &RwLock<Option<PeerId>>,
) -> Option<SignalingEvent> {
    match frame {
        SignalMessage::Welcome { peer_id } => {
            if let Ok(mut id) = local_id.write() {
                *id = Some(peer_id.clone());
            }
            Some(SignalingEvent::Welcome(peer_id))
        }
        SignalMessage::UserConnected { peer_id } => Some(SignalingEvent::PeerJoined(peer_id)),
        SignalMessage::UserDisconnected { peer_id } => Some(SignalingEvent::PeerLeft(peer_id)),
        SignalMessage::Signal(SignalEnvelope { to, from, data }) => {
            let ours = local_id
                .read()
                .map(|id| id.as_ref().is_none_or(|id| *id == to))
                .unwrap_or(true);
            if !ours {
                debug!("Dropping signal addressed to {}", to);
                return None;
            }
            Some(SignalingEvent::Signal {
                from,
                payload: data,
            })
        }
        SignalMessage::JoinRoom { .. } => {
            warn!("Relay echoed a join-room frame");
            None
        }
    }
}

struct WsSignalingOutput {
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    local_id: Arc<RwLock<Option<PeerId>>>,
    recv_task: AbortHandle,
}

impl WsSignalingOutput {
    fn send_frame(&self, frame: &SignalMessage) -> CallResult<()> {
        let json = serde_json::to_string(frame).map_err(|e| {
            error!("Failed to serialize signal message: {}", e);
            CallError::SignalingTransport(e.to_string())
        })?;

        let guard = self
            .tx
            .lock()
            .map_err(|_| CallError::SignalingTransport("relay sender poisoned".to_owned()))?;
        let Some(tx) = guard.as_ref() else {
            return Err(CallError::SignalingTransport("relay connection closed".to_owned()));
        };
        tx.send(Message::Text(json))
            .map_err(|_| CallError::SignalingTransport("relay connection closed".to_owned()))
    }
}

#[async_trait]
impl SignalingOutput for WsSignalingOutput {
    async fn send_signal(&self, to: PeerId, payload: SignalPayload) -> CallResult<()> {
        let from = self
            .local_id
            .read()
            .ok()
            .and_then(|id| id.clone())
            .ok_or_else(|| {
                CallError::SignalingTransport("relay has not assigned an identity yet".to_owned())
            })?;

        self.send_frame(&SignalMessage::Signal(SignalEnvelope {
            to,
            from,
            data: payload,
        }))
    }

    async fn close(&self) {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if sender.is_some() {
            info!("Closing relay connection");
            self.recv_task.abort();
        }
    }
}
