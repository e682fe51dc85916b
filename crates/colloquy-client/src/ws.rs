//! WebSocket plumbing for the remote live session: connect, send the
//! session open request, then run a single task that owns the socket
//! and bridges it to bounded channels in both directions.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::error::{LiveError, Result};
use crate::pcm::WireEnvelope;
use crate::protocol::{parse_server_frame, ClientMessage, ServerEvent, SessionSetup};

#[derive(Debug)]
pub(crate) enum SendCmd {
    Media(WireEnvelope),
    Close,
}

/// Outbound half of the remote link. Sends never wait for transport
/// completion; ordering is preserved by the channel.
#[derive(Clone, Debug)]
pub struct LiveSender {
    pub(crate) tx: mpsc::Sender<SendCmd>,
}

impl LiveSender {
    /// Queues one media message. Returns `Ok(false)` when the transport
    /// buffer is full and the chunk was dropped, and an error when the
    /// socket task has gone away.
    pub fn try_send_media(&self, envelope: WireEnvelope) -> Result<bool> {
        match self.tx.try_send(SendCmd::Media(envelope)) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(LiveError::Transport("socket task ended".to_string()))
            }
        }
    }

    pub(crate) fn try_close(&self) -> bool {
        self.tx.try_send(SendCmd::Close).is_ok()
    }
}

/// A connected remote session: typed inbound events plus the sender.
pub struct RemoteLink {
    pub(crate) events: mpsc::Receiver<ServerEvent>,
    pub(crate) sender: LiveSender,
    pub(crate) task: Option<JoinHandle<()>>,
}

impl RemoteLink {
    /// Requests a clean close. The socket task exits after flushing the
    /// close frame; if it can no longer be reached it is aborted.
    pub(crate) fn close(mut self) {
        if !self.sender.try_close() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}

pub(crate) fn build_session_url(base: &str, api_key: &str) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| LiveError::RemoteOpen(e.to_string()))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

/// Connects and sends the session open request. The session counts as
/// open once the setup frame has been flushed.
pub async fn connect(base_url: &str, api_key: &str, setup: SessionSetup) -> Result<RemoteLink> {
    let url = build_session_url(base_url, api_key)?;
    let (mut ws, _resp) = connect_async(url.as_str())
        .await
        .map_err(|e| LiveError::RemoteOpen(e.to_string()))?;

    let setup_frame = serde_json::to_string(&ClientMessage::Setup(setup))
        .map_err(|e| LiveError::RemoteOpen(e.to_string()))?;
    ws.send(Message::Text(setup_frame.into()))
        .await
        .map_err(|e| LiveError::RemoteOpen(e.to_string()))?;
    debug!("remote session open");

    let (mut ws_write, mut ws_read) = ws.split();
    let (tx, mut rx) = mpsc::channel::<SendCmd>(64);
    let (out_tx, out_rx) = mpsc::channel::<ServerEvent>(64);

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        SendCmd::Media(envelope) => {
                            let frame = match serde_json::to_string(&ClientMessage::Media(envelope)) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    let _ = out_tx.send(ServerEvent::TransportError(e.to_string())).await;
                                    break;
                                }
                            };
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                let _ = out_tx.send(ServerEvent::TransportError(e.to_string())).await;
                                break;
                            }
                        }
                        SendCmd::Close => {
                            let _ = ws_write.send(Message::Close(None)).await;
                            let _ = out_tx.send(ServerEvent::Closed).await;
                            break;
                        }
                    }
                }
                item = ws_read.next() => {
                    let Some(item) = item else {
                        let _ = out_tx.send(ServerEvent::Closed).await;
                        break;
                    };
                    match item {
                        Ok(Message::Text(text)) => match parse_server_frame(text.as_str()) {
                            Ok(events) => {
                                for event in events {
                                    if out_tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                let _ = out_tx.send(ServerEvent::TransportError(e.to_string())).await;
                                break;
                            }
                        },
                        Ok(Message::Close(_)) => {
                            let _ = out_tx.send(ServerEvent::Closed).await;
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = out_tx.send(ServerEvent::TransportError(e.to_string())).await;
                            break;
                        }
                    }
                }
            }
        }
        debug!("socket task finished");
    });

    Ok(RemoteLink {
        events: out_rx,
        sender: LiveSender { tx },
        task: Some(task),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_url_carries_credential() {
        let url = build_session_url("ws://localhost:8080/api/live-session", "k-123").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8080/api/live-session?key=k-123"
        );
    }

    #[test]
    fn bad_url_is_remote_open_error() {
        let err = build_session_url("not a url", "k").unwrap_err();
        assert!(matches!(err, LiveError::RemoteOpen(_)));
    }

    #[tokio::test]
    async fn sender_reports_closed_task() {
        let (tx, rx) = mpsc::channel::<SendCmd>(1);
        let sender = LiveSender { tx };
        drop(rx);

        let envelope = WireEnvelope {
            payload: String::new(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        assert!(matches!(
            sender.try_send_media(envelope),
            Err(LiveError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn sender_drops_on_full_buffer() {
        let (tx, _rx) = mpsc::channel::<SendCmd>(1);
        let sender = LiveSender { tx };

        let envelope = WireEnvelope {
            payload: String::new(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        assert_eq!(sender.try_send_media(envelope.clone()).unwrap(), true);
        assert_eq!(sender.try_send_media(envelope).unwrap(), false);
    }
}
