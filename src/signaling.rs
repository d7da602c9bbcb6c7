use crate::error::{Error, Result};
use crate::peer::types::{IceCandidate, SessionDescription};
use crate::session::SessionId;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ========== WIRE EVENTS ==========
// Кадр: {"event": <имя>, "data": <payload>}

/// События от сервера подбора (connect/disconnect порождает сам транспорт)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum Inbound {
    #[serde(rename = "connect")]
    Connect,
    #[serde(rename = "disconnect")]
    Disconnect,
    #[serde(rename = "waiting")]
    Waiting {
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "paired")]
    Paired {
        #[serde(default)]
        message: String,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "message")]
    Message {
        text: String,
        #[serde(default)]
        from: Option<String>,
    },
    #[serde(rename = "partner_left")]
    PartnerLeft {
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "offer")]
    Offer {
        offer: SessionDescription,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "answer")]
    Answer {
        answer: SessionDescription,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        candidate: IceCandidate,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
}

/// События клиента к серверу
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum Outbound {
    #[serde(rename = "next")]
    Next,
    #[serde(rename = "offer")]
    Offer {
        offer: SessionDescription,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "answer")]
    Answer {
        answer: SessionDescription,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        candidate: IceCandidate,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    #[serde(rename = "message")]
    Message { text: String },
}

pub fn encode(msg: &Outbound) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode(frame: &str) -> Result<Inbound> {
    Ok(serde_json::from_str(frame)?)
}

/// Исходящая сторона канала сигналинга
pub trait SignalingSink: Send + Sync {
    fn send(&self, msg: Outbound) -> Result<()>;
}

// ========== WEBSOCKET TRANSPORT ==========

/// Клиент WebSocket с ограниченным числом переподключений
pub struct SignalingClient {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SignalingSink for SignalingClient {
    fn send(&self, msg: Outbound) -> Result<()> {
        self.outbound
            .send(msg)
            .map_err(|_| Error::Signaling("signaling task stopped".into()))
    }
}

impl SignalingClient {
    /// Запускает транспорт; входящие события идут в возвращённый канал
    pub fn spawn(
        url: String,
        reconnect_attempts: u32,
        reconnect_delay: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Inbound>, JoinHandle<()>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_transport(
            url,
            reconnect_attempts,
            reconnect_delay,
            out_rx,
            in_tx,
        ));
        (Arc::new(Self { outbound: out_tx }), in_rx, handle)
    }
}

async fn run_transport(
    url: String,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    in_tx: mpsc::UnboundedSender<Inbound>,
) {
    let mut failures = 0u32;

    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                failures = 0;
                // всё, что накопилось без связи, относится к прошлым сессиям
                let mut dropped = 0;
                while out_rx.try_recv().is_ok() {
                    dropped += 1;
                }
                if dropped > 0 {
                    debug!(dropped, "discarded outbound events queued while offline");
                }

                info!(url = %url, "Socket connected");
                if in_tx.send(Inbound::Connect).is_err() {
                    return;
                }

                let (mut write, mut read) = ws.split();
                loop {
                    tokio::select! {
                        msg = out_rx.recv() => match msg {
                            Some(msg) => match encode(&msg) {
                                Ok(text) => {
                                    if let Err(e) = write.send(Message::Text(text)).await {
                                        warn!("failed to send signaling frame: {e}");
                                        break;
                                    }
                                }
                                Err(e) => warn!("failed to encode {:?}: {e}", msg),
                            },
                            None => {
                                let _ = write.close().await;
                                let _ = in_tx.send(Inbound::Disconnect);
                                return;
                            }
                        },
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => match decode(&text) {
                                Ok(event) => {
                                    if in_tx.send(event).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("malformed signaling frame: {e}"),
                            },
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("WebSocket error: {e}");
                                break;
                            }
                        },
                    }
                }

                info!("Socket disconnected");
                if in_tx.send(Inbound::Disconnect).is_err() {
                    return;
                }
            }
            Err(e) => {
                failures += 1;
                warn!(attempt = failures, "signaling connect failed: {e}");
                if failures > reconnect_attempts {
                    error!("giving up on signaling server after {} attempts", failures);
                    return;
                }
            }
        }

        if in_tx.is_closed() {
            return;
        }
        sleep(reconnect_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_paired_with_session_id() {
        let ev = decode(r#"{"event":"paired","data":{"message":"You are paired","sessionId":"s-1"}}"#)
            .unwrap();
        assert_eq!(
            ev,
            Inbound::Paired {
                message: "You are paired".into(),
                session_id: SessionId::from("s-1"),
            }
        );
    }

    #[test]
    fn decodes_candidate_in_browser_shape() {
        let frame = json!({
            "event": "ice-candidate",
            "data": {
                "candidate": {"candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host", "sdpMid": "0", "sdpMLineIndex": 0},
                "sessionId": "s-1"
            }
        });
        match decode(&frame.to_string()).unwrap() {
            Inbound::IceCandidate { candidate, session_id } => {
                assert_eq!(session_id.as_str(), "s-1");
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_partner_left_and_message() {
        assert!(matches!(
            decode(r#"{"event":"partner_left","data":{"message":"bye"}}"#).unwrap(),
            Inbound::PartnerLeft { .. }
        ));
        assert!(matches!(
            decode(r#"{"event":"message","data":{"text":"hi","from":"x"}}"#).unwrap(),
            Inbound::Message { .. }
        ));
    }

    #[test]
    fn negotiation_event_without_session_id_is_rejected() {
        assert!(decode(r#"{"event":"answer","data":{"answer":{"type":"answer","sdp":"v=0"}}}"#).is_err());
    }

    #[test]
    fn encodes_outbound_frames() {
        let next: serde_json::Value = serde_json::from_str(&encode(&Outbound::Next).unwrap()).unwrap();
        assert_eq!(next, json!({"event": "next"}));

        let offer = encode(&Outbound::Offer {
            offer: SessionDescription::offer("v=0"),
            session_id: SessionId::from("s-2"),
        })
        .unwrap();
        let offer: serde_json::Value = serde_json::from_str(&offer).unwrap();
        assert_eq!(
            offer,
            json!({"event": "offer", "data": {"offer": {"type": "offer", "sdp": "v=0"}, "sessionId": "s-2"}})
        );

        let msg: serde_json::Value =
            serde_json::from_str(&encode(&Outbound::Message { text: "hey".into() }).unwrap()).unwrap();
        assert_eq!(msg, json!({"event": "message", "data": {"text": "hey"}}));
    }

    #[tokio::test]
    async fn send_fails_after_transport_stops() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        drop(out_rx);
        let client = SignalingClient { outbound: out_tx };
        assert!(matches!(client.send(Outbound::Next), Err(Error::Signaling(_))));
    }
}
