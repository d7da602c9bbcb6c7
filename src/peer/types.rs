use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::track::track_remote::TrackRemote;

/// Тип session description (`{type, sdp}` в JSON браузера)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description, передаётся через сигналинг без интерпретации
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE кандидат в формате браузера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }
}

/// Конфигурация ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// Состояние ICE транспорта, как его сообщает платформа
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Статус для UI; производный от событий сервера и состояния транспорта
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Searching,
    Connecting,
    Connected,
    Interrupted,
    Failed,
    Disconnected,
}

impl TransportState {
    pub fn status(self) -> Status {
        match self {
            TransportState::Connected | TransportState::Completed => Status::Connected,
            TransportState::Disconnected => Status::Interrupted,
            TransportState::Failed => Status::Failed,
            TransportState::Closed => Status::Disconnected,
            TransportState::New | TransportState::Checking => Status::Connecting,
        }
    }

    /// Текст статуса для пользователя
    pub fn describe(self) -> &'static str {
        match self.status() {
            Status::Connected => "Connected",
            Status::Interrupted => "Connection interrupted - trying to reconnect...",
            Status::Failed => "Connection failed",
            Status::Disconnected => "Disconnected",
            _ => "Connecting...",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Удалённый трек; webrtc-хэндлы отсутствуют у тестовых соединений
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: MediaKind,
    pub track: Option<Arc<TrackRemote>>,
    pub receiver: Option<Arc<RTCRtpReceiver>>,
}

impl RemoteTrack {
    pub fn detached(id: impl Into<String>, stream_id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            track: None,
            receiver: None,
        }
    }

    /// Останавливает приём трека
    pub async fn stop(&self) {
        if let Some(receiver) = &self.receiver {
            if let Err(e) = receiver.stop().await {
                tracing::debug!(track = %self.id, "failed to stop remote receiver: {e}");
            }
        }
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .field("attached", &self.track.is_some())
            .finish()
    }
}

/// Удалённый медиапоток, отданный в UI
#[derive(Debug, Clone)]
pub struct RemoteStream {
    pub session: SessionId,
    pub stream_id: String,
    pub tracks: Vec<RemoteTrack>,
}

/// Чьё это соединение: session id и номер экземпляра внутри сессии
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTag {
    pub session: SessionId,
    pub instance: u64,
}

/// Колбэк соединения, помеченный тегом соединения, которое его породило
#[derive(Debug, Clone)]
pub struct PeerEvent {
    pub tag: PeerTag,
    pub kind: PeerEventKind,
}

#[derive(Debug, Clone)]
pub enum PeerEventKind {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    Transport(TransportState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_states_map_to_status() {
        assert_eq!(TransportState::Connected.status(), Status::Connected);
        assert_eq!(TransportState::Completed.status(), Status::Connected);
        assert_eq!(TransportState::Disconnected.status(), Status::Interrupted);
        assert_eq!(TransportState::Failed.status(), Status::Failed);
        assert_eq!(TransportState::Closed.status(), Status::Disconnected);
        assert_eq!(TransportState::Checking.status(), Status::Connecting);
    }

    #[test]
    fn candidate_uses_browser_field_names() {
        let json = serde_json::json!({
            "candidate": "candidate:1 1 udp 2130706431 10.0.0.2 5000 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        });
        let c: IceCandidate = serde_json::from_value(json).unwrap();
        assert_eq!(c.sdp_mid.as_deref(), Some("0"));
        assert_eq!(c.sdp_mline_index, Some(0));
        assert!(c.username_fragment.is_none());
    }

    #[test]
    fn description_serializes_type_field() {
        let v = serde_json::to_value(SessionDescription::answer("v=0")).unwrap();
        assert_eq!(v, serde_json::json!({"type": "answer", "sdp": "v=0"}));
    }
}
