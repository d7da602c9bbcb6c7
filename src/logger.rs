use crate::media::LocalMedia;
use crate::peer::types::{IceCandidate, RemoteStream, Status};
use crate::session::ChatMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use webrtc::peer_connection::RTCPeerConnection;

/// Устанавливает fmt-подписчик tracing; повторный вызов ничего не делает
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(crate::config::default_log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    debug!(
        "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index, cand.username_fragment
    );
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                info!(
                    "STATS {moment}: {}:{}  bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                );
            }
        }
    }
}

/// Событие для UI
#[derive(Debug, Clone)]
pub enum UiEvent {
    Status { status: Status, message: String },
    ChatAppended(ChatMessage),
    ChatCleared,
    /// `None` снимает удалённое видео с экрана
    RemoteStream(Option<RemoteStream>),
    LocalPreview(LocalMedia),
    Error(String),
}

/// Отправка событий в UI с логированием каждого
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    tx: Option<mpsc::UnboundedSender<UiEvent>>,
}

impl Emitter {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Emitter без получателя; события только логируются
    pub fn detached() -> Self {
        Self { tx: None }
    }

    fn emit(&self, evt: UiEvent) {
        match &self.tx {
            Some(tx) => {
                if tx.send(evt).is_err() {
                    debug!("UI receiver dropped, event discarded");
                }
            }
            None => debug!("No UI receiver, event not delivered: {:?}", evt),
        }
    }

    pub fn status(&self, status: Status, message: impl Into<String>) {
        let message = message.into();
        info!(?status, "status: {}", message);
        self.emit(UiEvent::Status { status, message });
    }

    pub fn chat(&self, msg: ChatMessage) {
        debug!(origin = ?msg.origin, "chat message appended");
        self.emit(UiEvent::ChatAppended(msg));
    }

    pub fn chat_cleared(&self) {
        debug!("chat cleared");
        self.emit(UiEvent::ChatCleared);
    }

    pub fn remote_stream(&self, stream: Option<RemoteStream>) {
        match &stream {
            Some(s) => info!(session = %s.session, stream = %s.stream_id, "remote stream attached"),
            None => debug!("remote stream detached"),
        }
        self.emit(UiEvent::RemoteStream(stream));
    }

    pub fn local_preview(&self, media: LocalMedia) {
        debug!(stream = %media.stream_id(), "local preview bound");
        self.emit(UiEvent::LocalPreview(media));
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("error surfaced to UI: {}", message);
        self.emit(UiEvent::Error(message));
    }
}
