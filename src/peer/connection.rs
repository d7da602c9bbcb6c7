use crate::error::{Error, Result};
use crate::logger::dump_selected_pair;
use crate::media::LocalMedia;
use crate::peer::types::{
    IceCandidate, MediaKind, PeerEvent, PeerEventKind, PeerTag, RemoteTrack, SdpKind,
    ServerConfig, SessionDescription, TransportState,
};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Низкоуровневое соединение, которым управляет PeerSession
#[async_trait]
pub trait RtcConnection: Send + Sync {
    /// Подключает треки общего захвата (не создавая новых)
    async fn attach_media(&self, media: &LocalMedia) -> Result<()>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    /// Снимает обработчики и закрывает соединение
    async fn close(&self) -> Result<()>;
}

/// Фабрика соединений; все события соединения помечаются `tag`
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        tag: &PeerTag,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn RtcConnection>>;
}

/// Соединения на webrtc-rs
pub struct WebRtcConnector {
    ice_servers: Vec<ServerConfig>,
}

impl WebRtcConnector {
    pub fn new(ice_servers: Vec<ServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl Connector for WebRtcConnector {
    async fn connect(
        &self,
        tag: &PeerTag,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn RtcConnection>> {
        let conn = new_peer(tag.clone(), rtc_config(&self.ice_servers), events).await?;
        Ok(Box::new(conn))
    }
}

pub struct WebRtcConnection {
    tag: PeerTag,
    pc: Arc<RTCPeerConnection>,
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

/// создаём Peer и вешаем обработчики кандидатов, треков и состояния ICE
pub async fn new_peer(
    tag: PeerTag,
    config: RTCConfiguration,
    events: mpsc::UnboundedSender<PeerEvent>,
) -> Result<WebRtcConnection> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(api.new_peer_connection(config).await?);
    info!(session = %tag.session, instance = tag.instance, "Creating new peer connection");

    // Локальные кандидаты уходят в координатор
    let tx = events.clone();
    let sid = tag.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => match c.to_json() {
                Ok(init) => {
                    let _ = tx.send(PeerEvent {
                        tag: sid.clone(),
                        kind: PeerEventKind::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }),
                    });
                }
                Err(e) => warn!("Failed to serialize local candidate: {e}"),
            },
            // cand == None означает конец сбора
            None => debug!(session = %sid.session, "ICE candidate gathering completed"),
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    let sid = tag.clone();
    let weak: Weak<RTCPeerConnection> = Arc::downgrade(&pc);
    pc.on_ice_connection_state_change(Box::new(move |st: RTCIceConnectionState| {
        debug!(session = %sid.session, "ICE connection state changed to: {:?}", st);
        let state = match st {
            RTCIceConnectionState::New => Some(TransportState::New),
            RTCIceConnectionState::Checking => Some(TransportState::Checking),
            RTCIceConnectionState::Connected => Some(TransportState::Connected),
            RTCIceConnectionState::Completed => Some(TransportState::Completed),
            RTCIceConnectionState::Disconnected => Some(TransportState::Disconnected),
            RTCIceConnectionState::Failed => Some(TransportState::Failed),
            RTCIceConnectionState::Closed => Some(TransportState::Closed),
            _ => None,
        };

        if let Some(state) = state {
            if state == TransportState::Failed {
                if let Some(pc) = weak.upgrade() {
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, "BEFORE-FAIL").await;
                    });
                }
            }

            let _ = tx.send(PeerEvent {
                tag: sid.clone(),
                kind: PeerEventKind::Transport(state),
            });
        }
        Box::pin(async {})
    }));

    let tx = events;
    let sid = tag.clone();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(MediaKind::Audio),
                RTPCodecType::Video => Some(MediaKind::Video),
                _ => None,
            };
            if let Some(kind) = kind {
                debug!(session = %sid.session, "Received remote {:?} track", kind);
                let _ = tx.send(PeerEvent {
                    tag: sid.clone(),
                    kind: PeerEventKind::RemoteTrack(RemoteTrack {
                        id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                        track: Some(track),
                        receiver: Some(receiver),
                    }),
                });
            }
            Box::pin(async {})
        },
    ));

    Ok(WebRtcConnection {
        tag,
        pc,
        senders: Mutex::new(Vec::new()),
    })
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(Error::WebRtc(format!("unexpected sdp type {other:?}"))),
    }
}

#[async_trait]
impl RtcConnection for WebRtcConnection {
    async fn attach_media(&self, media: &LocalMedia) -> Result<()> {
        let mut senders = self.senders.lock().await;
        for local in media.tracks() {
            let track: Arc<dyn TrackLocal + Send + Sync> = local.track.clone();
            senders.push(self.pc.add_track(track).await?);
        }
        debug!(session = %self.tag.session, tracks = senders.len(), "local tracks attached");
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        from_rtc(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        from_rtc(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceApplication(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        // старые обработчики больше не должны ничего присылать
        self.pc.on_ice_candidate(Box::new(|_| Box::pin(async {})));
        self.pc
            .on_ice_connection_state_change(Box::new(|_| Box::pin(async {})));
        self.pc.on_track(Box::new(|_, _, _| Box::pin(async {})));

        // треки захвата только отсоединяются, не останавливаются
        for sender in self.senders.lock().await.drain(..) {
            if let Err(e) = self.pc.remove_track(&sender).await {
                debug!(session = %self.tag.session, "remove_track failed: {e}");
            }
        }
        self.pc.close().await?;
        debug!(session = %self.tag.session, "peer connection closed");
        Ok(())
    }
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: get_user_ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Переводит конфигурацию серверов в формат webrtc-rs
pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}
