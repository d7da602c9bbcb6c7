// Локальный захват камеры/микрофона, общий для всех PeerSession.
// Создаёт и останавливает захват только MediaSource, соединения лишь
// подключают его треки и отключают их при закрытии.

use crate::error::{Error, Result};
use crate::peer::types::MediaKind;
use crate::utils::random_id;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Один захваченный трек
#[derive(Clone)]
pub struct LocalTrack {
    pub kind: MediaKind,
    pub track: Arc<TrackLocalStaticSample>,
}

/// Источник захвата платформы
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Открывает захват аудио+видео. Проблемы с правами или устройством
    /// возвращаются как [`Error::MediaAccess`].
    async fn open(&self, stream_id: &str) -> Result<Vec<LocalTrack>>;
}

/// Захват, в треки которого хост сам пишет закодированные сэмплы
/// (Opus и VP8)
#[derive(Debug, Default)]
pub struct SampleCapture;

#[async_trait]
impl CaptureDevice for SampleCapture {
    async fn open(&self, stream_id: &str) -> Result<Vec<LocalTrack>> {
        let audio = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            stream_id.to_owned(),
        );
        let video = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            "video".to_owned(),
            stream_id.to_owned(),
        );
        Ok(vec![
            LocalTrack {
                kind: MediaKind::Audio,
                track: Arc::new(audio),
            },
            LocalTrack {
                kind: MediaKind::Video,
                track: Arc::new(video),
            },
        ])
    }
}

struct Capture {
    stream_id: String,
    tracks: Vec<LocalTrack>,
    stopped: AtomicBool,
}

/// Ссылка на общий захват аудио+видео
#[derive(Clone)]
pub struct LocalMedia {
    inner: Arc<Capture>,
}

impl LocalMedia {
    fn new(stream_id: String, tracks: Vec<LocalTrack>) -> Self {
        Self {
            inner: Arc::new(Capture {
                stream_id,
                tracks,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.inner.tracks
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn same_capture(&self, other: &LocalMedia) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Пишет один закодированный кадр в трек нужного типа
    pub async fn write_sample(&self, kind: MediaKind, data: Bytes, duration: Duration) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::MediaAccess("capture already stopped".into()));
        }
        let track = self
            .inner
            .tracks
            .iter()
            .find(|t| t.kind == kind)
            .ok_or_else(|| Error::MediaAccess(format!("no {kind:?} track in capture")))?;
        track
            .track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("stream_id", &self.inner.stream_id)
            .field("tracks", &self.inner.tracks.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Владелец локального захвата
pub struct MediaSource {
    device: Arc<dyn CaptureDevice>,
    current: Option<LocalMedia>,
}

impl MediaSource {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            current: None,
        }
    }

    /// Текущий захват или новый, если его нет
    pub async fn acquire(&mut self) -> Result<LocalMedia> {
        if let Some(media) = &self.current {
            return Ok(media.clone());
        }

        let stream_id = format!("local-{}", random_id());
        let tracks = self.device.open(&stream_id).await.map_err(|e| match e {
            Error::MediaAccess(_) => e,
            other => Error::MediaAccess(other.to_string()),
        })?;
        if tracks.is_empty() {
            warn!("capture device returned no tracks");
            return Err(Error::MediaAccess("no capture device available".into()));
        }

        info!(stream = %stream_id, tracks = tracks.len(), "local capture acquired");
        let media = LocalMedia::new(stream_id, tracks);
        self.current = Some(media.clone());
        Ok(media)
    }

    /// Останавливает все треки и забывает захват
    pub fn release(&mut self) {
        if let Some(media) = self.current.take() {
            debug!(stream = %media.stream_id(), "releasing local capture");
            media.stop();
        }
    }

    pub fn current(&self) -> Option<&LocalMedia> {
        self.current.as_ref()
    }
}
