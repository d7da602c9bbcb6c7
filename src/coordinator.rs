// Координатор сессий: единственный владелец текущего session id,
// PeerSession, очереди кандидатов и чата.
// Все входы (команды, сигналинг, колбэки соединения, таймеры) обрабатываются
// по одному в порядке поступления.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::logger::Emitter;
use crate::media::{LocalMedia, MediaSource};
use crate::peer::ice::analyze_candidates;
use crate::peer::{
    CandidateQueue, Connector, IceCandidate, PeerEvent, PeerEventKind, PeerSession, PeerTag,
    RemoteStream, RemoteTrack, SessionDescription, SignalingState, Status, TransportState,
};
use crate::session::{ChatLog, Origin, SessionId};
use crate::signaling::{Inbound, Outbound, SignalingSink};
use crate::utils::jittered;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const SEARCHING: &str = "Looking for a stranger...";
const CAMERA_FAILED: &str = "Camera access failed - please check permissions";

/// Фаза координатора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Waiting,
    Pairing,
    Negotiating,
    Active,
    Ending,
    Failed,
}

/// Команды пользователя
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Next,
    Stop,
    SendChat(String),
}

/// Срабатывания таймеров; каждое помечено сессией, для которой заведено
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    BeginNegotiation { session: SessionId },
    Watchdog { session: SessionId, generation: u64 },
}

#[derive(Debug)]
pub enum Input {
    Command(Command),
    Signal(Inbound),
    Peer(PeerEvent),
    Timer(Timer),
}

/// Каналы, в которые пишут колбэки соединений и таймеры координатора
pub struct Mailbox {
    pub peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    pub timer_rx: mpsc::UnboundedReceiver<Timer>,
}

pub struct SessionCoordinator {
    config: ClientConfig,
    media: MediaSource,
    connector: Arc<dyn Connector>,
    signaling: Arc<dyn SignalingSink>,
    ui: Emitter,

    phase: Phase,
    status: Status,
    started: bool,
    current: Option<SessionId>,
    peer: Option<PeerSession>,
    queue: CandidateQueue,
    chat: ChatLog,
    remote: Option<RemoteStream>,

    renegotiations: u32,
    watchdog_generation: u64,
    next_instance: u64,

    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    timer_tx: mpsc::UnboundedSender<Timer>,
}

impl SessionCoordinator {
    pub fn new(
        config: ClientConfig,
        media: MediaSource,
        connector: Arc<dyn Connector>,
        signaling: Arc<dyn SignalingSink>,
        ui: Emitter,
    ) -> (Self, Mailbox) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            config,
            media,
            connector,
            signaling,
            ui,
            phase: Phase::Idle,
            status: Status::Idle,
            started: false,
            current: None,
            peer: None,
            queue: CandidateQueue::default(),
            chat: ChatLog::default(),
            remote: None,
            renegotiations: 0,
            watchdog_generation: 0,
            next_instance: 0,
            peer_tx,
            timer_tx,
        };
        (coordinator, Mailbox { peer_rx, timer_rx })
    }

    // ========== ACCESSORS ==========

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote.as_ref()
    }

    pub fn peer_state(&self) -> Option<SignalingState> {
        self.peer.as_ref().map(PeerSession::state)
    }

    pub fn queued_candidates(&self) -> usize {
        self.queue.len()
    }

    pub fn renegotiations(&self) -> u32 {
        self.renegotiations
    }

    // ========== EVENT LOOP ==========

    /// Крутит координатор, пока жив канал команд
    pub async fn run(
        mut self,
        mut mailbox: Mailbox,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
    ) {
        let mut signaling_open = true;
        loop {
            let input = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => Input::Command(cmd),
                    None => break,
                },
                ev = inbound.recv(), if signaling_open => match ev {
                    Some(ev) => Input::Signal(ev),
                    None => {
                        warn!("signaling transport stopped");
                        signaling_open = false;
                        self.started = false;
                        Input::Signal(Inbound::Disconnect)
                    }
                },
                Some(ev) = mailbox.peer_rx.recv() => Input::Peer(ev),
                Some(timer) = mailbox.timer_rx.recv() => Input::Timer(timer),
            };
            self.handle(input).await;
        }

        info!("command channel closed, shutting down");
        self.shutdown().await;
    }

    pub async fn handle(&mut self, input: Input) {
        match input {
            Input::Command(Command::Start) | Input::Command(Command::Next) => {
                // ошибка уже показана пользователю через статус
                let _ = self.start().await;
            }
            Input::Command(Command::Stop) => self.stop().await,
            Input::Command(Command::SendChat(text)) => self.send_chat(text),
            Input::Signal(ev) => self.on_signal(ev).await,
            Input::Peer(ev) => self.on_peer_event(ev).await,
            Input::Timer(timer) => self.on_timer(timer).await,
        }
    }

    /// Начать поиск (или следующий собеседник).
    /// Без доступа к камере `next` не отправляется.
    pub async fn start(&mut self) -> Result<()> {
        info!("Requesting next chat");
        self.teardown().await;
        self.clear_session();
        self.set_status(Status::Connecting, "Starting camera...");

        if let Err(e) = self.ensure_media().await {
            error!("Failed to start: {e}");
            self.started = false;
            self.phase = Phase::Idle;
            self.set_status(Status::Failed, CAMERA_FAILED);
            self.ui.error(e.to_string());
            return Err(e);
        }

        self.started = true;
        self.request_next(SEARCHING);
        Ok(())
    }

    pub async fn stop(&mut self) {
        info!("Stopping chat");
        self.teardown().await;
        self.clear_session();
        self.media.release();
        self.started = false;
        self.phase = Phase::Idle;
        self.set_status(Status::Idle, "Click Start to begin");
    }

    pub fn send_chat(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.current.is_none() {
            debug!("no partner, chat message not sent");
            return;
        }
        if let Err(e) = self.signaling.send(Outbound::Message { text: text.clone() }) {
            warn!("failed to send chat message: {e}");
            return;
        }
        let msg = self.chat.push(Origin::Me, text);
        self.ui.chat(msg);
    }

    async fn shutdown(&mut self) {
        self.teardown().await;
        self.clear_session();
        self.media.release();
        self.phase = Phase::Idle;
    }

    // ========== SIGNALING ==========

    async fn on_signal(&mut self, event: Inbound) {
        match event {
            Inbound::Connect => {
                info!("Socket connected");
                if self.started {
                    self.teardown().await;
                    self.clear_session();
                    self.request_next(SEARCHING);
                } else {
                    self.set_status(Status::Idle, "Click Start to begin");
                }
            }
            Inbound::Disconnect => {
                info!("Socket disconnected");
                self.teardown().await;
                self.clear_session();
                if self.started && self.config.reconnect_attempts > 0 {
                    self.phase = Phase::Waiting;
                    self.set_status(Status::Disconnected, "Disconnected - reconnecting...");
                } else {
                    self.phase = Phase::Idle;
                    self.set_status(Status::Disconnected, "Disconnected from server");
                }
            }
            Inbound::Waiting { message } => {
                self.teardown().await;
                self.clear_session();
                self.phase = Phase::Waiting;
                let message = if message.is_empty() { SEARCHING.to_string() } else { message };
                self.set_status(Status::Searching, message);
            }
            Inbound::Paired { session_id, .. } => self.on_paired(session_id).await,
            Inbound::Message { text, .. } => {
                if self.current.is_none() {
                    debug!("chat message without a session, dropped");
                    return;
                }
                let msg = self.chat.push(Origin::Peer, text);
                self.ui.chat(msg);
            }
            Inbound::PartnerLeft { .. } => {
                info!("Partner left");
                self.teardown().await;
                self.clear_session();
                self.request_next("Partner disconnected - finding new match...");
            }
            Inbound::Offer { offer, session_id } => self.on_offer(offer, session_id).await,
            Inbound::Answer { answer, session_id } => self.on_answer(answer, session_id).await,
            Inbound::IceCandidate {
                candidate,
                session_id,
            } => self.on_remote_candidate(candidate, session_id).await,
            Inbound::Error { message } => {
                error!("Socket error: {message}");
                let status = self.status;
                self.set_status(status, format!("Error: {message}"));
                self.ui.error(message);
            }
        }
    }

    async fn on_paired(&mut self, session: SessionId) {
        info!(session = %session, "Paired with partner");
        self.teardown().await;
        self.clear_session();
        self.adopt_session(session.clone());
        self.phase = Phase::Pairing;
        self.set_status(Status::Connecting, "Connecting video...");

        if let Err(e) = self.ensure_media().await {
            self.media_failed(e);
            return;
        }

        let delay = jittered(self.config.offer_delay(), self.config.offer_jitter());
        debug!(session = %session, ?delay, "negotiation start scheduled");
        self.schedule(delay, Timer::BeginNegotiation { session });
    }

    async fn on_offer(&mut self, offer: SessionDescription, session: SessionId) {
        if let Err(e) = self.ensure_current(&session) {
            warn!("Ignoring offer: {e}");
            return;
        }
        if self.peer.as_ref().is_some_and(|p| p.keeps_local_offer(&offer)) {
            info!(session = %session, "Offer collision: keeping own offer, remote side answers");
            return;
        }
        if let Some(state) = self.peer.as_ref().map(PeerSession::state) {
            warn!(
                session = %session,
                "Resetting connection due to offer in state {:?}",
                state
            );
            self.close_peer().await;
        }

        let media = match self.ensure_media().await {
            Ok(media) => media,
            Err(e) => {
                self.media_failed(e);
                return;
            }
        };

        info!(session = %session, "Received offer");
        let tag = self.next_tag(session.clone());
        let mut peer =
            match PeerSession::create(tag, &media, self.connector.as_ref(), self.peer_tx.clone())
                .await
            {
                Ok(peer) => peer,
                Err(e) => {
                    self.recover(e).await;
                    return;
                }
            };

        let answer = match peer.accept_offer(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                peer.close().await;
                self.recover(e).await;
                return;
            }
        };

        let applied = self.queue.drain_into(&peer).await;
        debug!(session = %session, applied, "pending candidates applied after offer");
        self.peer = Some(peer);
        self.phase = Phase::Negotiating;

        self.transmit(Outbound::Answer {
            answer,
            session_id: session.clone(),
        });
        self.arm_watchdog(session);
    }

    async fn on_answer(&mut self, answer: SessionDescription, session: SessionId) {
        if let Err(e) = self.ensure_current(&session) {
            warn!("Ignoring answer: {e}");
            return;
        }
        let Some(peer) = self.peer.as_mut() else {
            warn!(session = %session, "Ignoring answer - no connection");
            return;
        };

        info!(session = %session, "Received answer");
        let outcome = match peer.accept_answer(answer).await {
            Ok(true) => {
                let applied = self.queue.drain_into(peer).await;
                debug!(session = %session, applied, "pending candidates applied after answer");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            self.recover(e).await;
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate, session: SessionId) {
        if let Err(e) = self.ensure_current(&session) {
            debug!("Ignoring candidate: {e}");
            return;
        }
        match self.peer.as_ref() {
            Some(peer) => {
                if let Err(e) = peer.add_remote_candidate(candidate, &mut self.queue).await {
                    warn!(session = %session, "Error adding ICE candidate: {e}");
                }
            }
            // offer ещё не пришёл: ждём remote description
            None => self.queue.enqueue(candidate),
        }
    }

    // ========== PEER CALLBACKS ==========

    async fn on_peer_event(&mut self, event: PeerEvent) {
        let owned = self.peer.as_ref().is_some_and(|p| p.owns(&event.tag));
        if !owned {
            match self.ensure_current(&event.tag.session) {
                Err(e) => debug!("Ignoring peer event: {e}"),
                Ok(()) => debug!(
                    session = %event.tag.session,
                    instance = event.tag.instance,
                    "Ignoring event of a closed connection"
                ),
            }
            if let PeerEventKind::RemoteTrack(track) = event.kind {
                track.stop().await;
            }
            return;
        }

        match event.kind {
            PeerEventKind::LocalCandidate(candidate) => {
                let fresh = self
                    .peer
                    .as_mut()
                    .is_some_and(|p| p.record_local_candidate(&candidate));
                if fresh {
                    self.transmit(Outbound::IceCandidate {
                        candidate,
                        session_id: event.tag.session,
                    });
                }
            }
            PeerEventKind::RemoteTrack(track) => self.attach_remote(track),
            PeerEventKind::Transport(state) => self.on_transport(state).await,
        }
    }

    fn attach_remote(&mut self, track: RemoteTrack) {
        let Some(peer) = self.peer.as_mut() else {
            return;
        };
        peer.own_remote_track(track.clone());
        let session = peer.session_id().clone();

        match self.remote.as_mut() {
            None => {
                info!(session = %session, stream = %track.stream_id, "Received remote stream");
                self.remote = Some(RemoteStream {
                    session,
                    stream_id: track.stream_id.clone(),
                    tracks: vec![track],
                });
            }
            Some(stream) if stream.stream_id == track.stream_id => {
                stream.tracks.push(track);
            }
            Some(stream) => {
                debug!(
                    kept = %stream.stream_id,
                    ignored = %track.stream_id,
                    "remote stream already attached"
                );
                return;
            }
        }
        self.ui.remote_stream(self.remote.clone());
    }

    async fn on_transport(&mut self, state: TransportState) {
        let Some(peer) = self.peer.as_mut() else {
            return;
        };
        peer.set_transport(state);
        info!(session = %peer.session_id(), "ICE connection state: {:?}", state);

        match state.status() {
            Status::Connected => {
                analyze_candidates(peer.sent_candidates());
                // watchdog этой попытки больше не нужен
                self.watchdog_generation += 1;
                self.phase = Phase::Active;
                self.set_status(Status::Connected, state.describe());
            }
            Status::Failed => {
                analyze_candidates(peer.sent_candidates());
                self.recover(Error::ConnectionFailed("ICE connection failed".into()))
                    .await;
            }
            status => self.set_status(status, state.describe()),
        }
    }

    // ========== TIMERS ==========

    async fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::BeginNegotiation { session } => {
                if !self.is_current(&session) {
                    debug!(session = %session, "negotiation timer of stale session");
                    return;
                }
                if self.peer.is_some() {
                    debug!(session = %session, "offer already received, not initiating");
                    return;
                }
                if let Err(e) = self.begin_offer(session).await {
                    if e.is_blocking() {
                        self.media_failed(e);
                    } else {
                        self.recover(e).await;
                    }
                }
            }
            Timer::Watchdog {
                session,
                generation,
            } => {
                if !self.is_current(&session) || generation != self.watchdog_generation {
                    return;
                }
                if self.peer.as_ref().is_some_and(PeerSession::is_connected) {
                    return;
                }
                warn!(session = %session, "connection not established in time");
                let reason = format!("no connection after {:?}", self.config.watchdog());
                self.recover(Error::ConnectionFailed(reason)).await;
            }
        }
    }

    // ========== NEGOTIATION ==========

    /// Создаёт PeerSession и отправляет собственный offer
    async fn begin_offer(&mut self, session: SessionId) -> Result<()> {
        let media = self.ensure_media().await?;
        let tag = self.next_tag(session.clone());
        let mut peer =
            PeerSession::create(tag, &media, self.connector.as_ref(), self.peer_tx.clone())
                .await?;

        let offer = match peer.make_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                peer.close().await;
                return Err(e);
            }
        };

        info!(session = %session, "Sending offer");
        self.peer = Some(peer);
        self.phase = Phase::Negotiating;
        self.transmit(Outbound::Offer {
            offer,
            session_id: session.clone(),
        });
        self.arm_watchdog(session);
        Ok(())
    }

    /// Ограниченное число пересогласований на сессию, дальше Failed.
    /// Новый offer уходит через таймер с разбросом, как и первый.
    async fn recover(&mut self, reason: Error) {
        let Some(session) = self.current.clone() else {
            return;
        };

        if reason.is_retryable() && self.renegotiations < self.config.max_renegotiations {
            self.renegotiations += 1;
            warn!(
                session = %session,
                attempt = self.renegotiations,
                "renegotiating: {reason}"
            );
            self.close_peer().await;
            // кандидаты относились к прошлой попытке
            self.queue.clear();
            self.phase = Phase::Pairing;
            self.set_status(Status::Connecting, "Connection lost - renegotiating...");

            let delay = jittered(self.config.offer_delay(), self.config.offer_jitter());
            self.schedule(delay, Timer::BeginNegotiation { session });
            return;
        }

        error!(session = %session, "giving up on connection: {reason}");

        self.close_peer().await;
        self.phase = Phase::Failed;
        self.set_status(Status::Failed, "Connection failed - click Next to try again");

        if self.config.auto_advance_on_failure && self.started {
            info!("auto-advancing to the next partner");
            self.teardown().await;
            self.clear_session();
            self.request_next(SEARCHING);
        }
    }

    fn media_failed(&mut self, e: Error) {
        error!("Media access failed: {e}");
        self.phase = Phase::Failed;
        self.set_status(Status::Failed, CAMERA_FAILED);
        self.ui.error(e.to_string());
    }

    // ========== HELPERS ==========

    fn is_current(&self, session: &SessionId) -> bool {
        self.current.as_ref() == Some(session)
    }

    fn ensure_current(&self, session: &SessionId) -> Result<()> {
        if self.is_current(session) {
            return Ok(());
        }
        let current = self.current.as_ref().map_or("none", SessionId::as_str);
        Err(Error::StaleSession(format!("{session} (current: {current})")))
    }

    fn next_tag(&mut self, session: SessionId) -> PeerTag {
        self.next_instance += 1;
        PeerTag {
            session,
            instance: self.next_instance,
        }
    }

    async fn ensure_media(&mut self) -> Result<LocalMedia> {
        let fresh = self.media.current().is_none();
        let media = self.media.acquire().await?;
        if fresh {
            self.ui.local_preview(media.clone());
        }
        Ok(media)
    }

    fn adopt_session(&mut self, session: SessionId) {
        self.queue = CandidateQueue::for_session(session.clone());
        self.current = Some(session);
        self.renegotiations = 0;
    }

    fn clear_session(&mut self) {
        self.current = None;
        self.queue = CandidateQueue::default();
        self.renegotiations = 0;
        if self.chat.clear() {
            self.ui.chat_cleared();
        }
    }

    /// Закрывает текущее соединение и снимает удалённое видео.
    /// Session id и очередь остаются.
    async fn close_peer(&mut self) {
        // взведённый watchdog относится к закрываемому соединению
        self.watchdog_generation += 1;
        if let Some(mut peer) = self.peer.take() {
            peer.close().await;
        }
        if self.remote.take().is_some() {
            self.ui.remote_stream(None);
        }
    }

    async fn teardown(&mut self) {
        let prev = self.phase;
        self.phase = Phase::Ending;
        self.close_peer().await;
        self.queue.clear();
        self.phase = prev;
    }

    fn request_next(&mut self, message: &str) {
        self.transmit(Outbound::Next);
        self.phase = Phase::Waiting;
        self.set_status(Status::Searching, message);
    }

    fn transmit(&self, msg: Outbound) {
        if let Err(e) = self.signaling.send(msg) {
            warn!("failed to send signaling event: {e}");
        }
    }

    fn set_status(&mut self, status: Status, message: impl Into<String>) {
        self.status = status;
        self.ui.status(status, message);
    }

    fn arm_watchdog(&mut self, session: SessionId) {
        self.watchdog_generation += 1;
        let generation = self.watchdog_generation;
        self.schedule(
            self.config.watchdog(),
            Timer::Watchdog {
                session,
                generation,
            },
        );
    }

    fn schedule(&self, delay: Duration, timer: Timer) {
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(timer);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SampleCapture;
    use crate::peer::RtcConnection;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct NullConn;

    #[async_trait]
    impl RtcConnection for NullConn {
        async fn attach_media(&self, _media: &LocalMedia) -> Result<()> {
            Ok(())
        }
        async fn create_offer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription::offer("o"))
        }
        async fn create_answer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription::answer("a"))
        }
        async fn set_local_description(&self, _desc: SessionDescription) -> Result<()> {
            Ok(())
        }
        async fn set_remote_description(&self, _desc: SessionDescription) -> Result<()> {
            Ok(())
        }
        async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NullConnector;

    #[async_trait]
    impl Connector for NullConnector {
        async fn connect(
            &self,
            _tag: &PeerTag,
            _events: mpsc::UnboundedSender<PeerEvent>,
        ) -> Result<Box<dyn RtcConnection>> {
            Ok(Box::new(NullConn))
        }
    }

    #[derive(Default)]
    struct Sent(Mutex<Vec<Outbound>>);

    impl SignalingSink for Sent {
        fn send(&self, msg: Outbound) -> Result<()> {
            self.0.lock().unwrap().push(msg);
            Ok(())
        }
    }

    fn coordinator() -> (SessionCoordinator, Mailbox, Arc<Sent>) {
        let sent = Arc::new(Sent::default());
        let config = ClientConfig {
            offer_delay_ms: 0,
            offer_jitter_ms: 0,
            ..Default::default()
        };
        let (c, mailbox) = SessionCoordinator::new(
            config,
            MediaSource::new(Arc::new(SampleCapture)),
            Arc::new(NullConnector),
            sent.clone(),
            Emitter::detached(),
        );
        (c, mailbox, sent)
    }

    #[tokio::test]
    async fn start_sends_next_and_waits() {
        let (mut c, _mailbox, sent) = coordinator();
        c.start().await.unwrap();
        assert_eq!(c.phase(), Phase::Waiting);
        assert_eq!(c.status(), Status::Searching);
        assert_eq!(*sent.0.lock().unwrap(), vec![Outbound::Next]);
    }

    #[tokio::test]
    async fn chat_requires_a_session() {
        let (mut c, _mailbox, sent) = coordinator();
        c.send_chat("hello".into());
        assert!(sent.0.lock().unwrap().is_empty());

        c.handle(Input::Signal(Inbound::Paired {
            message: String::new(),
            session_id: SessionId::from("A"),
        }))
        .await;
        c.send_chat("  hello ".into());
        c.send_chat("   ".into());
        assert_eq!(c.chat().messages().len(), 1);
        assert_eq!(c.chat().messages()[0].text, "hello");
    }

    #[tokio::test]
    async fn error_event_keeps_status_kind() {
        let (mut c, _mailbox, _) = coordinator();
        c.start().await.unwrap();
        c.handle(Input::Signal(Inbound::Error {
            message: "queue full".into(),
        }))
        .await;
        assert_eq!(c.status(), Status::Searching);
        assert_eq!(c.phase(), Phase::Waiting);
    }

    #[tokio::test]
    async fn connect_while_stopped_does_not_search() {
        let (mut c, _mailbox, sent) = coordinator();
        c.handle(Input::Signal(Inbound::Connect)).await;
        assert_eq!(c.phase(), Phase::Idle);
        assert!(sent.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_session_is_reported_stale() {
        let (mut c, _mailbox, _) = coordinator();
        assert!(matches!(
            c.ensure_current(&SessionId::from("A")),
            Err(Error::StaleSession(_))
        ));

        c.handle(Input::Signal(Inbound::Paired {
            message: String::new(),
            session_id: SessionId::from("B"),
        }))
        .await;
        assert!(c.ensure_current(&SessionId::from("B")).is_ok());
        match c.ensure_current(&SessionId::from("A")) {
            Err(Error::StaleSession(msg)) => assert_eq!(msg, "A (current: B)"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_after_start_waits_for_reconnect() {
        let (mut c, _mailbox, _) = coordinator();
        c.start().await.unwrap();
        c.handle(Input::Signal(Inbound::Disconnect)).await;
        assert_eq!(c.phase(), Phase::Waiting);
        assert_eq!(c.status(), Status::Disconnected);
        assert!(c.session_id().is_none());
    }
}
