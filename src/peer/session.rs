use crate::error::{Error, Result};
use crate::logger::dump_candidate;
use crate::media::LocalMedia;
use crate::peer::connection::{Connector, RtcConnection};
use crate::peer::ice::CandidateQueue;
use crate::peer::state::SignalingState;
use crate::peer::types::{
    IceCandidate, PeerEvent, PeerTag, RemoteTrack, SdpKind, SessionDescription, TransportState,
};
use crate::session::SessionId;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Одно соединение для одного session id
pub struct PeerSession {
    tag: PeerTag,
    state: SignalingState,
    conn: Box<dyn RtcConnection>,
    local_offer: Option<SessionDescription>,
    sent: HashSet<IceCandidate>,
    sent_order: Vec<IceCandidate>,
    remote_tracks: Vec<RemoteTrack>,
    transport: Option<TransportState>,
}

impl PeerSession {
    /// Создаёт соединение и подключает к нему треки общего захвата
    pub async fn create(
        tag: PeerTag,
        media: &LocalMedia,
        connector: &dyn Connector,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Self> {
        let conn = connector.connect(&tag, events).await?;
        if let Err(e) = conn.attach_media(media).await {
            let _ = conn.close().await;
            return Err(e);
        }
        info!(session = %tag.session, instance = tag.instance, "peer session created");
        Ok(Self {
            tag,
            state: SignalingState::New,
            conn,
            local_offer: None,
            sent: HashSet::new(),
            sent_order: Vec::new(),
            remote_tracks: Vec::new(),
            transport: None,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.tag.session
    }

    /// Событие пришло именно от этого соединения
    pub fn owns(&self, tag: &PeerTag) -> bool {
        self.tag == *tag
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    pub fn has_remote_description(&self) -> bool {
        self.state.has_remote_description()
    }

    pub fn transport(&self) -> Option<TransportState> {
        self.transport
    }

    pub fn set_transport(&mut self, state: TransportState) {
        self.transport = Some(state);
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.transport,
            Some(TransportState::Connected | TransportState::Completed)
        )
    }

    /// Создаёт и устанавливает локальный offer
    pub async fn make_offer(&mut self) -> Result<SessionDescription> {
        self.state.expect_new("make_offer")?;
        debug!(session = %self.tag.session, "Creating offer...");
        let offer = self.conn.create_offer().await?;
        self.conn.set_local_description(offer.clone()).await?;
        self.state = SignalingState::HaveLocalOffer;
        self.local_offer = Some(offer.clone());
        Ok(offer)
    }

    /// Встречные offer: true, если свой offer остаётся в силе, а чужой
    /// надо проигнорировать. Вне `HaveLocalOffer` всегда false.
    pub fn keeps_local_offer(&self, remote: &SessionDescription) -> bool {
        match (&self.local_offer, self.state) {
            (Some(local), SignalingState::HaveLocalOffer) => {
                local_offer_wins(&local.sdp, &remote.sdp)
            }
            _ => false,
        }
    }

    /// Принимает удалённый offer и возвращает готовый answer
    pub async fn accept_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription> {
        self.state.expect_new("accept_offer")?;
        if offer.kind != SdpKind::Offer {
            return Err(Error::InvalidSignalingState(format!(
                "accept_offer got {:?} description",
                offer.kind
            )));
        }

        debug!(session = %self.tag.session, "Setting remote description (offer)...");
        self.conn.set_remote_description(offer).await?;
        self.state = SignalingState::HaveRemoteOffer;

        debug!(session = %self.tag.session, "Creating answer...");
        let answer = self.conn.create_answer().await?;
        self.conn.set_local_description(answer.clone()).await?;
        self.state = SignalingState::Stable;
        Ok(answer)
    }

    /// Применяет answer только после собственного offer.
    /// `Ok(false)` означает, что answer проигнорирован.
    pub async fn accept_answer(&mut self, answer: SessionDescription) -> Result<bool> {
        if !self.state.accepts_answer() {
            warn!(
                session = %self.tag.session,
                "Cannot handle answer, state is: {:?}", self.state
            );
            return Ok(false);
        }

        debug!(session = %self.tag.session, "Setting remote description (answer)...");
        self.conn.set_remote_description(answer).await?;
        self.state = SignalingState::Stable;
        Ok(true)
    }

    /// Сразу применяет кандидат или откладывает его до remote description
    pub async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
        queue: &mut CandidateQueue,
    ) -> Result<()> {
        if self.has_remote_description() {
            self.apply_candidate(candidate).await
        } else {
            queue.enqueue(candidate);
            Ok(())
        }
    }

    pub async fn apply_candidate(&self, candidate: IceCandidate) -> Result<()> {
        dump_candidate("REMOTE", &candidate);
        self.conn.add_ice_candidate(candidate).await
    }

    /// true, если кандидат ещё не отправлялся
    pub fn record_local_candidate(&mut self, candidate: &IceCandidate) -> bool {
        if !self.sent.insert(candidate.clone()) {
            return false;
        }
        dump_candidate("LOCAL", candidate);
        self.sent_order.push(candidate.clone());
        true
    }

    pub fn sent_candidates(&self) -> &[IceCandidate] {
        &self.sent_order
    }

    /// Запоминает удалённый трек, чтобы остановить его при закрытии
    pub fn own_remote_track(&mut self, track: RemoteTrack) {
        self.remote_tracks.push(track);
    }

    pub fn is_closed(&self) -> bool {
        self.state == SignalingState::Closed
    }

    /// Снимает обработчики, останавливает удалённые треки, закрывает соединение.
    /// Локальный захват не трогает.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = SignalingState::Closed;

        for track in self.remote_tracks.drain(..) {
            track.stop().await;
        }
        if let Err(e) = self.conn.close().await {
            warn!(session = %self.tag.session, "error while closing peer connection: {e}");
        }
        info!(session = %self.tag.session, "peer session closed");
    }
}

/// session id из строки `o=` (RFC 4566: `o=<user> <sess-id> <sess-version> ...`)
fn origin_session_id(sdp: &str) -> Option<u64> {
    sdp.lines()
        .find_map(|line| line.strip_prefix("o="))
        .and_then(|origin| origin.split_whitespace().nth(1))
        .and_then(|id| id.parse().ok())
}

/// Побеждает offer с большим session id; обе стороны приходят к одному
/// и тому же решению. При равенстве свой offer уступает.
pub(crate) fn local_offer_wins(local_sdp: &str, remote_sdp: &str) -> bool {
    match (origin_session_id(local_sdp), origin_session_id(remote_sdp)) {
        (Some(local), Some(remote)) => local > remote,
        _ => local_sdp > remote_sdp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaSource, SampleCapture};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl Calls {
        fn push(&self, s: impl Into<String>) {
            self.0.lock().unwrap().push(s.into());
        }
        fn all(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FakeConn {
        calls: Arc<Calls>,
        reject: Option<String>,
    }

    #[async_trait]
    impl RtcConnection for FakeConn {
        async fn attach_media(&self, _media: &LocalMedia) -> Result<()> {
            self.calls.push("attach");
            Ok(())
        }
        async fn create_offer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription::offer("local-offer"))
        }
        async fn create_answer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription::answer("local-answer"))
        }
        async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
            self.calls.push(format!("local:{}", desc.sdp));
            Ok(())
        }
        async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
            self.calls.push(format!("remote:{}", desc.sdp));
            Ok(())
        }
        async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
            if self.reject.as_deref() == Some(candidate.candidate.as_str()) {
                return Err(Error::IceApplication("bad candidate".into()));
            }
            self.calls.push(format!("ice:{}", candidate.candidate));
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            self.calls.push("close");
            Ok(())
        }
    }

    struct FakeConnector {
        calls: Arc<Calls>,
        reject: Option<String>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            _tag: &PeerTag,
            _events: mpsc::UnboundedSender<PeerEvent>,
        ) -> Result<Box<dyn RtcConnection>> {
            Ok(Box::new(FakeConn {
                calls: self.calls.clone(),
                reject: self.reject.clone(),
            }))
        }
    }

    async fn session(reject: Option<&str>) -> (PeerSession, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let connector = FakeConnector {
            calls: calls.clone(),
            reject: reject.map(str::to_owned),
        };
        let media = MediaSource::new(Arc::new(SampleCapture)).acquire().await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let tag = PeerTag {
            session: SessionId::from("A"),
            instance: 1,
        };
        let peer = PeerSession::create(tag, &media, &connector, tx)
            .await
            .unwrap();
        (peer, calls)
    }

    #[tokio::test]
    async fn offer_then_answer_reaches_stable() {
        let (mut peer, calls) = session(None).await;
        let offer = peer.make_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert_eq!(peer.state(), SignalingState::HaveLocalOffer);

        assert!(peer.accept_answer(SessionDescription::answer("remote-answer")).await.unwrap());
        assert_eq!(peer.state(), SignalingState::Stable);
        assert_eq!(
            calls.all(),
            ["attach", "local:local-offer", "remote:remote-answer"]
        );
    }

    #[tokio::test]
    async fn make_offer_twice_is_invalid_state() {
        let (mut peer, _) = session(None).await;
        peer.make_offer().await.unwrap();
        let err = peer.make_offer().await.unwrap_err();
        assert!(matches!(err, Error::InvalidSignalingState(_)));
    }

    #[tokio::test]
    async fn answer_without_local_offer_is_ignored() {
        let (mut peer, calls) = session(None).await;
        assert!(!peer.accept_answer(SessionDescription::answer("x")).await.unwrap());
        assert_eq!(peer.state(), SignalingState::New);

        peer.accept_offer(SessionDescription::offer("remote-offer")).await.unwrap();
        assert!(!peer.accept_answer(SessionDescription::answer("y")).await.unwrap());
        assert_eq!(peer.state(), SignalingState::Stable);
        assert!(!calls.all().iter().any(|c| c == "remote:x" || c == "remote:y"));
    }

    #[tokio::test]
    async fn accept_offer_produces_answer() {
        let (mut peer, calls) = session(None).await;
        let answer = peer.accept_offer(SessionDescription::offer("remote-offer")).await.unwrap();
        assert_eq!(answer, SessionDescription::answer("local-answer"));
        assert_eq!(peer.state(), SignalingState::Stable);
        assert_eq!(
            calls.all(),
            ["attach", "remote:remote-offer", "local:local-answer"]
        );
    }

    #[tokio::test]
    async fn candidates_queue_until_remote_description_then_drain_in_order() {
        let (mut peer, calls) = session(Some("bad")).await;
        let mut queue = CandidateQueue::for_session(SessionId::from("A"));

        for c in ["c1", "bad", "c2"] {
            peer.add_remote_candidate(IceCandidate::new(c), &mut queue)
                .await
                .unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert!(!calls.all().iter().any(|c| c.starts_with("ice:")));

        peer.accept_offer(SessionDescription::offer("o")).await.unwrap();
        assert_eq!(queue.drain_into(&peer).await, 2);
        assert!(queue.is_empty());

        peer.add_remote_candidate(IceCandidate::new("c3"), &mut queue)
            .await
            .unwrap();
        let ice: Vec<_> = calls
            .all()
            .into_iter()
            .filter(|c| c.starts_with("ice:"))
            .collect();
        assert_eq!(ice, ["ice:c1", "ice:c2", "ice:c3"]);
        assert_eq!(peer.state(), SignalingState::Stable);
    }

    #[tokio::test]
    async fn queue_for_other_session_is_not_drained() {
        let (mut peer, calls) = session(None).await;
        let mut queue = CandidateQueue::for_session(SessionId::from("B"));
        queue.enqueue(IceCandidate::new("c1"));
        peer.accept_offer(SessionDescription::offer("o")).await.unwrap();

        assert_eq!(queue.drain_into(&peer).await, 0);
        assert_eq!(queue.len(), 1);
        assert!(!calls.all().iter().any(|c| c.starts_with("ice:")));
    }

    #[tokio::test]
    async fn local_candidates_are_sent_once() {
        let (mut peer, _) = session(None).await;
        let c = IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 5000 typ host");
        assert!(peer.record_local_candidate(&c));
        assert!(!peer.record_local_candidate(&c));
        assert_eq!(peer.sent_candidates().len(), 1);
    }

    #[test]
    fn higher_origin_session_id_wins_collision() {
        let low = "v=0\r\no=- 8812034417710211 2 IN IP4 127.0.0.1\r\ns=-\r\n";
        let high = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\n";
        assert_eq!(origin_session_id(high), Some(4611731400430051336));
        assert!(local_offer_wins(high, low));
        assert!(!local_offer_wins(low, high));
        // одинаковые id: уступают обе стороны, но не зависают
        assert!(!local_offer_wins(low, low));
        // без строки o= решает сравнение текста
        assert!(local_offer_wins("v=0 b", "v=0 a"));
    }

    #[tokio::test]
    async fn collision_check_needs_own_outstanding_offer() {
        let (mut peer, _) = session(None).await;
        let remote = SessionDescription::offer("a-remote-offer");
        assert!(!peer.keeps_local_offer(&remote));

        // "local-offer" > "a-remote-offer"
        peer.make_offer().await.unwrap();
        assert!(peer.keeps_local_offer(&remote));

        peer.accept_answer(SessionDescription::answer("x")).await.unwrap();
        assert!(!peer.keeps_local_offer(&remote));
    }

    #[tokio::test]
    async fn owns_only_its_own_tag() {
        let (peer, _) = session(None).await;
        let mine = PeerTag {
            session: SessionId::from("A"),
            instance: 1,
        };
        let stray = PeerTag {
            instance: 2,
            ..mine.clone()
        };
        assert!(peer.owns(&mine));
        assert!(!peer.owns(&stray));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut peer, calls) = session(None).await;
        peer.close().await;
        peer.close().await;
        assert!(peer.is_closed());
        assert_eq!(calls.all().iter().filter(|c| *c == "close").count(), 1);
        assert!(matches!(
            peer.make_offer().await,
            Err(Error::InvalidSignalingState(_))
        ));
    }
}
