use crate::peer::session::PeerSession;
use crate::peer::types::IceCandidate;
use crate::session::SessionId;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Кандидаты, полученные до установки remote description.
///
/// Очередь привязана к одному session id и никогда не сливается в
/// PeerSession другой сессии.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    session: Option<SessionId>,
    pending: VecDeque<IceCandidate>,
}

impl CandidateQueue {
    pub fn for_session(session: SessionId) -> Self {
        Self {
            session: Some(session),
            pending: VecDeque::new(),
        }
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn enqueue(&mut self, candidate: IceCandidate) {
        self.pending.push_back(candidate);
        debug!(queued = self.pending.len(), "Remote description not set yet, queuing candidate");
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Применяет все отложенные кандидаты в порядке поступления.
    /// Ошибка одного кандидата не останавливает остальные.
    /// Возвращает число успешно применённых.
    pub async fn drain_into(&mut self, peer: &PeerSession) -> usize {
        if self.session.as_ref() != Some(peer.session_id()) {
            warn!(
                peer = %peer.session_id(),
                "candidate queue belongs to another session, not draining"
            );
            return 0;
        }

        let mut applied = 0;
        while let Some(candidate) = self.pending.pop_front() {
            debug!("Applying pending candidate: {}", candidate.candidate);
            match peer.apply_candidate(candidate).await {
                Ok(()) => applied += 1,
                Err(e) => warn!("Failed to apply pending candidate: {e}"),
            }
        }
        applied
    }
}

pub fn analyze_candidates(candidates: &[IceCandidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    );

    if relay_count == 0 && srflx_count == 0 && !candidates.is_empty() {
        warn!("Only host candidates gathered! Connection through NAT may fail.");
    }
}
