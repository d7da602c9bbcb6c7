use crate::error::{Error, Result};

/// Логическое состояние обмена offer/answer для одного PeerSession
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    Stable,
    Closed,
}

impl SignalingState {
    /// offer можно создать или принять только в новом соединении
    pub fn expect_new(self, op: &str) -> Result<()> {
        if self == SignalingState::New {
            Ok(())
        } else {
            Err(Error::InvalidSignalingState(format!(
                "{op} requires New, state is {self:?}"
            )))
        }
    }

    pub fn accepts_answer(self) -> bool {
        self == SignalingState::HaveLocalOffer
    }

    /// remote description уже установлен
    pub fn has_remote_description(self) -> bool {
        matches!(self, SignalingState::HaveRemoteOffer | SignalingState::Stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_new_allows_offer_operations() {
        assert!(SignalingState::New.expect_new("make_offer").is_ok());
        for s in [
            SignalingState::HaveLocalOffer,
            SignalingState::HaveRemoteOffer,
            SignalingState::Stable,
            SignalingState::Closed,
        ] {
            assert!(matches!(
                s.expect_new("accept_offer"),
                Err(Error::InvalidSignalingState(_))
            ));
        }
    }

    #[test]
    fn answer_only_after_local_offer() {
        assert!(SignalingState::HaveLocalOffer.accepts_answer());
        assert!(!SignalingState::Stable.accepts_answer());
        assert!(!SignalingState::New.accepts_answer());
    }
}
