/// Result с ошибкой клиента
pub type Result<T> = std::result::Result<T, Error>;

/// Ошибки подбора пары и согласования соединения
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Камера/микрофон недоступны или запрещены
    #[error("Media access error: {0}")]
    MediaAccess(String),

    /// Событие согласования для уже не текущего session id
    #[error("Stale session event: {0}")]
    StaleSession(String),

    /// Offer/answer в неподходящем signaling state
    #[error("Invalid signaling state: {0}")]
    InvalidSignalingState(String),

    /// Не удалось применить удалённый кандидат
    #[error("ICE candidate error: {0}")]
    IceApplication(String),

    /// ICE перешёл в `failed`
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// Некорректный параметр конфигурации
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Можно ли восстановиться пересогласованием
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed(_) | Error::WebRtc(_) | Error::IceApplication(_)
        )
    }

    /// Нужны действия пользователя, прежде чем начинать сессию
    pub fn is_blocking(&self) -> bool {
        matches!(self, Error::MediaAccess(_))
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::WebRtc(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MediaAccess("permission denied".to_string());
        assert_eq!(err.to_string(), "Media access error: permission denied");
    }

    #[test]
    fn test_only_media_access_blocks() {
        assert!(Error::MediaAccess("x".into()).is_blocking());
        assert!(!Error::ConnectionFailed("x".into()).is_blocking());
        assert!(!Error::StaleSession("x".into()).is_blocking());
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::ConnectionFailed("ice".into()).is_retryable());
        assert!(!Error::MediaAccess("cam".into()).is_retryable());
        assert!(!Error::InvalidConfig("url".into()).is_retryable());
        assert!(!Error::StaleSession("A".into()).is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(Error::from(json_err), Error::Serialization(_)));
    }
}
