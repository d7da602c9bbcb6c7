use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Токен сервера для одной пары собеседников
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Me,
    Peer,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub origin: Origin,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Чат текущей сессии; очищается при смене session id
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn push(&mut self, origin: Origin, text: impl Into<String>) -> ChatMessage {
        let msg = ChatMessage {
            origin,
            text: text.into(),
            at: Utc::now(),
        };
        self.messages.push(msg.clone());
        msg
    }

    /// Возвращает true, если было что очищать
    pub fn clear(&mut self) -> bool {
        let had = !self.messages.is_empty();
        self.messages.clear();
        had
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_log_appends_in_order_and_clears() {
        let mut log = ChatLog::default();
        log.push(Origin::Me, "hi");
        log.push(Origin::Peer, "hello");
        let texts: Vec<_> = log.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hi", "hello"]);
        assert!(log.clear());
        assert!(log.is_empty());
        assert!(!log.clear());
    }

    #[test]
    fn session_id_is_a_bare_json_string() {
        let id: SessionId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id, SessionId::from("abc"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
