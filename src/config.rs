// Конфигурация клиента
// Логирование по умолчанию подробное только в режиме разработки

use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене только предупреждения

/// Фильтр tracing по умолчанию; `RUST_LOG` его переопределяет
pub fn default_log_filter() -> &'static str {
    if LOGGING_ENABLED {
        "pairchat=debug,pairchat_lib=debug,webrtc=warn"
    } else {
        "warn"
    }
}

/// Публичные STUN серверы, которыми пользуется клиент по умолчанию
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL сервера подбора пар (ws://; TLS терминирует прокси)
    pub signaling_url: String,

    pub ice_servers: Vec<ServerConfig>,

    /// Пауза между `paired` и собственным offer
    pub offer_delay_ms: u64,

    /// Случайная добавка к паузе, уменьшает встречные offer
    pub offer_jitter_ms: u64,

    /// Сколько ждать `connected` после обмена offer/answer
    pub watchdog_ms: u64,

    /// Сколько раз пересогласовать соединение в одной сессии
    pub max_renegotiations: u32,

    /// Искать нового собеседника сам, если соединение не удалось
    pub auto_advance_on_failure: bool,

    pub reconnect_attempts: u32,

    pub reconnect_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:5000/ws".into(),
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            offer_delay_ms: 1000,
            offer_jitter_ms: 250,
            watchdog_ms: 8000,
            max_renegotiations: 1,
            auto_advance_on_failure: false,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Читает TOML; отсутствующие поля берутся из `Default`
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ClientConfig =
            toml::from_str(&text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.signaling_url.starts_with("ws://") {
            return Err(Error::InvalidConfig(format!(
                "signaling url must be ws://, got '{}'",
                self.signaling_url
            )));
        }
        validate_ice_servers(&self.ice_servers)
    }

    pub fn offer_delay(&self) -> Duration {
        Duration::from_millis(self.offer_delay_ms)
    }

    pub fn offer_jitter(&self) -> Duration {
        Duration::from_millis(self.offer_jitter_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<()> {
    for server in servers {
        if server.url.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "ICE server '{}' has an empty url",
                server.id
            )));
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(Error::InvalidConfig(format!(
                "TURN server '{}' requires username and credential",
                server.id
            )));
        }
    }
    Ok(())
}
