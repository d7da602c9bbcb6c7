use crate::peer::types::ServerConfig;
use rand::Rng;
use std::time::Duration;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Задержка плюс случайный разброс в пределах `jitter`
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let extra = rand::rng().random_range(0..=jitter.as_millis() as u64);
    base + Duration::from_millis(extra)
}

// Добавляет схему протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    // Если url уже начинается со схемы, возвращаем как есть
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
    {
        config.url.clone()
    } else {
        // В зависимости от типа сервера добавляем нужную схему
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(kind: &str, url: &str) -> ServerConfig {
        ServerConfig {
            id: "s".into(),
            r#type: kind.into(),
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    #[test]
    fn scheme_is_added_by_server_type() {
        assert_eq!(add_ice_url_scheme(&server("stun", "example.org:3478")), "stun:example.org:3478");
        assert_eq!(add_ice_url_scheme(&server("turn", "example.org:3478")), "turn:example.org:3478");
        assert_eq!(add_ice_url_scheme(&server("turn", "stun:x:1")), "stun:x:1");
    }

    #[test]
    fn random_id_is_16_hex_chars() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let base = Duration::from_millis(500);
        let j = Duration::from_millis(250);
        for _ in 0..32 {
            let d = jittered(base, j);
            assert!(d >= base && d <= base + j);
        }
        assert_eq!(jittered(base, Duration::ZERO), base);
    }
}
