//! Client configuration loaded from environment variables.
//!
//! Everything except the token has a default so a local development backend
//! works with only `NEXALOG_TOKEN` set.

use std::str::FromStr;
use std::time::Duration;

use nexalog_shared::constants::{
    CHANNEL_PAGE_SIZE, CONVERSATION_PAGE_SIZE, DEFAULT_API_BASE, FRIEND_PAGE_SIZE,
    RECONNECT_ATTEMPTS, RECONNECT_DELAY_MS, REQUEST_TIMEOUT_SECS,
};

use crate::session::PageSizes;

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API. The push socket lives on the same origin.
    /// Env: `NEXALOG_API_BASE`
    /// Default: `http://localhost:4000`
    pub api_base: String,

    /// Bearer token for REST requests and the socket handshake.
    /// Env: `NEXALOG_TOKEN`
    pub token: Option<String>,

    /// Env: `NEXALOG_CONVERSATION_PAGE_SIZE`, default 50.
    pub conversation_page_size: u32,

    /// Env: `NEXALOG_CHANNEL_PAGE_SIZE`, default 30.
    pub channel_page_size: u32,

    /// Env: `NEXALOG_FRIEND_PAGE_SIZE`, default 5.
    pub friend_page_size: u32,

    /// Consecutive failed socket connections tolerated before giving up.
    /// Env: `NEXALOG_RECONNECT_ATTEMPTS`, default 10.
    pub reconnect_attempts: u32,

    /// Env: `NEXALOG_RECONNECT_DELAY_MS`, default 1000.
    pub reconnect_delay: Duration,

    /// Env: `NEXALOG_REQUEST_TIMEOUT_SECS`, default 15.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("conversation_page_size", &self.conversation_page_size)
            .field("channel_page_size", &self.channel_page_size)
            .field("friend_page_size", &self.friend_page_size)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
            conversation_page_size: CONVERSATION_PAGE_SIZE,
            channel_page_size: CHANNEL_PAGE_SIZE,
            friend_page_size: FRIEND_PAGE_SIZE,
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(base) = lookup("NEXALOG_API_BASE") {
            let base = base.trim().trim_end_matches('/');
            if base.is_empty() {
                tracing::warn!("Empty NEXALOG_API_BASE, using default");
            } else {
                config.api_base = base.to_string();
            }
        }

        if let Some(token) = lookup("NEXALOG_TOKEN") {
            if !token.trim().is_empty() {
                config.token = Some(token.trim().to_string());
            }
        }

        parse_positive(&lookup, "NEXALOG_CONVERSATION_PAGE_SIZE", &mut config.conversation_page_size);
        parse_positive(&lookup, "NEXALOG_CHANNEL_PAGE_SIZE", &mut config.channel_page_size);
        parse_positive(&lookup, "NEXALOG_FRIEND_PAGE_SIZE", &mut config.friend_page_size);
        parse_into(&lookup, "NEXALOG_RECONNECT_ATTEMPTS", &mut config.reconnect_attempts);

        let mut delay_ms = config.reconnect_delay.as_millis() as u64;
        parse_into(&lookup, "NEXALOG_RECONNECT_DELAY_MS", &mut delay_ms);
        config.reconnect_delay = Duration::from_millis(delay_ms);

        let mut timeout_secs = config.request_timeout.as_secs();
        parse_positive(&lookup, "NEXALOG_REQUEST_TIMEOUT_SECS", &mut timeout_secs);
        config.request_timeout = Duration::from_secs(timeout_secs);

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn page_sizes(&self) -> PageSizes {
        PageSizes {
            conversation: self.conversation_page_size,
            channel: self.channel_page_size,
            friends: self.friend_page_size,
        }
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T) {
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(value = %raw, var = name, "Invalid value, using default"),
        }
    }
}

fn parse_positive<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T)
where
    T: FromStr + PartialOrd + Default + Copy,
{
    let previous = *slot;
    parse_into(lookup, name, slot);
    if *slot <= T::default() {
        tracing::warn!(var = name, "Value must be positive, using default");
        *slot = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.api_base, "http://localhost:4000");
        assert_eq!(config.token, None);
        assert_eq!(config.conversation_page_size, 50);
        assert_eq!(config.channel_page_size, 30);
        assert_eq!(config.friend_page_size, 5);
        assert_eq!(config.reconnect_attempts, 10);
        assert_eq!(config.reconnect_delay, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("NEXALOG_API_BASE", "https://chat.example.com/api/"),
            ("NEXALOG_TOKEN", " abc "),
            ("NEXALOG_CHANNEL_PAGE_SIZE", "10"),
            ("NEXALOG_RECONNECT_ATTEMPTS", "0"),
            ("NEXALOG_RECONNECT_DELAY_MS", "250"),
        ]));
        assert_eq!(config.api_base, "https://chat.example.com/api");
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.channel_page_size, 10);
        assert_eq!(config.reconnect_attempts, 0);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("NEXALOG_CONVERSATION_PAGE_SIZE", "lots"),
            ("NEXALOG_FRIEND_PAGE_SIZE", "0"),
            ("NEXALOG_REQUEST_TIMEOUT_SECS", "-3"),
            ("NEXALOG_TOKEN", "   "),
        ]));
        assert_eq!(config.conversation_page_size, 50);
        assert_eq!(config.friend_page_size, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.token, None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig {
            token: Some("secret".into()),
            ..ClientConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret"));
    }
}
