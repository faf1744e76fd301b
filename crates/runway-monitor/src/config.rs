use crate::error::MonitorError;
use runway_core::{BackoffPolicy, EVENT_BUFFER_CAPACITY};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_EVENT_PATH: &str = "/ws";
pub const DEFAULT_STATUS_PATH: &str = "/status";
pub const DEFAULT_SESSION_ID: &str = "default";
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const PING_FRAME: &str = "ping";

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub base_url: Url,
    pub event_path: String,
    pub status_path: String,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub buffer_capacity: usize,
}

impl MonitorConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            event_path: DEFAULT_EVENT_PATH.to_string(),
            status_path: DEFAULT_STATUS_PATH.to_string(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            poll_interval: POLL_INTERVAL,
            fetch_timeout: FETCH_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            backoff: BackoffPolicy::default(),
            buffer_capacity: EVENT_BUFFER_CAPACITY,
        }
    }

    /// Push endpoint on the serving host, `ws` for `http` and `wss` for `https`.
    pub fn event_url(&self) -> Result<Url, MonitorError> {
        let mut url = self.base_url.join(&self.event_path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(MonitorError::Scheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| MonitorError::Scheme(scheme.to_string()))?;
        Ok(url)
    }

    pub fn status_url(&self) -> Result<Url, MonitorError> {
        let url = self.base_url.join(&self.status_path)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(MonitorError::Scheme(other.to_string())),
        }
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| non_empty(&value))
}

pub fn resolve_base_url(flag: &str) -> Result<Url, MonitorError> {
    let raw = non_empty(flag)
        .or_else(|| env_non_empty("RUNWAY_BASE_URL"))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    Ok(Url::parse(&raw)?)
}

pub fn resolve_session_id(flag: &str) -> String {
    non_empty(flag)
        .or_else(|| env_non_empty("RUNWAY_SESSION_ID"))
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
}

pub fn resolve_state_dir(flag: &str) -> PathBuf {
    if let Some(value) = non_empty(flag).or_else(|| env_non_empty("RUNWAY_STATE_DIR")) {
        return PathBuf::from(value);
    }
    if let Some(value) = env_non_empty("XDG_STATE_HOME") {
        return PathBuf::from(value);
    }
    if let Some(value) = env_non_empty("HOME") {
        return PathBuf::from(value).join(".local").join("state");
    }
    PathBuf::from(".runway/state")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> MonitorConfig {
        MonitorConfig::new(Url::parse(base).expect("url"))
    }

    #[test]
    fn event_url_follows_base_scheme() {
        assert_eq!(
            config("http://localhost:8000").event_url().expect("url").as_str(),
            "ws://localhost:8000/ws"
        );
        assert_eq!(
            config("https://desk.example.com/").event_url().expect("url").as_str(),
            "wss://desk.example.com/ws"
        );
        assert!(matches!(
            config("ftp://desk.example.com").event_url(),
            Err(MonitorError::Scheme(_))
        ));
    }

    #[test]
    fn connect_and_fetch_are_bounded_by_default() {
        let config = config("http://localhost:8000");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn status_url_joins_path() {
        assert_eq!(
            config("http://127.0.0.1:9000").status_url().expect("url").as_str(),
            "http://127.0.0.1:9000/status"
        );
    }

    #[test]
    fn flags_win_over_defaults() {
        assert_eq!(resolve_session_id(" desk-7 "), "desk-7");
        assert_eq!(resolve_state_dir("/var/tmp/rw"), PathBuf::from("/var/tmp/rw"));
        assert_eq!(
            resolve_base_url("http://10.0.0.2:8000").expect("url").as_str(),
            "http://10.0.0.2:8000/"
        );
        assert!(resolve_base_url("not a url").is_err());
    }

    #[test]
    fn bool_flags_accept_common_spellings() {
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag(" off "), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }
}
