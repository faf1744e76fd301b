use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported url scheme '{0}'")]
    Scheme(String),
    #[error("websocket connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),
}
