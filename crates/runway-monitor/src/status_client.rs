use crate::config::MonitorConfig;
use crate::error::MonitorError;
use runway_core::StatusSnapshot;
use url::Url;

/// Fetches the scheduler's `/status` snapshot for the polling fallback.
#[derive(Clone, Debug)]
pub struct StatusClient {
    http: reqwest::Client,
    url: Url,
}

impl StatusClient {
    pub fn new(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;
        Ok(Self {
            http,
            url: config.status_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn fetch(&self) -> Result<StatusSnapshot, MonitorError> {
        let snapshot = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<StatusSnapshot>()
            .await?;
        Ok(snapshot)
    }
}
