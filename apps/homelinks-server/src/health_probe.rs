use homelinks_store::models::HealthMethod;
use reqwest::{Client, Method, Url, redirect};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Outbound checker behind the health proxy, so the browser never has to
/// make cross-origin requests itself.
#[derive(Clone)]
pub struct HealthProbe {
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub status: u16,
    pub status_text: String,
    pub ok: bool,
    pub ms: u64,
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid target url: {0}")]
    InvalidUrl(String),
    #[error("request timed out")]
    Timeout,
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl HealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // Already installed is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }

    pub async fn check(&self, target: &str, method: HealthMethod) -> Result<ProbeReport, ProbeError> {
        let url = Url::parse(target).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProbeError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let method = match method {
            HealthMethod::Head => Method::HEAD,
            HealthMethod::Get => Method::GET,
        };

        let started = Instant::now();
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout
                } else {
                    ProbeError::Request(e)
                }
            })?;
        let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let status = response.status();
        Ok(ProbeReport {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            ok: status.is_success(),
            ms,
        })
    }
}
