use crate::config::VenueApiConfig;
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// One HTTP exchange with the venue API. Transport-level failures
/// (timeouts, resets, refused connections) surface as `ScraperError::Network`.
#[async_trait]
pub trait LineupTransport: Send + Sync {
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<TransportResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &VenueApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| ScraperError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn network_error(e: reqwest::Error) -> ScraperError {
    ScraperError::Network {
        message: e.to_string(),
    }
}

#[async_trait]
impl LineupTransport for ReqwestTransport {
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<TransportResponse> {
        let resp = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(network_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(network_error)?;
        Ok(TransportResponse { status, body })
    }
}
