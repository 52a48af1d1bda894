use crate::config::VenueApiConfig;
use crate::constants::VENUE_API_ACTION;
use crate::error::{Result, ScraperError};
use crate::ingestion::rate_limiter::RateController;
use crate::ingestion::retry::RetryPolicy;
use crate::ingestion::transport::LineupTransport;
use crate::types::{RawPayload, VenueSelector};
use chrono::NaiveDate;
use metrics::{counter, histogram};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Why a (date, venue) fetch produced no payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Transport failure or retryable status after all attempts
    Network(String),
    /// Non-2xx status that is not worth retrying
    Status(u16),
    /// Body was not a JSON object
    Malformed(String),
    Other(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Network(m) => write!(f, "network error: {m}"),
            FetchFailure::Status(s) => write!(f, "unexpected HTTP status {s}"),
            FetchFailure::Malformed(m) => write!(f, "malformed response: {m}"),
            FetchFailure::Other(m) => write!(f, "{m}"),
        }
    }
}

impl From<ScraperError> for FetchFailure {
    fn from(err: ScraperError) -> Self {
        match err {
            ScraperError::Network { message } => FetchFailure::Network(message),
            ScraperError::Status { status } => FetchFailure::Status(status),
            ScraperError::MalformedResponse { message } => FetchFailure::Malformed(message),
            other => FetchFailure::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(RawPayload),
    Failed {
        date: NaiveDate,
        venue: VenueSelector,
        reason: FetchFailure,
    },
}

/// Issues venue API requests through the shared `RateController`, retrying
/// transient failures under the `RetryPolicy`. Never returns an error: a
/// fetch that cannot be completed becomes `FetchOutcome::Failed`.
pub struct LineupFetcher {
    transport: Arc<dyn LineupTransport>,
    rate: RateController,
    retry: RetryPolicy,
    base_url: String,
    request_type: String,
}

impl LineupFetcher {
    pub fn new(
        transport: Arc<dyn LineupTransport>,
        rate: RateController,
        retry: RetryPolicy,
        api: &VenueApiConfig,
    ) -> Self {
        Self {
            transport,
            rate,
            retry,
            base_url: api.base_url.clone(),
            request_type: api.request_type.clone(),
        }
    }

    pub fn rate_controller(&self) -> &RateController {
        &self.rate
    }

    /// Form fields for one lineup request: the action plus a JSON-encoded
    /// `{date, venue, type}` object.
    pub fn request_form(
        date: NaiveDate,
        venue: VenueSelector,
        request_type: &str,
    ) -> Vec<(String, String)> {
        let payload = json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "venue": venue.as_str(),
            "type": request_type,
        });
        vec![
            ("action".to_string(), VENUE_API_ACTION.to_string()),
            ("json".to_string(), payload.to_string()),
        ]
    }

    #[instrument(skip(self), fields(date = %date, venue = %venue))]
    pub async fn fetch(&self, date: NaiveDate, venue: VenueSelector) -> FetchOutcome {
        let form = Self::request_form(date, venue, &self.request_type);
        let label = format!("lineup request {date}");

        match self.retry.run(&label, |_| self.attempt(&form)).await {
            Ok((sequence, body)) => {
                debug!("Fetched lineup payload (request #{})", sequence);
                FetchOutcome::Fetched(RawPayload {
                    date,
                    venue,
                    body,
                    sequence,
                })
            }
            Err(e) => {
                warn!("Request failed for {}: {}", date, e);
                counter!("lineup_fetch_failures_total").increment(1);
                FetchOutcome::Failed {
                    date,
                    venue,
                    reason: e.into(),
                }
            }
        }
    }

    async fn attempt(&self, form: &[(String, String)]) -> Result<(u64, Value)> {
        let permit = self.rate.acquire().await;
        let sequence = permit.number();
        counter!("lineup_requests_total").increment(1);

        let t0 = Instant::now();
        let response = self.transport.post_form(&self.base_url, form).await;
        histogram!("lineup_fetch_duration_seconds").record(t0.elapsed().as_secs_f64());
        permit.release().await;

        let response = response?;
        if response.status == 429 || response.status >= 500 {
            return Err(ScraperError::Network {
                message: format!("HTTP {}", response.status),
            });
        }
        if !(200..=299).contains(&response.status) {
            return Err(ScraperError::Status {
                status: response.status,
            });
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| ScraperError::malformed(format!("JSON decode failed: {e}")))?;
        if !body.is_object() {
            return Err(ScraperError::malformed(
                "top-level response is not a JSON object",
            ));
        }
        Ok((sequence, body))
    }
}
