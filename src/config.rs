use crate::constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_OUTPUT_DIR, DEFAULT_REQUEST_TYPE, DEFAULT_USER_AGENT,
    GOOGLE_API_KEY_VAR, GOOGLE_CSE_ID_VAR, SEARCH_API_URL, VENUE_API_URL,
};
use crate::error::{Result, ScraperError};
use crate::ingestion::rate_limiter::PacingConfig;
use crate::ingestion::retry::RetryPolicy;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Run configuration. Every field has a default so an empty or absent
/// `lineup.toml` is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub venue_api: VenueApiConfig,
    pub pacing: PacingSection,
    pub retry: RetrySection,
    pub enrichment: EnrichmentSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenueApiConfig {
    pub base_url: String,
    pub request_type: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for VenueApiConfig {
    fn default() -> Self {
        Self {
            base_url: VENUE_API_URL.to_string(),
            request_type: DEFAULT_REQUEST_TYPE.to_string(),
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub base_delay_ms: u64,
    pub long_pause_every: u64,
    pub long_pause_ms: u64,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            long_pause_every: 50,
            long_pause_ms: 5_000,
        }
    }
}

impl PacingSection {
    pub fn to_pacing(&self) -> PacingConfig {
        PacingConfig {
            base_delay: Duration::from_millis(self.base_delay_ms),
            long_pause_every: self.long_pause_every,
            long_pause: Duration::from_millis(self.long_pause_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub backoff_factor: u32,
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 2_000,
            backoff_factor: 2,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            factor: self.backoff_factor.max(1),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentSection {
    pub search_url: String,
    pub workers: usize,
    pub lookup_delay_ms: u64,
    pub long_pause_every: u64,
    pub long_pause_ms: u64,
    pub max_results: u32,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            search_url: SEARCH_API_URL.to_string(),
            workers: 1,
            lookup_delay_ms: 1_000,
            long_pause_every: 10,
            long_pause_ms: 5_000,
            max_results: 10,
        }
    }
}

impl EnrichmentSection {
    pub fn to_pacing(&self) -> PacingConfig {
        PacingConfig {
            base_delay: Duration::from_millis(self.lookup_delay_ms),
            long_pause_every: self.long_pause_every,
            long_pause: Duration::from_millis(self.long_pause_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: DEFAULT_OUTPUT_DIR.to_string(),
        }
    }
}

/// Search API credentials, taken from the environment only
#[derive(Clone)]
pub struct SearchCredentials {
    pub api_key: String,
    pub cse_id: String,
}

impl std::fmt::Debug for SearchCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCredentials")
            .field("api_key", &"<redacted>")
            .field("cse_id", &self.cse_id)
            .finish()
    }
}

impl SearchCredentials {
    /// Read both credentials from the process environment. Either one
    /// missing or blank is a fatal `Config` error.
    pub fn from_env() -> Result<Self> {
        Self::from_source(|var| std::env::var(var).ok())
    }

    pub fn from_source(source: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |var: &str| {
            source(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    ScraperError::Config(format!("{var} must be set (environment or .env file)"))
                })
        };
        Ok(Self {
            api_key: read(GOOGLE_API_KEY_VAR)?,
            cse_id: read(GOOGLE_CSE_ID_VAR)?,
        })
    }
}

impl ScraperConfig {
    /// Load configuration from `path`, or from `lineup.toml` when no path is
    /// given. A missing default file yields the defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        if !config_path.exists() {
            if explicit {
                return Err(ScraperError::Config(format!(
                    "Config file '{}' not found",
                    config_path.display()
                )));
            }
            debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&config_content)?;
        info!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ScraperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.venue_api.base_url.trim().is_empty() {
            return Err(ScraperError::Config("venue_api.base_url is empty".into()));
        }
        if self.venue_api.timeout_secs == 0 {
            return Err(ScraperError::Config(
                "venue_api.timeout_secs must be positive".into(),
            ));
        }
        if self.enrichment.workers == 0 {
            return Err(ScraperError::Config(
                "enrichment.workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
