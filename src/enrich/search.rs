use crate::config::{EnrichmentSection, SearchCredentials};
use crate::constants::DEFAULT_USER_AGENT;
use crate::enrich::followers;
use crate::enrich::{ProfileCandidate, ProfileLookup};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

static PROFILE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"instagram\.com/([A-Za-z0-9_.]+)").unwrap());

/// Path segments that live under instagram.com but are not profiles
const EXCLUDED_PATHS: [&str; 6] = ["p", "reel", "tv", "explore", "accounts", "stories"];

pub fn search_queries(name: &str) -> [String; 3] {
    [
        format!("{name} comedian instagram"),
        format!("{name} stand up comedy instagram"),
        format!("\"{name}\" instagram comedian"),
    ]
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub pagemap: Option<PageMap>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageMap {
    #[serde(default)]
    pub metatags: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl SearchItem {
    fn og_description(&self) -> Option<&str> {
        self.pagemap
            .as_ref()?
            .metatags
            .iter()
            .find_map(|tags| tags.get("og:description").and_then(|v| v.as_str()))
    }
}

/// Extract a profile handle from an Instagram URL, skipping post, reel and
/// other non-profile paths.
pub fn handle_from_url(url: &str) -> Option<String> {
    let caps = PROFILE_URL.captures(url)?;
    let handle = caps[1].trim_end_matches('.');
    if handle.is_empty() || EXCLUDED_PATHS.contains(&handle.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(handle.to_string())
}

/// Turn one page of search results into profile candidates.
pub fn candidates_from_results(response: &SearchResponse) -> Vec<ProfileCandidate> {
    response
        .items
        .iter()
        .filter_map(|item| {
            let handle = handle_from_url(&item.link)?;
            let follower_count = item
                .og_description()
                .and_then(followers::from_og_description)
                .or_else(|| followers::from_text(&format!("{} {}", item.title, item.snippet)));
            Some(ProfileCandidate {
                handle,
                display_name: item.title.clone(),
                bio_snippet: item.snippet.clone(),
                follower_count,
            })
        })
        .collect()
}

/// Profile lookup backed by the Google Custom Search JSON API.
pub struct SearchProfileLookup {
    client: reqwest::Client,
    search_url: String,
    credentials: SearchCredentials,
    max_results: u32,
}

impl SearchProfileLookup {
    pub fn new(config: &EnrichmentSection, credentials: SearchCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScraperError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            search_url: config.search_url.clone(),
            credentials,
            // The API caps a page at ten results.
            max_results: config.max_results.clamp(1, 10),
        })
    }

    async fn search(&self, name: &str, query: &str) -> Result<SearchResponse> {
        let lookup_error = |message: String| ScraperError::EnrichmentLookup {
            name: name.to_string(),
            message,
        };
        let num = self.max_results.to_string();
        let resp = self
            .client
            .get(&self.search_url)
            .query(&[
                ("key", self.credentials.api_key.as_str()),
                ("cx", self.credentials.cse_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        check_status(name, resp.status().as_u16())?;
        let body = resp.text().await.map_err(|e| lookup_error(e.to_string()))?;
        parse_response(name, &body)
    }
}

/// 403 (daily quota), 429 and 5xx are worth retrying; other non-2xx
/// statuses are not.
pub fn check_status(name: &str, status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        403 | 429 | 500..=599 => Err(ScraperError::EnrichmentLookup {
            name: name.to_string(),
            message: format!("search API returned HTTP {status}"),
        }),
        _ => Err(ScraperError::Status { status }),
    }
}

/// Decode a search API body. A truncated or non-JSON body counts as a
/// failed lookup so it is retried like any other transient failure.
pub fn parse_response(name: &str, body: &str) -> Result<SearchResponse> {
    serde_json::from_str(body).map_err(|e| ScraperError::EnrichmentLookup {
        name: name.to_string(),
        message: format!("undecodable search response: {e}"),
    })
}

#[async_trait]
impl ProfileLookup for SearchProfileLookup {
    #[instrument(skip(self))]
    async fn lookup(&self, name: &str) -> Result<Vec<ProfileCandidate>> {
        for query in search_queries(name) {
            let response = self.search(name, &query).await?;
            let candidates = candidates_from_results(&response);
            debug!("Query '{}' yielded {} candidates", query, candidates.len());
            if !candidates.is_empty() {
                return Ok(candidates);
            }
        }
        Ok(Vec::new())
    }
}
