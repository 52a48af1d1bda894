//! Second-pass enrichment: attach a social profile handle and follower count
//! to every appearance row, querying the lookup capability once per distinct
//! performer name.

pub mod followers;
pub mod search;
pub mod selection;

use crate::constants::PROFILE_URL_PREFIX;
use crate::error::Result;
use crate::export::{self, AppearanceRow};
use crate::ingestion::rate_limiter::{PacingConfig, RateController};
use crate::ingestion::retry::RetryPolicy;
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub use search::SearchProfileLookup;
pub use selection::{select_profile, AMBIGUITY_MARGIN, MIN_CONFIDENCE};

/// One profile returned by the lookup capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCandidate {
    pub handle: String,
    pub display_name: String,
    pub bio_snippet: String,
    pub follower_count: Option<u64>,
}

/// Given a performer name, return zero or more candidate profiles.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Vec<ProfileCandidate>>;
}

/// Per-name enrichment state. `Unqueried` also covers names whose lookups
/// all failed in this run.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupState {
    Unqueried,
    Resolved {
        handle: String,
        follower_count: Option<u64>,
        confidence: f64,
    },
    NotFound,
    Ambiguous {
        handles: Vec<String>,
    },
}

impl LookupState {
    pub fn status_label(&self) -> &'static str {
        match self {
            LookupState::Unqueried => "unqueried",
            LookupState::Resolved { .. } => "resolved",
            LookupState::NotFound => "not_found",
            LookupState::Ambiguous { .. } => "ambiguous",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, LookupState::Unqueried)
    }

    fn handle(&self) -> Option<&str> {
        match self {
            LookupState::Resolved { handle, .. } => Some(handle),
            _ => None,
        }
    }

    fn follower_count(&self) -> Option<u64> {
        match self {
            LookupState::Resolved { follower_count, .. } => *follower_count,
            _ => None,
        }
    }

    fn profile_url(&self) -> String {
        self.handle()
            .map(|h| format!("{PROFILE_URL_PREFIX}{h}/"))
            .unwrap_or_default()
    }

    fn followers_text(&self) -> String {
        self.follower_count()
            .map(followers::format_count)
            .unwrap_or_default()
    }
}

/// Appearance row with enrichment columns appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedAppearanceRow {
    pub show_id: String,
    pub date: String,
    pub time: String,
    pub venue: String,
    pub comedian_name: String,
    pub order: usize,
    pub description: String,
    pub website: String,
    pub thumb_url: String,
    pub handle: String,
    pub profile_url: String,
    pub follower_count: Option<u64>,
    pub followers_text: String,
    pub enrichment_status: String,
}

pub const ENRICHED_HEADERS: [&str; 14] = [
    "show_id",
    "date",
    "time",
    "venue",
    "comedian_name",
    "order",
    "description",
    "website",
    "thumb_url",
    "handle",
    "profile_url",
    "follower_count",
    "followers_text",
    "enrichment_status",
];

/// One row per distinct performer name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComedianProfileRow {
    pub comedian_name: String,
    pub handle: String,
    pub profile_url: String,
    pub follower_count: Option<u64>,
    pub followers_text: String,
    pub enrichment_status: String,
}

pub const PROFILE_HEADERS: [&str; 6] = [
    "comedian_name",
    "handle",
    "profile_url",
    "follower_count",
    "followers_text",
    "enrichment_status",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentSummary {
    pub total_appearances: usize,
    pub distinct_names: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub ambiguous: usize,
    pub unqueried: usize,
    pub lookup_calls: u64,
    pub appearances_with_handle: usize,
    /// Distinct names resolved with a known follower count
    pub names_with_followers: usize,
    /// Mean follower count over `names_with_followers`
    pub average_followers: f64,
    /// Percentage of distinct names resolved to a profile
    pub discovery_rate: f64,
}

#[derive(Debug, Clone)]
pub struct EnrichmentReport {
    pub rows: Vec<EnrichedAppearanceRow>,
    pub profiles: Vec<ComedianProfileRow>,
    pub summary: EnrichmentSummary,
}

/// Write the enriched appearances table and the per-comedian profile table.
pub fn write_report(report: &EnrichmentReport, enriched: &Path, profiles: &Path) -> Result<()> {
    for path in [enriched, profiles] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    export::write_table(enriched, &ENRICHED_HEADERS, &report.rows)?;
    export::write_table(profiles, &PROFILE_HEADERS, &report.profiles)?;
    info!(
        "Wrote {} enriched rows to {} and {} profiles to {}",
        report.rows.len(),
        enriched.display(),
        report.profiles.len(),
        profiles.display()
    );
    Ok(())
}

/// Enrichment driver. The cache lives as long as the stage, so a stage
/// reused across batches never queries a settled name twice.
pub struct EnrichmentStage {
    lookup: Arc<dyn ProfileLookup>,
    retry: RetryPolicy,
    pacing: PacingConfig,
    workers: usize,
    cache: HashMap<String, LookupState>,
    lookup_calls: u64,
}

impl EnrichmentStage {
    pub fn new(
        lookup: Arc<dyn ProfileLookup>,
        retry: RetryPolicy,
        pacing: PacingConfig,
        workers: usize,
    ) -> Self {
        Self {
            lookup,
            retry,
            pacing,
            workers: workers.max(1),
            cache: HashMap::new(),
            lookup_calls: 0,
        }
    }

    pub fn state(&self, name: &str) -> LookupState {
        self.cache.get(name).cloned().unwrap_or(LookupState::Unqueried)
    }

    pub async fn enrich(&mut self, rows: Vec<AppearanceRow>) -> EnrichmentReport {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = rows
            .iter()
            .map(|r| r.comedian_name.clone())
            .filter(|n| !n.trim().is_empty() && seen.insert(n.clone()))
            .collect();

        let pending: Vec<String> = distinct
            .iter()
            .filter(|n| !self.state(n).is_settled())
            .cloned()
            .collect();
        info!(
            "Processing {} unique comedians ({} need lookups)",
            distinct.len(),
            pending.len()
        );

        self.resolve(pending).await;

        let enriched: Vec<EnrichedAppearanceRow> = rows
            .into_iter()
            .map(|row| {
                let state = self.state(&row.comedian_name);
                EnrichedAppearanceRow {
                    handle: state.handle().unwrap_or_default().to_string(),
                    profile_url: state.profile_url(),
                    follower_count: state.follower_count(),
                    followers_text: state.followers_text(),
                    enrichment_status: state.status_label().to_string(),
                    show_id: row.show_id,
                    date: row.date,
                    time: row.time,
                    venue: row.venue,
                    comedian_name: row.comedian_name,
                    order: row.order,
                    description: row.description,
                    website: row.website,
                    thumb_url: row.thumb_url,
                }
            })
            .collect();

        let profiles: Vec<ComedianProfileRow> = distinct
            .iter()
            .map(|name| {
                let state = self.state(name);
                ComedianProfileRow {
                    comedian_name: name.clone(),
                    handle: state.handle().unwrap_or_default().to_string(),
                    profile_url: state.profile_url(),
                    follower_count: state.follower_count(),
                    followers_text: state.followers_text(),
                    enrichment_status: state.status_label().to_string(),
                }
            })
            .collect();

        let summary = self.summarize(&distinct, &enriched);
        info!(
            "Enrichment finished: {} resolved, {} not found, {} ambiguous, {} unqueried",
            summary.resolved, summary.not_found, summary.ambiguous, summary.unqueried
        );
        EnrichmentReport {
            rows: enriched,
            profiles,
            summary,
        }
    }

    /// Look up `names`, partitioned round-robin over the workers. Each
    /// worker paces its own lookups.
    async fn resolve(&mut self, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        let worker_count = self.workers.min(names.len());
        let mut batches: Vec<Vec<String>> = vec![Vec::new(); worker_count];
        for (i, name) in names.into_iter().enumerate() {
            batches[i % worker_count].push(name);
        }

        let mut tasks = JoinSet::new();
        for (worker, batch) in batches.into_iter().enumerate() {
            let lookup = Arc::clone(&self.lookup);
            let retry = self.retry.clone();
            let rate = RateController::new(self.pacing.clone());
            tasks.spawn(run_worker(worker, batch, lookup, retry, rate));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((results, calls)) => {
                    self.lookup_calls += calls;
                    for (name, state) in results {
                        self.cache.insert(name, state);
                    }
                }
                Err(e) => error!("Enrichment worker aborted: {}", e),
            }
        }
    }

    fn summarize(&self, distinct: &[String], rows: &[EnrichedAppearanceRow]) -> EnrichmentSummary {
        let mut summary = EnrichmentSummary {
            total_appearances: rows.len(),
            distinct_names: distinct.len(),
            lookup_calls: self.lookup_calls,
            appearances_with_handle: rows.iter().filter(|r| !r.handle.is_empty()).count(),
            ..Default::default()
        };
        let mut follower_total = 0u64;
        for name in distinct {
            match self.state(name) {
                LookupState::Unqueried => summary.unqueried += 1,
                LookupState::Resolved { follower_count, .. } => {
                    summary.resolved += 1;
                    if let Some(count) = follower_count {
                        summary.names_with_followers += 1;
                        follower_total += count;
                    }
                }
                LookupState::NotFound => summary.not_found += 1,
                LookupState::Ambiguous { .. } => summary.ambiguous += 1,
            }
        }
        if summary.names_with_followers > 0 {
            summary.average_followers =
                follower_total as f64 / summary.names_with_followers as f64;
        }
        if summary.distinct_names > 0 {
            summary.discovery_rate =
                summary.resolved as f64 / summary.distinct_names as f64 * 100.0;
        }
        summary
    }
}

async fn run_worker(
    worker: usize,
    names: Vec<String>,
    lookup: Arc<dyn ProfileLookup>,
    retry: RetryPolicy,
    rate: RateController,
) -> (Vec<(String, LookupState)>, u64) {
    let mut results = Vec::with_capacity(names.len());
    let mut calls = 0u64;
    let total = names.len();

    for (i, name) in names.into_iter().enumerate() {
        info!("[worker {}] Processing {}/{}: {}", worker, i + 1, total, name);
        let outcome = retry
            .run(&format!("lookup '{name}'"), |_| {
                calls += 1;
                counter!("lineup_lookups_total").increment(1);
                let lookup = Arc::clone(&lookup);
                let rate = rate.clone();
                let name = name.clone();
                async move {
                    let permit = rate.acquire().await;
                    let result = lookup.lookup(&name).await;
                    permit.release().await;
                    result
                }
            })
            .await;

        let state = match outcome {
            Ok(candidates) => select_profile(&name, &candidates),
            Err(e) => {
                warn!("Leaving '{}' unqueried: {}", name, e);
                LookupState::Unqueried
            }
        };
        results.push((name, state));
    }
    (results, calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScraperError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLookup {
        calls: Mutex<Vec<String>>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl ProfileLookup for FakeLookup {
        async fn lookup(&self, name: &str) -> Result<Vec<ProfileCandidate>> {
            self.calls.lock().unwrap().push(name.to_string());
            if self.failing.contains(name) {
                return Err(ScraperError::EnrichmentLookup {
                    name: name.to_string(),
                    message: "quota exceeded".into(),
                });
            }
            let handle: String = name.to_lowercase().split_whitespace().collect();
            Ok(vec![ProfileCandidate {
                handle,
                display_name: name.to_string(),
                bio_snippet: "comedian".into(),
                follower_count: Some(1_000),
            }])
        }
    }

    fn row(show_id: &str, name: &str, order: usize) -> AppearanceRow {
        AppearanceRow {
            show_id: show_id.to_string(),
            date: "2024-12-07".into(),
            time: "8:00pm".into(),
            venue: "Village Underground".into(),
            comedian_name: name.to_string(),
            order,
            description: String::new(),
            website: String::new(),
            thumb_url: String::new(),
        }
    }

    fn stage(lookup: Arc<FakeLookup>, workers: usize) -> EnrichmentStage {
        EnrichmentStage::new(lookup, RetryPolicy::immediate(2), PacingConfig::unpaced(), workers)
    }

    #[tokio::test]
    async fn repeated_names_cost_one_lookup() {
        let lookup = Arc::new(FakeLookup::default());
        let mut stage = stage(lookup.clone(), 1);
        let report = stage
            .enrich(vec![row("s1", "Mark Normand", 1), row("s2", "Mark Normand", 3)])
            .await;

        assert_eq!(lookup.calls.lock().unwrap().len(), 1);
        assert_eq!(report.summary.lookup_calls, 1);
        assert_eq!(report.rows.len(), 2);
        assert!(report.rows.iter().all(|r| r.handle == "marknormand"));
        assert!(report.rows.iter().all(|r| r.follower_count == Some(1_000)));
    }

    #[tokio::test]
    async fn cache_survives_across_batches() {
        let lookup = Arc::new(FakeLookup::default());
        let mut stage = stage(lookup.clone(), 2);
        stage.enrich(vec![row("s1", "Sam Morril", 1)]).await;
        stage
            .enrich(vec![row("s2", "Sam Morril", 1), row("s2", "Jessica Kirson", 2)])
            .await;

        let calls = lookup.calls.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|n| *n == "Sam Morril").count(), 1);
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn lookup_failures_do_not_abort_the_batch() {
        let lookup = Arc::new(FakeLookup {
            failing: ["Broken Name".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let mut stage = stage(lookup.clone(), 2);
        let report = stage
            .enrich(vec![row("s1", "Broken Name", 1), row("s1", "Working Name", 2)])
            .await;

        assert_eq!(stage.state("Broken Name"), LookupState::Unqueried);
        assert_eq!(report.summary.unqueried, 1);
        assert_eq!(report.summary.resolved, 1);
        // Two attempts for the failing name, one for the working one.
        assert_eq!(lookup.calls.lock().unwrap().len(), 3);
        assert_eq!(report.rows[0].enrichment_status, "unqueried");
        assert_eq!(report.rows[1].enrichment_status, "resolved");
    }

    #[tokio::test]
    async fn summary_reports_discovery_rate() {
        let lookup = Arc::new(FakeLookup {
            failing: ["Nobody".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let mut stage = stage(lookup, 3);
        let report = stage
            .enrich(vec![
                row("s1", "Gary Vider", 1),
                row("s1", "Nobody", 2),
                row("s2", "Gary Vider", 1),
            ])
            .await;
        assert_eq!(report.summary.distinct_names, 2);
        assert_eq!(report.summary.appearances_with_handle, 2);
        assert!((report.summary.discovery_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn profiles_carry_url_and_follower_text() {
        let lookup = Arc::new(FakeLookup {
            failing: ["Nobody".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let mut stage = stage(lookup, 1);
        let report = stage
            .enrich(vec![
                row("s1", "Liz Miele", 1),
                row("s1", "Nobody", 2),
                row("s2", "Liz Miele", 1),
            ])
            .await;

        assert_eq!(report.rows[0].profile_url, "https://www.instagram.com/lizmiele/");
        assert_eq!(report.rows[0].followers_text, "1.0K");
        assert_eq!(report.rows[1].profile_url, "");
        assert_eq!(report.rows[1].followers_text, "");

        assert_eq!(report.profiles.len(), 2);
        assert_eq!(report.profiles[0].comedian_name, "Liz Miele");
        assert_eq!(report.profiles[0].handle, "lizmiele");
        assert_eq!(report.profiles[0].follower_count, Some(1_000));
        assert_eq!(report.profiles[1].enrichment_status, "unqueried");

        assert_eq!(report.summary.names_with_followers, 1);
        assert!((report.summary.average_followers - 1_000.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn report_is_written_as_two_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = stage(Arc::new(FakeLookup::default()), 1);
        let report = stage
            .enrich(vec![row("s1", "Liz Miele", 1), row("s2", "Liz Miele", 1)])
            .await;

        let enriched = dir.path().join("x_comedians_enriched.csv");
        let profiles = dir.path().join("x_comedian_profiles.csv");
        write_report(&report, &enriched, &profiles).unwrap();

        let profile_text = std::fs::read_to_string(&profiles).unwrap();
        let mut lines = profile_text.lines();
        assert_eq!(lines.next(), Some(PROFILE_HEADERS.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some("Liz Miele,lizmiele,https://www.instagram.com/lizmiele/,1000,1.0K,resolved")
        );
        assert_eq!(lines.next(), None);
        assert_eq!(std::fs::read_to_string(&enriched).unwrap().lines().count(), 3);
    }
}
