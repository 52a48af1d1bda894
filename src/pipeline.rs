use crate::aggregate::Aggregator;
use crate::error::{Result, ScraperError};
use crate::ingestion::fetcher::{FetchFailure, FetchOutcome, LineupFetcher};
use crate::parser::LineupParser;
use crate::types::{Snapshot, VenueSelector};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Inclusive calendar date range, iterated one day at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ScraperError::Config(format!(
                "Start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// January 1st of `first` through December 31st of `last`.
    pub fn years(first: i32, last: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(first, 1, 1)
            .ok_or_else(|| ScraperError::Config(format!("Invalid year {first}")))?;
        let end = NaiveDate::from_ymd_opt(last, 12, 31)
            .ok_or_else(|| ScraperError::Config(format!("Invalid year {last}")))?;
        Self::new(start, end)
    }

    /// The `days` days before `today`, plus today.
    pub fn last_days(today: NaiveDate, days: u32) -> Result<Self> {
        let start = today
            .checked_sub_signed(ChronoDuration::days(i64::from(days)))
            .ok_or_else(|| ScraperError::Config(format!("Cannot go back {days} days")))?;
        Self::new(start, today)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// A validated range always holds at least one day.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Outcome counts for one scrape run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dates_attempted: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub malformed: usize,
    pub shows_ingested: usize,
    pub stopped_early: bool,
    /// (date, reason) for every failed or malformed pair
    pub failures: Vec<(String, String)>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn success_rate(&self) -> f64 {
        if self.dates_attempted == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.dates_attempted as f64 * 100.0
    }
}

/// Sequential fetch -> parse -> ingest driver over a date range. Stops
/// between pairs when the run timeout elapses or the stop flag is raised;
/// whatever was ingested so far is still returned.
pub struct ScrapeRun {
    fetcher: LineupFetcher,
    parser: LineupParser,
    aggregator: Aggregator,
    venue: VenueSelector,
    max_runtime: Option<Duration>,
    stop: Arc<AtomicBool>,
}

impl ScrapeRun {
    pub fn new(fetcher: LineupFetcher, venue: VenueSelector) -> Self {
        Self {
            fetcher,
            parser: LineupParser::new(),
            aggregator: Aggregator::new(),
            venue,
            max_runtime: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_max_runtime(mut self, max_runtime: Option<Duration>) -> Self {
        self.max_runtime = max_runtime;
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[instrument(skip(self), fields(start = %range.start, end = %range.end, venue = %self.venue))]
    pub async fn run(mut self, range: &DateRange) -> Result<(Snapshot, RunReport)> {
        let t0 = Instant::now();
        let total = range.len();
        let mut report = RunReport::default();
        info!("Scraping {} dates from {} to {}", total, range.start, range.end);

        for date in range.iter() {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Stop requested, ending run after {} dates", report.dates_attempted);
                report.stopped_early = true;
                break;
            }
            if let Some(limit) = self.max_runtime {
                if t0.elapsed() >= limit {
                    warn!("Run timeout of {:?} reached, ending early", limit);
                    report.stopped_early = true;
                    break;
                }
            }

            report.dates_attempted += 1;
            match self.fetcher.fetch(date, self.venue).await {
                FetchOutcome::Fetched(payload) => match self.parser.parse(&payload) {
                    Ok(shows) if shows.is_empty() => report.empty += 1,
                    Ok(shows) => {
                        report.succeeded += 1;
                        report.shows_ingested += shows.len();
                        for show in shows {
                            self.aggregator.ingest_at(show, payload.sequence);
                        }
                    }
                    Err(e) => {
                        warn!("Skipping malformed payload for {}: {}", date, e);
                        report.malformed += 1;
                        report.failures.push((date.to_string(), e.to_string()));
                    }
                },
                FetchOutcome::Failed { reason, .. } => {
                    if report.dates_attempted == 1 {
                        if let FetchFailure::Network(message) = &reason {
                            error!("First request failed, venue API looks unreachable");
                            return Err(ScraperError::Unreachable(message.clone()));
                        }
                    }
                    report.failed += 1;
                    report.failures.push((date.to_string(), reason.to_string()));
                }
            }

            if report.dates_attempted % 100 == 0 {
                info!(
                    "Progress: {}/{} dates ({:.1}%), {} shows so far, through {}-{:02}",
                    report.dates_attempted,
                    total,
                    report.dates_attempted as f64 / total as f64 * 100.0,
                    self.aggregator.len(),
                    date.year(),
                    date.month()
                );
            }
        }

        report.elapsed_secs = t0.elapsed().as_secs_f64();
        histogram!("lineup_run_duration_seconds").record(report.elapsed_secs);
        counter!("lineup_runs_total").increment(1);
        info!(
            "Run finished: {} attempted, {} with shows, {} empty, {} failed, {} malformed",
            report.dates_attempted, report.succeeded, report.empty, report.failed, report.malformed
        );
        Ok((self.aggregator.snapshot(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VenueApiConfig;
    use crate::ingestion::rate_limiter::{PacingConfig, RateController};
    use crate::ingestion::retry::RetryPolicy;
    use crate::ingestion::transport::{LineupTransport, TransportResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct QueuedTransport {
        replies: Mutex<VecDeque<Result<TransportResponse>>>,
    }

    #[async_trait]
    impl LineupTransport for QueuedTransport {
        async fn post_form(&self, _url: &str, _form: &[(String, String)]) -> Result<TransportResponse> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(body(r#"{"show": null}"#)))
        }
    }

    fn body(text: &str) -> TransportResponse {
        TransportResponse {
            status: 200,
            body: text.to_string(),
        }
    }

    fn run_with(replies: Vec<Result<TransportResponse>>) -> ScrapeRun {
        let transport = Arc::new(QueuedTransport {
            replies: Mutex::new(replies.into()),
        });
        let fetcher = LineupFetcher::new(
            transport,
            RateController::new(PacingConfig::unpaced()),
            RetryPolicy::immediate(1),
            &VenueApiConfig::default(),
        );
        ScrapeRun::new(fetcher, VenueSelector::NewYork)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    const ONE_SHOW: &str = r#"{"show": {"html": "<div class=\"set-header\"><span class=\"bold\">9:30pm show</span><span class=\"title\">MacDougal Street</span><span class=\"lineup-toggle\" data-lineup-id=\"1\"></span></div><div data-set-content=\"1\"><div class=\"set-content\"><p><span class=\"name\">Ari Shaffir</span> Host</p></div></div>"}}"#;

    #[test]
    fn date_range_is_inclusive() {
        let range = DateRange::new(d(2024, 2, 27), d(2024, 3, 1)).unwrap();
        let days: Vec<_> = range.iter().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(range.len(), 4);
        assert_eq!(days[2], d(2024, 2, 29));
        assert_eq!(days[3], d(2024, 3, 1));
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        assert!(DateRange::new(d(2024, 3, 1), d(2024, 2, 1)).is_err());
    }

    #[test]
    fn year_and_trailing_ranges() {
        let range = DateRange::years(2023, 2024).unwrap();
        assert_eq!(range.start, d(2023, 1, 1));
        assert_eq!(range.end, d(2024, 12, 31));

        let recent = DateRange::last_days(d(2024, 12, 31), 30).unwrap();
        assert_eq!(recent.start, d(2024, 12, 1));
        assert_eq!(recent.len(), 31);
    }

    #[tokio::test]
    async fn run_counts_each_outcome() {
        let run = run_with(vec![
            Ok(body(ONE_SHOW)),
            Ok(body(r#"{"show": {"html": ""}}"#)),
            Ok(TransportResponse {
                status: 404,
                body: String::new(),
            }),
            Ok(body(r#"{"show": "oops"}"#)),
        ]);
        let range = DateRange::new(d(2024, 5, 1), d(2024, 5, 4)).unwrap();
        let (snapshot, report) = run.run(&range).await.unwrap();

        assert_eq!(report.dates_attempted, 4);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.empty, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(snapshot.shows.len(), 1);
        assert_eq!(snapshot.appearances[0].comedian_name, "Ari Shaffir");
    }

    #[tokio::test]
    async fn first_network_failure_is_fatal() {
        let run = run_with(vec![Err(ScraperError::Network {
            message: "connection refused".into(),
        })]);
        let range = DateRange::new(d(2024, 5, 1), d(2024, 5, 2)).unwrap();
        let err = run.run(&range).await.unwrap_err();
        assert!(matches!(err, ScraperError::Unreachable(_)));
    }

    #[tokio::test]
    async fn later_network_failures_are_contained() {
        let run = run_with(vec![
            Ok(body(ONE_SHOW)),
            Err(ScraperError::Network {
                message: "reset".into(),
            }),
        ]);
        let range = DateRange::new(d(2024, 5, 1), d(2024, 5, 3)).unwrap();
        let (_, report) = run.run(&range).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.empty, 1);
    }

    #[tokio::test]
    async fn stop_flag_ends_run_early() {
        let run = run_with(vec![]);
        run.stop_flag().store(true, Ordering::SeqCst);
        let range = DateRange::new(d(2024, 5, 1), d(2024, 5, 10)).unwrap();
        let (snapshot, report) = run.run(&range).await.unwrap();
        assert!(report.stopped_early);
        assert_eq!(report.dates_attempted, 0);
        assert!(snapshot.shows.is_empty());
    }
}
