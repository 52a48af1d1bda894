use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use lineup_scraper::config::VenueApiConfig;
use lineup_scraper::enrich::{
    EnrichmentStage, ProfileCandidate, ProfileLookup, ENRICHED_HEADERS,
};
use lineup_scraper::error::Result as ScraperResult;
use lineup_scraper::export;
use lineup_scraper::idempotency::compute_show_id;
use lineup_scraper::ingestion::{
    LineupFetcher, LineupTransport, PacingConfig, RateController, RetryPolicy, TransportResponse,
};
use lineup_scraper::pipeline::{DateRange, ScrapeRun};
use lineup_scraper::aggregate::Aggregator;
use lineup_scraper::parser::LineupParser;
use lineup_scraper::types::{RawPayload, VenueSelector};

const LINEUP_HTML: &str = r#"
<div class="set-header">
    <span class="bold">8:00pm show</span>
    <span class="title">Village Underground</span>
    <span class="lineup-toggle" data-lineup-id="7"></span>
</div>
<div data-set-content="7">
    <div class="set-content"><p><span class="name">A</span> Opener</p></div>
    <div class="set-content"><p><span class="name">B</span> Closer</p></div>
</div>
<div class="set-header">
    <span class="bold">10:00pm show</span>
    <span class="title">Village Underground</span>
    <span class="lineup-toggle" data-lineup-id="8"></span>
</div>
<div data-set-content="8">
    <div class="set-content"><p><span class="name">C</span></p></div>
</div>
"#;

struct CannedTransport {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<(String, String)>>>,
}

impl CannedTransport {
    fn new(bodies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(bodies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LineupTransport for CannedTransport {
    async fn post_form(
        &self,
        _url: &str,
        form: &[(String, String)],
    ) -> ScraperResult<TransportResponse> {
        self.requests.lock().unwrap().push(form.to_vec());
        let body = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| json!({"show": null}).to_string());
        Ok(TransportResponse { status: 200, body })
    }
}

struct CountingLookup {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ProfileLookup for CountingLookup {
    async fn lookup(&self, name: &str) -> ScraperResult<Vec<ProfileCandidate>> {
        self.calls.lock().unwrap().push(name.to_string());
        if name == "C" {
            return Ok(Vec::new());
        }
        Ok(vec![ProfileCandidate {
            handle: format!("{}_comic", name.to_lowercase()),
            display_name: format!("{name} Comedy"),
            bio_snippet: format!("{name} is a stand-up comedian. Verified"),
            follower_count: Some(12_000),
        }])
    }
}

fn scrape_run(transport: Arc<CannedTransport>) -> ScrapeRun {
    let fetcher = LineupFetcher::new(
        transport,
        RateController::new(PacingConfig::unpaced()),
        RetryPolicy::immediate(2),
        &VenueApiConfig::default(),
    );
    ScrapeRun::new(fetcher, VenueSelector::NewYork)
}

fn december_7() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 7).unwrap()
}

#[tokio::test]
async fn single_date_scrape_exports_shows_and_appearances() -> Result<()> {
    let transport = CannedTransport::new(vec![json!({"show": {"html": LINEUP_HTML}}).to_string()]);
    let range = DateRange::new(december_7(), december_7())?;
    let (snapshot, report) = scrape_run(transport.clone()).run(&range).await?;

    assert_eq!(report.dates_attempted, 1);
    assert_eq!(report.succeeded, 1);

    let requests = transport.requests.lock().unwrap();
    let payload: serde_json::Value = serde_json::from_str(&requests[0][1].1)?;
    assert_eq!(payload["date"], "2024-12-07");
    assert_eq!(payload["venue"], "newyork");
    drop(requests);

    let scraped_at = Local.with_ymd_and_hms(2024, 12, 8, 9, 30, 0).unwrap();
    let tables = export::export(&snapshot, scraped_at);

    assert_eq!(tables.shows.len(), 2);
    assert_eq!(tables.shows[0].time, "8:00pm");
    assert_eq!(tables.shows[0].comedian_count, 2);
    assert_eq!(tables.shows[0].comedians, "A; B");
    assert_eq!(tables.shows[1].time, "10:00pm");
    assert_eq!(tables.shows[1].comedian_count, 1);
    assert_eq!(
        tables.shows[0].show_id,
        compute_show_id(december_7(), "8:00pm", "Village Underground")
    );

    let orders: Vec<usize> = tables.appearances.iter().map(|a| a.order).collect();
    assert_eq!(orders, [1, 2, 1]);
    assert_eq!(tables.summary.total_shows, 2);
    assert_eq!(tables.summary.total_comedian_appearances, 3);
    assert_eq!(tables.summary.unique_dates_with_shows, 1);
    assert_eq!(tables.summary.scrape_date, "2024-12-08 09:30:00");

    for show in &tables.shows {
        assert_eq!(show.comedian_count, show.comedians.split(';').count());
    }
    Ok(())
}

#[tokio::test]
async fn consecutive_dates_get_distinct_show_ids() -> Result<()> {
    let body = json!({"show": {"html": LINEUP_HTML}}).to_string();
    let transport = CannedTransport::new(vec![body.clone(), body]);
    let day = december_7();
    let next = day.succ_opt().unwrap();

    // Same markup on both dates; show identity includes the date.
    let range = DateRange::new(day, next)?;
    let (snapshot, _) = scrape_run(transport).run(&range).await?;
    assert_eq!(snapshot.shows.len(), 4);

    let mut ids: Vec<&str> = snapshot.shows.iter().map(|s| s.show_id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    Ok(())
}

#[test]
fn same_payload_ingested_twice_does_not_duplicate_rows() -> Result<()> {
    let payload = RawPayload {
        date: december_7(),
        venue: VenueSelector::NewYork,
        body: json!({"show": {"html": LINEUP_HTML}}),
        sequence: 1,
    };
    let parser = LineupParser::new();
    let mut aggregator = Aggregator::new();

    for show in parser.parse(&payload)? {
        aggregator.ingest_at(show, 1);
    }
    let first = export::export(&aggregator.snapshot(), Local::now());

    for show in parser.parse(&payload)? {
        aggregator.ingest_at(show, 2);
    }
    let second = export::export(&aggregator.snapshot(), Local::now());

    assert_eq!(second.shows.len(), 2);
    assert_eq!(second.appearances.len(), 3);
    assert_eq!(first.shows, second.shows);
    assert_eq!(first.appearances, second.appearances);
    Ok(())
}

#[tokio::test]
async fn header_without_lineup_never_reaches_the_export() -> Result<()> {
    let html = r#"
        <div class="set-header">
            <span class="bold">7:00pm show</span>
            <span class="title">Village Underground</span>
            <span class="lineup-toggle" data-lineup-id="9"></span>
        </div>
        <div class="set-header">
            <span class="bold">9:00pm show</span>
            <span class="title">Village Underground</span>
            <span class="lineup-toggle" data-lineup-id="10"></span>
        </div>
        <div data-set-content="10">
            <div class="set-content"><p><span class="name">D</span></p></div>
        </div>
    "#;
    let transport = CannedTransport::new(vec![json!({"show": {"html": html}}).to_string()]);
    let range = DateRange::new(december_7(), december_7())?;
    let (snapshot, _) = scrape_run(transport).run(&range).await?;

    let tables = export::export(&snapshot, Local::now());
    assert_eq!(tables.shows.len(), 1);
    for show in &tables.shows {
        assert!(show.comedian_count > 0);
        assert_eq!(show.comedian_count, show.comedians.split(';').count());
    }
    Ok(())
}

#[tokio::test]
async fn csv_export_then_enrichment() -> Result<()> {
    let dir = tempdir()?;
    let transport = CannedTransport::new(vec![json!({"show": {"html": LINEUP_HTML}}).to_string()]);
    let range = DateRange::new(december_7(), december_7())?;
    let (snapshot, _) = scrape_run(transport).run(&range).await?;

    let tables = export::export(&snapshot, Local::now());
    let paths = export::write_csv(&tables, dir.path(), "lineups_test")?;
    assert!(paths.shows.ends_with("lineups_test_shows.csv"));
    assert!(paths.summary.exists());
    assert_eq!(
        export::find_latest_appearances(dir.path())?.as_deref(),
        Some(paths.appearances.as_path())
    );

    let rows = export::read_appearances(&paths.appearances)?;
    assert_eq!(rows, tables.appearances);

    let lookup = Arc::new(CountingLookup {
        calls: Mutex::new(Vec::new()),
    });
    let mut stage = EnrichmentStage::new(
        lookup.clone(),
        RetryPolicy::immediate(1),
        PacingConfig::unpaced(),
        2,
    );
    let report = stage.enrich(rows).await;

    let mut calls = lookup.calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, ["A", "B", "C"]);
    assert_eq!(report.summary.resolved, 2);
    assert_eq!(report.summary.not_found, 1);
    assert_eq!(report.rows[0].handle, "a_comic");
    assert_eq!(report.rows[2].enrichment_status, "not_found");
    assert_eq!(report.rows[2].follower_count, None);
    assert_eq!(report.rows[0].profile_url, "https://www.instagram.com/a_comic/");
    assert_eq!(report.rows[0].followers_text, "12.0K");
    assert_eq!(report.profiles.len(), 3);
    assert_eq!(report.summary.names_with_followers, 2);

    let enriched = dir.path().join("enriched.csv");
    export::write_table(&enriched, &ENRICHED_HEADERS, &report.rows)?;
    let text = std::fs::read_to_string(&enriched)?;
    assert!(text.starts_with(&ENRICHED_HEADERS.join(",")));
    assert_eq!(text.lines().count(), 4);
    Ok(())
}

#[tokio::test]
async fn empty_range_still_writes_headers() -> Result<()> {
    let dir = tempdir()?;
    let transport = CannedTransport::new(vec![]);
    let range = DateRange::new(december_7(), december_7())?;
    let (snapshot, report) = scrape_run(transport).run(&range).await?;
    assert_eq!(report.empty, 1);

    let tables = export::export(&snapshot, Local::now());
    let paths = export::write_csv(&tables, dir.path(), "empty")?;
    let shows = std::fs::read_to_string(&paths.shows)?;
    assert_eq!(shows.trim(), "show_id,date,time,venue,comedian_count,comedians");
    Ok(())
}
