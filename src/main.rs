use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use lineup_scraper::config::{ScraperConfig, SearchCredentials};
use lineup_scraper::constants::default_base_name;
use lineup_scraper::enrich::followers::format_count;
use lineup_scraper::enrich::{
    self, EnrichedAppearanceRow, EnrichmentReport, EnrichmentStage, SearchProfileLookup,
};
use lineup_scraper::export::{self, AppearanceRow, ExportPaths};
use lineup_scraper::ingestion::{LineupFetcher, RateController, ReqwestTransport};
use lineup_scraper::logging;
use lineup_scraper::pipeline::{DateRange, RunReport, ScrapeRun};
use lineup_scraper::types::VenueSelector;

#[derive(Parser)]
#[command(name = "lineup_scraper")]
#[command(about = "Comedy club lineup scraper with social profile enrichment")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file (defaults to lineup.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape lineups for a date range and export CSV tables
    Scrape(ScrapeArgs),
    /// Enrich an exported appearances table with profile handles and follower counts
    Enrich(EnrichArgs),
    /// Scrape, then enrich the fresh appearances table
    Run {
        #[command(flatten)]
        scrape: ScrapeArgs,
        /// Parallel lookup workers
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(Args)]
struct ScrapeArgs {
    /// First date to scrape (YYYY-MM-DD)
    #[arg(long, requires = "end", conflicts_with_all = ["year", "last_days"])]
    start: Option<NaiveDate>,
    /// Last date to scrape, inclusive (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,
    /// Scrape a whole calendar year
    #[arg(long, conflicts_with = "last_days")]
    year: Option<i32>,
    /// Scrape the trailing N days up to today
    #[arg(long)]
    last_days: Option<u32>,
    /// Venue selector: newyork or all
    #[arg(long, default_value = "newyork")]
    venue: VenueSelector,
    /// Output directory (overrides config)
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Base name for the CSV files (default lineups_<timestamp>)
    #[arg(long)]
    base_name: Option<String>,
    /// Stop fetching after this many seconds and export what was collected
    #[arg(long)]
    max_runtime_secs: Option<u64>,
}

#[derive(Args)]
struct EnrichArgs {
    /// Appearances CSV to enrich
    #[arg(long, conflicts_with = "latest")]
    input: Option<PathBuf>,
    /// Use the newest *_comedians.csv in the output directory
    #[arg(long)]
    latest: bool,
    /// Enriched CSV path (default: <input>_enriched.csv)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Parallel lookup workers
    #[arg(long)]
    workers: Option<usize>,
}

impl ScrapeArgs {
    fn date_range(&self) -> anyhow::Result<DateRange> {
        let today = Local::now().date_naive();
        let range = match (self.start, self.end, self.year, self.last_days) {
            (Some(start), Some(end), _, _) => DateRange::new(start, end)?,
            (_, _, Some(year), _) => DateRange::years(year, year)?,
            (_, _, _, Some(days)) => DateRange::last_days(today, days)?,
            _ => bail!("Provide --start/--end, --year or --last-days"),
        };
        Ok(range)
    }

    fn output_dir(&self, config: &ScraperConfig) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.output.dir))
    }
}

async fn scrape(
    config: &ScraperConfig,
    args: &ScrapeArgs,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<ExportPaths> {
    let range = args.date_range()?;
    let transport = Arc::new(ReqwestTransport::new(&config.venue_api)?);
    let fetcher = LineupFetcher::new(
        transport,
        RateController::new(config.pacing.to_pacing()),
        config.retry.to_policy(),
        &config.venue_api,
    );

    let (snapshot, report) = ScrapeRun::new(fetcher, args.venue)
        .with_max_runtime(args.max_runtime_secs.map(Duration::from_secs))
        .with_stop_flag(stop)
        .run(&range)
        .await
        .context("Scrape run aborted")?;
    print_run_report(&report);

    let now = Local::now();
    let tables = export::export(&snapshot, now);
    let base_name = args
        .base_name
        .clone()
        .unwrap_or_else(|| default_base_name(now));
    let paths = export::write_csv(&tables, &args.output_dir(config), &base_name)?;

    println!("\n📁 Files written:");
    println!("   Shows:       {}", paths.shows.display());
    println!("   Appearances: {}", paths.appearances.display());
    println!("   Summary:     {}", paths.summary.display());
    println!(
        "   {} shows, {} appearances, {} unique comedians",
        tables.summary.total_shows,
        tables.summary.total_comedian_appearances,
        tables.summary.unique_comedians
    );
    Ok(paths)
}

fn print_run_report(report: &RunReport) {
    println!("\n📊 Scrape Results:");
    println!("   Dates attempted: {}", report.dates_attempted);
    println!("   With shows:      {}", report.succeeded);
    println!("   Empty:           {}", report.empty);
    println!("   Failed:          {}", report.failed);
    println!("   Malformed:       {}", report.malformed);
    println!("   Success rate:    {:.1}%", report.success_rate());
    println!("   Elapsed:         {:.1}s", report.elapsed_secs);
    if report.stopped_early {
        println!("   ⚠️  Run ended early; partial results exported");
    }
    if !report.failures.is_empty() {
        warn!("{} dates failed during the run", report.failures.len());
        println!("\n⚠️  Failures:");
        for (date, reason) in report.failures.iter().take(20) {
            println!("   - {}: {}", date, reason);
        }
        if report.failures.len() > 20 {
            println!("   ... and {} more", report.failures.len() - 20);
        }
    }
}

async fn run_enrichment(
    config: &ScraperConfig,
    credentials: SearchCredentials,
    input: &Path,
    output: Option<PathBuf>,
    workers: Option<usize>,
) -> anyhow::Result<PathBuf> {
    info!("Using search credentials {:?}", credentials);
    let lookup = Arc::new(SearchProfileLookup::new(&config.enrichment, credentials)?);

    let rows: Vec<AppearanceRow> = export::read_appearances(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    info!("Loaded {} appearance rows from {}", rows.len(), input.display());

    let mut stage = EnrichmentStage::new(
        lookup,
        config.retry.to_policy(),
        config.enrichment.to_pacing(),
        workers.unwrap_or(config.enrichment.workers),
    );
    let report = stage.enrich(rows).await;

    let (default_enriched, profiles) = export::enrichment_paths(input);
    let output = output.unwrap_or(default_enriched);
    enrich::write_report(&report, &output, &profiles)?;
    print_enrichment_report(&report);
    println!("\n📁 Enriched data saved to: {}", output.display());
    println!("📁 Comedian profiles saved to: {}", profiles.display());
    Ok(output)
}

fn print_enrichment_report(report: &EnrichmentReport) {
    let s = &report.summary;
    println!("\n📊 Enrichment Statistics:");
    println!("   Total appearances:        {}", s.total_appearances);
    println!("   Appearances with handle:  {}", s.appearances_with_handle);
    println!("   Unique comedians:         {}", s.distinct_names);
    println!("   Resolved:                 {}", s.resolved);
    println!("   Not found:                {}", s.not_found);
    println!("   Ambiguous:                {}", s.ambiguous);
    println!("   Lookup failures:          {}", s.unqueried);
    println!("   External lookups:         {}", s.lookup_calls);
    println!("   Discovery rate:           {:.1}%", s.discovery_rate);
    println!("   With follower counts:     {}", s.names_with_followers);
    if s.names_with_followers > 0 {
        println!(
            "   Average followers:        {}",
            format_count(s.average_followers.round() as u64)
        );
    }

    let mut top: Vec<&EnrichedAppearanceRow> = Vec::new();
    for row in report.rows.iter().filter(|r| r.follower_count.is_some()) {
        if !top.iter().any(|t| t.comedian_name == row.comedian_name) {
            top.push(row);
        }
    }
    top.sort_by(|a, b| b.follower_count.cmp(&a.follower_count));
    if !top.is_empty() {
        println!("\n🏆 Top comedians by followers:");
        for (i, row) in top.iter().take(10).enumerate() {
            println!(
                "   {:2}. {} (@{}) - {}",
                i + 1,
                row.comedian_name,
                row.handle,
                format_count(row.follower_count.unwrap_or_default())
            );
        }
    }
}

fn resolve_enrich_input(config: &ScraperConfig, args: &EnrichArgs) -> anyhow::Result<PathBuf> {
    if let Some(input) = &args.input {
        return Ok(input.clone());
    }
    if args.latest {
        let dir = PathBuf::from(&config.output.dir);
        return export::find_latest_appearances(&dir)?
            .with_context(|| format!("No *_comedians.csv files found in {}", dir.display()));
    }
    bail!("Provide --input <file> or --latest")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    let config = ScraperConfig::load(cli.config.as_deref())?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current date and exporting");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    match cli.command {
        Commands::Scrape(args) => {
            println!("🎭 Scraping lineups...");
            scrape(&config, &args, stop).await?;
        }
        Commands::Enrich(args) => {
            println!("📸 Enriching appearances with profile data...");
            let credentials = SearchCredentials::from_env()?;
            let input = resolve_enrich_input(&config, &args)?;
            run_enrichment(&config, credentials, &input, args.output, args.workers).await?;
        }
        Commands::Run { scrape: args, workers } => {
            // Checked up front so a long scrape is not wasted on missing keys.
            let credentials = SearchCredentials::from_env()?;
            println!("🚀 Running full pipeline (scrape + enrich)...");
            println!("\n📥 Step 1: Scraping...");
            let paths = scrape(&config, &args, stop).await?;

            println!("\n📸 Step 2: Enriching...");
            run_enrichment(&config, credentials, &paths.appearances, None, workers)
                .await
                .with_context(|| {
                    format!(
                        "Enrichment failed; scrape output is at {}",
                        paths.appearances.display()
                    )
                })?;
        }
    }
    Ok(())
}
