use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::Parser;
use oppscrape::config::{StoreCredentials, load_config};
use oppscrape::fetch::{Fetcher, ReqwestTransport};
use oppscrape::pipeline::{ScrapeOptions, parse_target_date, resolve_target_date, run_scrape};
use oppscrape::store::{OpportunityStore, connect_store};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "oppscrape",
    about = "Collect opportunity listings published on a given day"
)]
struct Cli {
    /// Publication date to scrape, YYYY/MM/DD. Defaults to yesterday.
    #[arg(value_name = "DATE", value_parser = parse_date_arg)]
    date: Option<NaiveDate>,
}

fn parse_date_arg(text: &str) -> Result<NaiveDate, String> {
    parse_target_date(text).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let config = load_config()?;
    let target_date = match cli.date {
        Some(date) => date,
        None => resolve_target_date(None, Local::now().date_naive())?,
    };

    let transport = ReqwestTransport::new(Duration::from_secs(config.fetch.timeout_secs))?;
    let mut fetcher = Fetcher::new(transport, config.fetch.clone());

    let store = connect_store(StoreCredentials::from_env(&config.store), &config.store);

    let options = ScrapeOptions::from_config(&config, target_date);
    let report = run_scrape(
        &mut fetcher,
        store.as_ref().map(|s| s as &dyn OpportunityStore),
        &options,
    )?;

    info!(
        date = %target_date,
        found = report.articles_found,
        processed = report.processed,
        persisted = report.persisted(),
        duplicates = report.duplicates,
        store_errors = report.store_errors,
        detail_failures = report.detail_failures,
        skipped = report.skipped,
        csv = %report.csv_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        "scrape summary"
    );

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
