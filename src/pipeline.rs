use crate::backup::write_csv_backup;
use crate::config::{DedupMode, ScraperConfig};
use crate::fetch::{Fetcher, Transport};
use crate::index::list_articles;
use crate::model::{ArticleEntry, DetailFields, Opportunity, RunReport};
use crate::parser::extract_detail;
use crate::store::{OpportunityStore, persist};
use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, Utc};
use std::path::PathBuf;
use tracing::{info, warn};

pub const DATE_ARG_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub base_url: String,
    pub target_date: NaiveDate,
    pub output_dir: PathBuf,
    pub dedup: DedupMode,
    pub last_run_key: String,
}

impl ScrapeOptions {
    pub fn from_config(config: &ScraperConfig, target_date: NaiveDate) -> Self {
        Self {
            base_url: config.base_url.clone(),
            target_date,
            output_dir: config.output_dir.clone(),
            dedup: config.dedup,
            last_run_key: config.store.last_run_key.clone(),
        }
    }
}

/// Strict `YYYY/MM/DD`: zero-padded fields and a real calendar day.
pub fn parse_target_date(text: &str) -> Result<NaiveDate> {
    let shape_ok = text.len() == 10
        && text.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '/',
            _ => c.is_ascii_digit(),
        });
    if !shape_ok {
        bail!("invalid date {text:?}; expected YYYY/MM/DD");
    }
    NaiveDate::parse_from_str(text, DATE_ARG_FORMAT)
        .with_context(|| format!("invalid date {text:?}; expected YYYY/MM/DD"))
}

/// The explicit date when given, otherwise the day before `today`.
pub fn resolve_target_date(arg: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match arg {
        Some(text) => parse_target_date(text),
        None => today
            .checked_sub_signed(Duration::days(1))
            .context("cannot compute the day before today"),
    }
}

/// One full pass for `options.target_date`: index, detail pages, store, CSV
/// backup, last-run marker. Per-article problems never end the run.
pub fn run_scrape<T: Transport>(
    fetcher: &mut Fetcher<T>,
    store: Option<&dyn OpportunityStore>,
    options: &ScrapeOptions,
) -> Result<RunReport> {
    let mut report = RunReport {
        target_date: Some(options.target_date),
        ..RunReport::default()
    };

    info!(date = %options.target_date, store = store.is_some(), "scrape start");

    let listing = list_articles(fetcher, &options.base_url, options.target_date);
    report.articles_found = listing.entries.len() + listing.skipped;
    report.skipped = listing.skipped;

    let mut records = Vec::with_capacity(listing.entries.len());
    for entry in listing.entries {
        let record = scrape_article(fetcher, entry, &mut report);
        debug_assert!(!record.title.is_empty(), "index entries always carry a title");

        info!(
            title = %record.title,
            link = %record.link,
            deadline = record.deadline.as_deref().unwrap_or("-"),
            tags = %record.tags.join(", "),
            "opportunity extracted"
        );

        if let Some(store) = store {
            report.record_outcome(persist(store, &record, options.dedup));
        }

        report.processed += 1;
        records.push(record);
    }

    if records.is_empty() {
        info!(date = %options.target_date, "no opportunities found");
        return Ok(report);
    }

    let path = write_csv_backup(&options.output_dir, options.target_date, &records)
        .context("failed to write csv backup")?;
    info!(file = %path.display(), records = records.len(), "csv backup written");
    report.csv_path = Some(path);

    if let Some(store) = store {
        let stamp = Utc::now().to_rfc3339();
        match store.upsert_setting(&options.last_run_key, &stamp) {
            Ok(()) => {
                report.marker_updated = true;
                info!(key = %options.last_run_key, "last scrape date updated");
            }
            Err(err) => {
                warn!(key = %options.last_run_key, error = %format!("{err:#}"), "failed to update last scrape date");
            }
        }
    }

    Ok(report)
}

/// A failed detail fetch still yields a record: the known title and the
/// detail URL as its link.
fn scrape_article<T: Transport>(
    fetcher: &mut Fetcher<T>,
    entry: ArticleEntry,
    report: &mut RunReport,
) -> Opportunity {
    let fields = match fetcher.fetch(&entry.detail_url) {
        Ok(page) => {
            let fields = extract_detail(&page.body, &page.url);
            fetcher.politeness_delay();
            fields
        }
        Err(err) => {
            warn!(title = %entry.title, error = %err, "detail fetch failed; keeping index data only");
            report.detail_failures += 1;
            DetailFields::default()
        }
    };

    Opportunity::from_detail(entry, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn explicit_date_is_used() {
        let date = resolve_target_date(Some("2024/03/15"), day(2030, 1, 1)).expect("valid");
        assert_eq!(date, day(2024, 3, 15));
    }

    #[test]
    fn default_is_yesterday() {
        assert_eq!(
            resolve_target_date(None, day(2024, 3, 1)).expect("valid"),
            day(2024, 2, 29)
        );
        assert_eq!(
            resolve_target_date(None, day(2025, 1, 1)).expect("valid"),
            day(2024, 12, 31)
        );
    }

    #[test]
    fn rejects_malformed_dates() {
        for bad in [
            "2024-03-15",
            "2024/3/15",
            "15/03/2024",
            "2024/02/30",
            "2024/13/01",
            "2024/03/15/",
            "yesterday",
            "",
        ] {
            assert!(parse_target_date(bad).is_err(), "{bad} should be rejected");
        }
    }
}
