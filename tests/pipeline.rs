mod common;

use chrono::NaiveDate;
use common::{RecordingPause, ScriptedTransport, fetcher, fixture};
use oppscrape::config::DedupMode;
use oppscrape::pipeline::{ScrapeOptions, run_scrape};
use oppscrape::store::{MemoryStore, OpportunityStore};
use std::path::Path;

const BASE: &str = "https://opportunitydesk.org";
const INDEX: &str = "https://opportunitydesk.org/2024/03/15/";
const DETAIL: &str = "https://opportunitydesk.org/2024/03/15/youth-innovation-grant/";
const MARKER: &str = "last_scrape_date";

fn options(output_dir: &Path) -> ScrapeOptions {
    ScrapeOptions {
        base_url: BASE.to_string(),
        target_date: NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date"),
        output_dir: output_dir.to_path_buf(),
        dedup: DedupMode::Title,
        last_run_key: MARKER.to_string(),
    }
}

fn happy_site() -> ScriptedTransport {
    ScriptedTransport::new()
        .page(INDEX, &fixture("index_2024_03_15.html"))
        .page(DETAIL, &fixture("detail_youth_innovation_grant.html"))
}

#[test]
fn full_run_stores_and_backs_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::new();
    let pause = RecordingPause::default();
    let mut fetcher = fetcher(happy_site(), &pause);

    let report = run_scrape(
        &mut fetcher,
        Some(&store as &dyn OpportunityStore),
        &options(dir.path()),
    )
    .expect("run succeeds");

    assert_eq!(report.articles_found, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.detail_failures, 0);
    assert!(report.marker_updated);

    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.title, "Youth Innovation Grant");
    assert_eq!(row.link, "https://example.org/apply");
    assert_eq!(row.deadline.as_deref(), Some("30th April, 2024"));
    assert_eq!(
        row.thumbnail.as_deref(),
        Some("https://opportunitydesk.org/wp-content/uploads/2024/03/yig.jpg")
    );
    assert_eq!(row.tags, vec!["Grants".to_string(), "Youth".to_string()]);
    assert_eq!(row.organizer.as_deref(), Some("Youth Fund Kenya"));
    assert_eq!(row.location.as_deref(), Some("Kenya"));
    assert!(
        row.description
            .as_deref()
            .is_some_and(|d| d.starts_with("The Youth Innovation Grant"))
    );
    assert!(
        row.eligibility
            .as_deref()
            .is_some_and(|e| e.starts_with("Eligibility:"))
    );
    assert!(row.benefits.as_deref().is_some_and(|b| b.contains("$10,000")));
    assert_eq!(row.category.as_deref(), Some("Category: Social Innovation"));
    assert!(!row.approved);
    assert!(!row.posted_to_telegram);

    assert!(store.setting(MARKER).is_some());

    let csv_path = report.csv_path.expect("csv written");
    assert_eq!(csv_path, dir.path().join("opportunities_2024-03-15.csv"));
    let csv = std::fs::read_to_string(&csv_path).expect("readable csv");
    assert!(csv.starts_with("title,link,deadline,"));
    assert!(csv.contains("Youth Innovation Grant,https://example.org/apply,"));
    assert!(csv.contains("\"Grants, Youth\""));

    let delays = pause.delays();
    assert_eq!(delays.len(), 1);
    assert!((5.0..=10.0).contains(&delays[0].as_secs_f64()));
}

#[test]
fn rerun_reports_duplicate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::new();
    let pause = RecordingPause::default();

    let mut first = fetcher(happy_site(), &pause);
    run_scrape(&mut first, Some(&store), &options(dir.path())).expect("first run");

    let mut second = fetcher(happy_site(), &pause);
    let report = run_scrape(&mut second, Some(&store), &options(dir.path())).expect("second run");

    assert_eq!(report.inserted, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(store.rows().len(), 1);
    assert!(report.csv_path.is_some());
}

#[test]
fn failed_detail_keeps_index_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::new();
    let pause = RecordingPause::default();
    let transport = ScriptedTransport::new().page(INDEX, &fixture("index_2024_03_15.html"));
    let mut fetcher = fetcher(transport, &pause);

    let report = run_scrape(&mut fetcher, Some(&store), &options(dir.path())).expect("run");

    assert_eq!(report.detail_failures, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(fetcher.transport().hits(DETAIL), 5);
    // four backoffs, no politeness pause after a failed detail page
    assert_eq!(pause.delays().len(), 4);

    let row = &store.rows()[0];
    assert_eq!(row.title, "Youth Innovation Grant");
    assert_eq!(row.link, DETAIL);
    assert_eq!(row.deadline, None);
    assert!(row.tags.is_empty());
}

#[test]
fn without_store_only_csv_is_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pause = RecordingPause::default();
    let mut fetcher = fetcher(happy_site(), &pause);

    let report = run_scrape(&mut fetcher, None, &options(dir.path())).expect("run");

    assert_eq!(report.processed, 1);
    assert_eq!(report.persisted(), 0);
    assert!(!report.marker_updated);
    assert!(report.csv_path.is_some_and(|p| p.exists()));
}

#[test]
fn unreachable_store_still_backs_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::offline();
    let pause = RecordingPause::default();
    let mut fetcher = fetcher(happy_site(), &pause);

    let report = run_scrape(&mut fetcher, Some(&store), &options(dir.path())).expect("run");

    assert_eq!(report.store_errors, 1);
    assert_eq!(report.inserted, 0);
    assert!(!report.marker_updated);
    assert!(report.csv_path.is_some_and(|p| p.exists()));
}

#[test]
fn unreachable_index_ends_quietly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::new();
    let pause = RecordingPause::default();
    let mut fetcher = fetcher(ScriptedTransport::new(), &pause);

    let report = run_scrape(&mut fetcher, Some(&store), &options(dir.path())).expect("run");

    assert_eq!(report.articles_found, 0);
    assert_eq!(report.processed, 0);
    assert!(report.csv_path.is_none());
    assert!(!report.marker_updated);
    assert!(store.setting(MARKER).is_none());
    assert!(!dir.path().join("opportunities_2024-03-15.csv").exists());
}
