use crate::model::Opportunity;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const TAG_SEPARATOR: &str = ", ";

#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    link: &'a str,
    deadline: Option<&'a str>,
    thumbnail: Option<&'a str>,
    description: Option<&'a str>,
    tags: String,
    organizer: Option<&'a str>,
    location: Option<&'a str>,
    eligibility: Option<&'a str>,
    benefits: Option<&'a str>,
    category: Option<&'a str>,
}

impl<'a> From<&'a Opportunity> for CsvRow<'a> {
    fn from(record: &'a Opportunity) -> Self {
        Self {
            title: &record.title,
            link: &record.link,
            deadline: record.deadline.as_deref(),
            thumbnail: record.thumbnail.as_deref(),
            description: record.description.as_deref(),
            tags: record.tags.join(TAG_SEPARATOR),
            organizer: record.organizer.as_deref(),
            location: record.location.as_deref(),
            eligibility: record.eligibility.as_deref(),
            benefits: record.benefits.as_deref(),
            category: record.category.as_deref(),
        }
    }
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("opportunities_{}.csv", date.format("%Y-%m-%d"))
}

/// Writes every record of the run to `<dir>/opportunities_YYYY-MM-DD.csv`,
/// replacing any earlier backup for the same date.
pub fn write_csv_backup(dir: &Path, date: NaiveDate, records: &[Opportunity]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;

    let path = dir.join(backup_file_name(date));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    for record in records {
        writer
            .serialize(CsvRow::from(record))
            .with_context(|| format!("failed to write row for {}", record.title))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    Ok(path)
}
