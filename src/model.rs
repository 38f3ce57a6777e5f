use chrono::NaiveDate;
use std::path::PathBuf;

/// One entry enumerated from a date index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleEntry {
    pub title: String,
    pub detail_url: String,
}

/// Fields recovered from a detail page. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub more_info_link: Option<String>,
    pub deadline: Option<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub organizer: Option<String>,
    pub location: Option<String>,
    pub eligibility: Option<String>,
    pub benefits: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub title: String,
    pub link: String,
    pub deadline: Option<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub organizer: Option<String>,
    pub location: Option<String>,
    pub eligibility: Option<String>,
    pub benefits: Option<String>,
    pub category: Option<String>,
    /// Page the record was scraped from; not part of the stored schema.
    pub detail_url: String,
}

impl Opportunity {
    /// Combines the index entry with whatever the detail page yielded. The
    /// link falls back to the detail page itself when no apply link was found.
    pub fn from_detail(entry: ArticleEntry, fields: DetailFields) -> Self {
        let link = fields
            .more_info_link
            .filter(|link| !link.trim().is_empty())
            .unwrap_or_else(|| entry.detail_url.clone());

        Self {
            title: entry.title,
            link,
            deadline: fields.deadline,
            thumbnail: fields.thumbnail,
            description: fields.description,
            tags: fields.tags,
            organizer: fields.organizer,
            location: fields.location,
            eligibility: fields.eligibility,
            benefits: fields.benefits,
            category: fields.category,
            detail_url: entry.detail_url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    Duplicate,
    StoreError,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub target_date: Option<NaiveDate>,
    pub articles_found: usize,
    pub processed: usize,
    pub detail_failures: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub store_errors: usize,
    pub csv_path: Option<PathBuf>,
    pub marker_updated: bool,
}

impl RunReport {
    pub fn record_outcome(&mut self, outcome: PersistOutcome) {
        match outcome {
            PersistOutcome::Inserted => self.inserted += 1,
            PersistOutcome::Duplicate => self.duplicates += 1,
            PersistOutcome::StoreError => self.store_errors += 1,
        }
    }

    pub fn persisted(&self) -> usize {
        self.inserted
    }
}
