use crate::config::{DedupMode, StoreConfig, StoreCredentials};
use crate::model::{Opportunity, PersistOutcome};
use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

/// What a candidate is matched on before insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    pub title: String,
    pub link: Option<String>,
}

impl DedupKey {
    pub fn for_record(record: &Opportunity, mode: DedupMode) -> Self {
        Self {
            title: record.title.clone(),
            link: match mode {
                DedupMode::Title => None,
                DedupMode::TitleAndLink => Some(record.link.clone()),
            },
        }
    }

    pub fn matches(&self, row: &OpportunityRow) -> bool {
        row.title == self.title && self.link.as_ref().is_none_or(|link| *link == row.link)
    }
}

/// A record as handed to a store, moderation flags included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunityRow {
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
    pub approved: bool,
    pub posted_to_telegram: bool,
}

impl OpportunityRow {
    /// New rows wait for moderation and have not been published anywhere.
    pub fn pending(record: &Opportunity) -> Self {
        Self {
            title: record.title.clone(),
            link: record.link.clone(),
            deadline: record.deadline.clone(),
            thumbnail: record.thumbnail.clone(),
            description: record.description.clone(),
            tags: record.tags.clone(),
            organizer: record.organizer.clone(),
            location: record.location.clone(),
            eligibility: record.eligibility.clone(),
            benefits: record.benefits.clone(),
            category: record.category.clone(),
            approved: false,
            posted_to_telegram: false,
        }
    }

    /// Body of a table insert. The base table only has the listing columns;
    /// the extracted extras are sent when `extended` is set.
    pub fn insert_body(&self, extended: bool) -> InsertBody<'_> {
        InsertBody {
            title: &self.title,
            link: &self.link,
            deadline: self.deadline.as_deref(),
            thumbnail: self.thumbnail.as_deref(),
            description: self.description.as_deref(),
            tags: &self.tags,
            approved: self.approved,
            posted_to_telegram: self.posted_to_telegram,
            extended: extended.then(|| ExtendedColumns {
                organizer: self.organizer.as_deref(),
                location: self.location.as_deref(),
                eligibility: self.eligibility.as_deref(),
                benefits: self.benefits.as_deref(),
                category: self.category.as_deref(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InsertBody<'a> {
    title: &'a str,
    link: &'a str,
    deadline: Option<&'a str>,
    thumbnail: Option<&'a str>,
    description: Option<&'a str>,
    tags: &'a [String],
    approved: bool,
    posted_to_telegram: bool,
    #[serde(flatten)]
    extended: Option<ExtendedColumns<'a>>,
}

#[derive(Debug, Serialize)]
struct ExtendedColumns<'a> {
    organizer: Option<&'a str>,
    location: Option<&'a str>,
    eligibility: Option<&'a str>,
    benefits: Option<&'a str>,
    category: Option<&'a str>,
}

pub trait OpportunityStore {
    fn exists(&self, key: &DedupKey) -> Result<bool>;
    fn insert(&self, row: &OpportunityRow) -> Result<()>;
    fn upsert_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Checks for an existing record, inserts when absent. Store failures are
/// logged and reported as an outcome, never raised.
pub fn persist(
    store: &dyn OpportunityStore,
    record: &Opportunity,
    mode: DedupMode,
) -> PersistOutcome {
    let key = DedupKey::for_record(record, mode);

    match store.exists(&key) {
        Ok(true) => {
            info!(title = %record.title, "opportunity already stored; skipping");
            return PersistOutcome::Duplicate;
        }
        Ok(false) => {}
        Err(err) => {
            error!(title = %record.title, error = %format!("{err:#}"), "duplicate check failed");
            return PersistOutcome::StoreError;
        }
    }

    match store.insert(&OpportunityRow::pending(record)) {
        Ok(()) => {
            info!(title = %record.title, "opportunity stored");
            PersistOutcome::Inserted
        }
        Err(err) => {
            error!(title = %record.title, error = %format!("{err:#}"), "insert failed");
            PersistOutcome::StoreError
        }
    }
}

/// The hosted store when credentials are present and usable. Anything else
/// is logged once and the run continues CSV-only.
pub fn connect_store(
    credentials: Option<StoreCredentials>,
    config: &StoreConfig,
) -> Option<SupabaseStore> {
    let Some(credentials) = credentials else {
        warn!(
            url_env = %config.url_env,
            key_env = %config.key_env,
            "store credentials missing; running in csv-only mode"
        );
        return None;
    };

    match SupabaseStore::new(&credentials, config) {
        Ok(store) => Some(store),
        Err(err) => {
            warn!(
                endpoint = %credentials.endpoint,
                error = %format!("{err:#}"),
                "store unavailable; running in csv-only mode"
            );
            None
        }
    }
}

/// PostgREST endpoint of a hosted Supabase project.
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    service_key: String,
    opportunities_table: String,
    settings_table: String,
    extended_columns: bool,
}

#[derive(Serialize)]
struct SettingRow<'a> {
    key: &'a str,
    value: &'a str,
}

impl SupabaseStore {
    pub fn new(credentials: &StoreCredentials, config: &StoreConfig) -> Result<Self> {
        let endpoint = Url::parse(&credentials.endpoint)
            .with_context(|| format!("store endpoint is not a valid url: {}", credentials.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("store endpoint must use http or https");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build store client")?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", credentials.endpoint.trim_end_matches('/')),
            service_key: credentials.service_key.clone(),
            opportunities_table: config.opportunities_table.clone(),
            settings_table: config.settings_table.clone(),
            extended_columns: config.extended_columns,
        })
    }

    fn lookup_request(&self, key: &DedupKey) -> RequestBuilder {
        let mut query = vec![
            ("select", "id".to_string()),
            ("title", format!("eq.{}", key.title)),
            ("limit", "1".to_string()),
        ];
        if let Some(link) = &key.link {
            query.push(("link", format!("eq.{link}")));
        }

        self.authorized(self.client.get(self.table_url(&self.opportunities_table)))
            .query(&query)
    }

    fn insert_request(&self, row: &OpportunityRow) -> RequestBuilder {
        self.authorized(self.client.post(self.table_url(&self.opportunities_table)))
            .header("Prefer", "return=minimal")
            .json(&row.insert_body(self.extended_columns))
    }

    fn upsert_request(&self, key: &str, value: &str) -> RequestBuilder {
        self.authorized(self.client.post(self.table_url(&self.settings_table)))
            .query(&[("on_conflict", "key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&SettingRow { key, value })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn send(request: RequestBuilder, what: &str) -> Result<reqwest::blocking::Response> {
        let resp = request
            .send()
            .with_context(|| format!("{what} request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            bail!("{what} rejected with status {status}: {body}");
        }
        Ok(resp)
    }
}

impl OpportunityStore for SupabaseStore {
    fn exists(&self, key: &DedupKey) -> Result<bool> {
        let rows: Vec<serde_json::Value> = Self::send(self.lookup_request(key), "duplicate lookup")?
            .json()
            .context("failed to decode duplicate lookup response")?;
        Ok(!rows.is_empty())
    }

    fn insert(&self, row: &OpportunityRow) -> Result<()> {
        Self::send(self.insert_request(row), "insert")?;
        Ok(())
    }

    fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        Self::send(self.upsert_request(key, value), "settings upsert")?;
        Ok(())
    }
}

/// Process-local store with the same matching rules as the hosted one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RefCell<Vec<OpportunityRow>>,
    settings: RefCell<BTreeMap<String, String>>,
    offline: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails, for exercising degraded runs.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<OpportunityRow> {
        self.rows.borrow().clone()
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings.borrow().get(key).cloned()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            bail!("store unreachable");
        }
        Ok(())
    }
}

impl OpportunityStore for MemoryStore {
    fn exists(&self, key: &DedupKey) -> Result<bool> {
        self.check_online()?;
        Ok(self.rows.borrow().iter().any(|row| key.matches(row)))
    }

    fn insert(&self, row: &OpportunityRow) -> Result<()> {
        self.check_online()?;
        self.rows.borrow_mut().push(row.clone());
        Ok(())
    }

    fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        self.check_online()?;
        self.settings
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
