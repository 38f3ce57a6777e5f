use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

pub const CONFIG_ENV: &str = "OPPSCRAPE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "oppscrape.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub dedup: DedupMode,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            output_dir: default_output_dir(),
            dedup: DedupMode::default(),
            fetch: FetchConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ScraperConfig {
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.base_url)
            .with_context(|| format!("base_url is not a valid url: {}", self.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("base_url must use http or https");
        }

        if self.fetch.max_retries == 0 {
            bail!("fetch.max_retries must be at least 1");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be at least 1");
        }
        if self.fetch.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            bail!("fetch.user_agents must contain at least one entry");
        }
        check_range(
            "fetch.jitter",
            self.fetch.jitter_min_secs,
            self.fetch.jitter_max_secs,
        )?;
        check_range(
            "fetch.politeness",
            self.fetch.politeness_min_secs,
            self.fetch.politeness_max_secs,
        )?;

        for (name, value) in [
            ("store.url_env", &self.store.url_env),
            ("store.key_env", &self.store.key_env),
            ("store.opportunities_table", &self.store.opportunities_table),
            ("store.settings_table", &self.store.settings_table),
            ("store.last_run_key", &self.store.last_run_key),
        ] {
            if value.trim().is_empty() {
                bail!("{name} must not be empty");
            }
        }

        Ok(())
    }
}

/// How candidate records are matched against what the store already holds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    #[default]
    Title,
    TitleAndLink,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_jitter_min_secs")]
    pub jitter_min_secs: f64,
    #[serde(default = "default_jitter_max_secs")]
    pub jitter_max_secs: f64,
    #[serde(default = "default_politeness_min_secs")]
    pub politeness_min_secs: f64,
    #[serde(default = "default_politeness_max_secs")]
    pub politeness_max_secs: f64,
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            jitter_min_secs: default_jitter_min_secs(),
            jitter_max_secs: default_jitter_max_secs(),
            politeness_min_secs: default_politeness_min_secs(),
            politeness_max_secs: default_politeness_max_secs(),
            user_agents: default_user_agents(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_url_env")]
    pub url_env: String,
    #[serde(default = "default_key_env")]
    pub key_env: String,
    #[serde(default = "default_opportunities_table")]
    pub opportunities_table: String,
    #[serde(default = "default_settings_table")]
    pub settings_table: String,
    #[serde(default = "default_last_run_key")]
    pub last_run_key: String,
    /// Also send organizer, location, eligibility, benefits and category.
    /// Only for tables that carry those columns.
    #[serde(default)]
    pub extended_columns: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url_env: default_url_env(),
            key_env: default_key_env(),
            opportunities_table: default_opportunities_table(),
            settings_table: default_settings_table(),
            last_run_key: default_last_run_key(),
            extended_columns: false,
        }
    }
}

/// Endpoint and privileged key for the hosted store.
#[derive(Clone)]
pub struct StoreCredentials {
    pub endpoint: String,
    pub service_key: String,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("endpoint", &self.endpoint)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl StoreCredentials {
    /// Reads both variables named by `store`; `None` when either is unset or blank.
    pub fn from_env(store: &StoreConfig) -> Option<Self> {
        Self::from_lookup(store, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        store: &StoreConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<Self> {
        let endpoint = lookup(&store.url_env).filter(|v| !v.trim().is_empty())?;
        let service_key = lookup(&store.key_env).filter(|v| !v.trim().is_empty())?;
        Some(Self {
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            service_key: service_key.trim().to_string(),
        })
    }
}

pub fn load_config_file(path: &Path) -> Result<ScraperConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let config: ScraperConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse toml in {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Resolves the run configuration: `$OPPSCRAPE_CONFIG`, then `./oppscrape.toml`,
/// then built-in defaults.
pub fn load_config() -> Result<ScraperConfig> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        let path = PathBuf::from(path);
        if !path.exists() {
            bail!("{CONFIG_ENV} points to a missing file: {}", path.display());
        }
        return load_config_file(&path);
    }

    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return load_config_file(local);
    }

    let config = ScraperConfig::default();
    config.validate()?;
    Ok(config)
}

fn check_range(name: &str, min: f64, max: f64) -> Result<()> {
    if !min.is_finite() || !max.is_finite() || min < 0.0 {
        bail!("{name} bounds must be finite and non-negative");
    }
    if min > max {
        bail!("{name}_min_secs must not exceed {name}_max_secs");
    }
    Ok(())
}

fn default_base_url() -> String {
    "https://opportunitydesk.org".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_jitter_min_secs() -> f64 {
    2.0
}

fn default_jitter_max_secs() -> f64 {
    4.0
}

fn default_politeness_min_secs() -> f64 {
    5.0
}

fn default_politeness_max_secs() -> f64 {
    10.0
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
            .to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/15.1 Safari/605.1.15"
            .to_string(),
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            .to_string(),
    ]
}

fn default_url_env() -> String {
    "SUPABASE_URL".to_string()
}

fn default_key_env() -> String {
    "SUPABASE_SERVICE_ROLE_KEY".to_string()
}

fn default_opportunities_table() -> String {
    "opportunities".to_string()
}

fn default_settings_table() -> String {
    "settings".to_string()
}

fn default_last_run_key() -> String {
    "last_scrape_date".to_string()
}
