use crate::config::FetchConfig;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_EN: &str = "en-US,en;q=0.5";

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A single GET round trip. Implementations decide nothing about retries.
pub trait Transport {
    fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse>;
}

/// Blocking reqwest client shared by every request in a run.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .with_context(|| format!("request to {url} failed"))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .with_context(|| format!("failed to read body from {url}"))?;
        Ok(TransportResponse { status, body })
    }
}

/// Blocks the current thread. Swapped out in tests.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub body: String,
    pub attempts: u32,
}

#[derive(Debug, Error)]
#[error("request to {url} failed after {attempts} attempts: {last_error}")]
pub struct FetchFailure {
    pub url: String,
    pub attempts: u32,
    pub last_error: String,
}

pub struct Fetcher<T> {
    transport: T,
    settings: FetchConfig,
    rng: StdRng,
    pause: Box<dyn Pause>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, settings: FetchConfig) -> Self {
        Self {
            transport,
            settings,
            rng: StdRng::from_os_rng(),
            pause: Box::new(ThreadPause),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_pause(mut self, pause: impl Pause + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET with rotating identity headers. Transport errors and non-2xx
    /// statuses are retried with exponential backoff until `max_retries`
    /// attempts have been made.
    pub fn fetch(&mut self, url: &str) -> std::result::Result<FetchedPage, FetchFailure> {
        let attempts = self.settings.max_retries.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            let headers = self.request_headers();

            match self.transport.get(url, headers) {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    debug!(%url, status = resp.status, bytes = resp.body.len(), "fetched");
                    return Ok(FetchedPage {
                        url: url.to_string(),
                        body: resp.body,
                        attempts: attempt + 1,
                    });
                }
                Ok(resp) => {
                    last_error = format!("status {}", resp.status);
                    warn!(%url, status = resp.status, attempt = attempt + 1, "request failed");
                }
                Err(err) => {
                    last_error = format!("{err:#}");
                    warn!(%url, attempt = attempt + 1, error = %last_error, "request errored");
                }
            }

            if attempt + 1 < attempts {
                let delay = self.backoff_delay(attempt);
                debug!(%url, delay_secs = delay.as_secs_f64(), "backing off");
                self.pause.pause(delay);
            }
        }

        Err(FetchFailure {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }

    /// `2^attempt` seconds plus uniform jitter, `attempt` counting from zero.
    pub fn backoff_delay(&mut self, attempt: u32) -> Duration {
        let base = 2f64.powi(attempt.min(16) as i32);
        let jitter = sample_secs(
            &mut self.rng,
            self.settings.jitter_min_secs,
            self.settings.jitter_max_secs,
        );
        Duration::from_secs_f64(base + jitter)
    }

    /// Waits a random interval between detail-page requests.
    pub fn politeness_delay(&mut self) -> Duration {
        let delay = Duration::from_secs_f64(sample_secs(
            &mut self.rng,
            self.settings.politeness_min_secs,
            self.settings.politeness_max_secs,
        ));
        debug!(delay_secs = delay.as_secs_f64(), "politeness delay");
        self.pause.pause(delay);
        delay
    }

    pub fn pick_user_agent(&mut self) -> Option<&str> {
        if self.settings.user_agents.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.settings.user_agents.len());
        Some(self.settings.user_agents[idx].as_str())
    }

    fn request_headers(&mut self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_EN));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        if let Some(agent) = self.pick_user_agent() {
            match HeaderValue::from_str(agent) {
                Ok(value) => {
                    headers.insert(USER_AGENT, value);
                }
                Err(err) => warn!(error = %err, "skipping unusable user agent"),
            }
        }

        headers
    }
}

fn sample_secs(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if max <= min {
        return min.max(0.0);
    }
    rng.random_range(min..=max)
}
