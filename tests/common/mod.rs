#![allow(dead_code)]

use anyhow::{Result, anyhow};
use oppscrape::config::FetchConfig;
use oppscrape::fetch::{Fetcher, Pause, Transport, TransportResponse};
use reqwest::header::HeaderMap;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

pub enum Reply {
    Page(u16, String),
    Refused,
}

/// Replays canned replies per URL, in order. Unknown URLs are refused.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: RefCell<HashMap<String, VecDeque<Reply>>>,
    pub requests: RefCell<Vec<(String, HeaderMap)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, url: &str, reply: Reply) -> Self {
        self.replies
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn page(self, url: &str, body: &str) -> Self {
        self.reply(url, Reply::Page(200, body.to_string()))
    }

    pub fn refuse(mut self, url: &str, times: usize) -> Self {
        for _ in 0..times {
            self = self.reply(url, Reply::Refused);
        }
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|(requested, _)| requested == url)
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse> {
        self.requests.borrow_mut().push((url.to_string(), headers));
        let next = self
            .replies
            .borrow_mut()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Reply::Page(status, body)) => Ok(TransportResponse { status, body }),
            Some(Reply::Refused) | None => Err(anyhow!("connection refused: {url}")),
        }
    }
}

#[derive(Clone, Default)]
pub struct RecordingPause {
    pub log: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingPause {
    pub fn delays(&self) -> Vec<Duration> {
        self.log.borrow().clone()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.log.borrow_mut().push(duration);
    }
}

pub fn fetcher(transport: ScriptedTransport, pause: &RecordingPause) -> Fetcher<ScriptedTransport> {
    Fetcher::new(transport, FetchConfig::default())
        .with_seed(42)
        .with_pause(pause.clone())
}

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("missing fixture {}: {err}", path.display()))
}
