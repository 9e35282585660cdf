#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde_json::Value;

use football_ingest::config::ApiConfig;
use football_ingest::http_client::{HttpResponse, Transport};

pub const BASE_URL: &str = "http://provider.test/v4";

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

pub fn fixture_json(name: &str) -> Value {
    serde_json::from_str(&read_fixture(name)).expect("fixture should be valid json")
}

pub fn api_config(delay_ms: u64, cooldown_ms: u64) -> ApiConfig {
    ApiConfig {
        base_url: BASE_URL.to_string(),
        api_key: Some("test-token".to_string()),
        request_delay: Duration::from_millis(delay_ms),
        throttle_cooldown: Duration::from_millis(cooldown_ms),
        max_throttle_retries: None,
        timeout: Duration::from_secs(1),
        scorers_limit: 20,
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    NetworkError(String),
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Reply::Status(200, body.into())
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub at: Instant,
}

/// Replies per path relative to `BASE_URL`, consumed in order; the last reply repeats.
/// Unknown paths answer 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: RefCell<HashMap<String, VecDeque<Reply>>>,
    calls: RefCell<Vec<Call>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, path: &str, reply: Reply) -> Self {
        self.routes
            .borrow_mut()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.path.clone()).collect()
    }
}

impl Transport for FakeTransport {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        let path = url
            .strip_prefix(BASE_URL)
            .unwrap_or(url)
            .trim_start_matches('/')
            .to_string();
        self.calls.borrow_mut().push(Call {
            path: path.clone(),
            query: query.to_vec(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            at: Instant::now(),
        });

        let mut routes = self.routes.borrow_mut();
        let reply = match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(Reply::Status(status, body)) => Ok(HttpResponse { status, body }),
            Some(Reply::NetworkError(msg)) => Err(anyhow!(msg)),
            None => Ok(HttpResponse {
                status: 404,
                body: r#"{"message":"not found"}"#.to_string(),
            }),
        }
    }
}
