use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

/// Status and body of a completed GET. Non-2xx statuses are not errors at this level.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// The outbound HTTP seam. Implementations return `Err` only for network-level failures.
pub trait Transport {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse> {
        let mut req = self
            .client
            .get(url)
            .query(query)
            .header(USER_AGENT, concat!("football_ingest/", env!("CARGO_PKG_VERSION")));
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let resp = req.send().context("request failed")?;
        let status = resp.status().as_u16();
        let body = resp.text().context("failed reading body")?;
        Ok(HttpResponse { status, body })
    }
}
