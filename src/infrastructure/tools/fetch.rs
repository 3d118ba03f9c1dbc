//! # Fetch Tool
//!
//! Built-in `use_tool` target that retrieves a URL, so the agent can
//! pull documentation or API responses without shelling out to curl.

use crate::domain::traits::ExternalTool;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::time::Duration;

/// Response bodies larger than this are truncated with a notice.
const BODY_CEILING_BYTES: usize = 100 * 1024;
const FETCH_TIMEOUT_SECS: u64 = 30;

pub struct FetchTool {
    http: reqwest::Client,
}

impl FetchTool {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ExternalTool for FetchTool {
    async fn call(&self, args: serde_json::Value) -> Result<String> {
        let Some(url) = args.get("url").and_then(|v| v.as_str()) else {
            bail!("fetch requires a 'url' argument");
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Could not read response body from {}", url))?;
        if body.len() > BODY_CEILING_BYTES {
            let mut end = BODY_CEILING_BYTES;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            return Ok(format!(
                "HTTP {}\n{}\n... (truncated, response is {} bytes)",
                status.as_u16(),
                &body[..end],
                body.len()
            ));
        }
        Ok(format!("HTTP {}\n{}", status.as_u16(), body))
    }
}
