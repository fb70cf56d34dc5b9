//! HTTP fetch collaborator over JSON feeds
//!
//! Each (agency, record type) has a URL template in the configuration. List
//! endpoints return a JSON array of objects (or an object with a `records`
//! array); detail endpoints return one object. Pacing and the overall
//! deadline are applied by the caller, so this client never retries.

use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::form_urlencoded;

use crate::domain::{Agency, Cursor, RawRecord, RecordType};
use crate::infrastructure::config::ScraperConfig;
use crate::scraping::error::FetchFailure;
use crate::scraping::fetcher::{FetchRequest, RecordFetcher};

/// Substitutes cursor placeholders into a list URL template.
#[must_use]
pub fn render_list_url(template: &str, cursor: &Cursor) -> String {
    match cursor {
        Cursor::Page { page } => template.replace("{page}", &page.to_string()),
        Cursor::DateRange { from, to } => template
            .replace("{from}", &from.format("%Y-%m-%d").to_string())
            .replace("{to}", &to.format("%Y-%m-%d").to_string()),
    }
}

/// Substitutes a percent-encoded regulator id into a detail URL template.
#[must_use]
pub fn render_detail_url(template: &str, regulator_id: &str) -> String {
    // Literal '+' is already %2B here, so every '+' left stands for a space.
    let encoded: String = form_urlencoded::byte_serialize(regulator_id.as_bytes()).collect();
    template.replace("{id}", &encoded.replace('+', "%20"))
}

fn classify(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        return FetchFailure::NetworkTimeout { timeout_ms: 0 };
    }
    match err.status() {
        Some(status) => FetchFailure::Http { status: status.as_u16() },
        None => FetchFailure::Other(err.to_string()),
    }
}

fn records_from(body: Value) -> Result<Vec<RawRecord>, FetchFailure> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(items)) => items,
            _ => return Err(FetchFailure::Other("response has no records array".into())),
        },
        _ => return Err(FetchFailure::Other("response is not a JSON array".into())),
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .map(RawRecord::from)
        .collect())
}

pub struct HttpFeedFetcher {
    client: Client,
    endpoints: HashMap<String, String>,
    timeout_ms: u64,
}

impl HttpFeedFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchFailure> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| FetchFailure::Other(format!("Invalid user agent: {e}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_millis(config.network_timeout_ms.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchFailure::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            timeout_ms: config.network_timeout_ms,
        })
    }

    fn template(&self, key: &str) -> Result<&str, FetchFailure> {
        self.endpoints
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| FetchFailure::Other(format!("no endpoint configured for {key}")))
    }

    async fn get_json(&self, url: &str) -> Result<Option<Value>, FetchFailure> {
        debug!("Fetching URL: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| self.with_timeout(classify(&e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchFailure::Http { status: status.as_u16() });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| self.with_timeout(classify(&e)))?;
        debug!("Successfully fetched: {} ({})", url, status);
        Ok(Some(body))
    }

    fn with_timeout(&self, failure: FetchFailure) -> FetchFailure {
        match failure {
            FetchFailure::NetworkTimeout { .. } => FetchFailure::NetworkTimeout {
                timeout_ms: self.timeout_ms,
            },
            other => other,
        }
    }
}

#[async_trait]
impl RecordFetcher for HttpFeedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchFailure> {
        let template = self.template(&format!("{}/{}", request.agency, request.record_type))?;
        let url = render_list_url(template, &request.cursor);
        match self.get_json(&url).await? {
            Some(body) => records_from(body),
            // A page past the end of a register
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_detail(
        &self,
        agency: Agency,
        record_type: RecordType,
        regulator_id: &str,
    ) -> Result<Option<RawRecord>, FetchFailure> {
        let Ok(template) = self.template(&format!("{agency}/{record_type}/detail")) else {
            return Ok(None);
        };
        let url = render_detail_url(template, regulator_id);
        Ok(self
            .get_json(&url)
            .await?
            .filter(Value::is_object)
            .map(RawRecord::from))
    }
}
