//! Row sources
//!
//! [`HttpRowSource`] fetches published CSV over HTTP or reads the Sheets
//! values API. A CSV url without an http(s) scheme is read from disk by
//! [`FileRowSource`], which is handy for offline use and tests.

use inventory_sync_core::{
    parse_csv, rows_from_grid, DataSource, Row, RowSource, Settings, SyncError,
};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

type SourceResult<T> = inventory_sync_core::Result<T>;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Sheets values API payload
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Reads the configured source over HTTP
pub struct HttpRowSource {
    client: Client,
}

impl HttpRowSource {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("inventory-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn fetch_csv(&self, url: &str) -> SourceResult<Vec<Row>> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SyncError::Fetch(format!("CSV request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("CSV request failed: {}", status)));
        }
        let text = response
            .text()
            .map_err(|e| SyncError::Fetch(format!("CSV request failed: {}", e)))?;
        Ok(parse_csv(&text))
    }

    fn fetch_sheet(&self, spreadsheet_id: &str, range: &str, api_key: &str) -> SourceResult<Vec<Row>> {
        let url = sheets_url(spreadsheet_id, range, api_key)?;
        log::debug!("GET {}/{}/values/{}", SHEETS_API, spreadsheet_id, range);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SyncError::Fetch(format!("Sheets API request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!(
                "Sheets API request failed: {}",
                status
            )));
        }
        let body: ValueRange = response
            .json()
            .map_err(|e| SyncError::Fetch(format!("Sheets API request failed: {}", e)))?;
        Ok(rows_from_grid(&body.values))
    }
}

/// Values API url; the range goes in as one escaped path segment
fn sheets_url(spreadsheet_id: &str, range: &str, api_key: &str) -> SourceResult<Url> {
    let mut url = Url::parse(SHEETS_API)
        .map_err(|e| SyncError::Configuration(format!("Invalid Sheets API url: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Configuration("Invalid Sheets API url".to_string()))?
        .push(spreadsheet_id.trim())
        .push("values")
        .push(range.trim());
    url.query_pairs_mut().append_pair("key", api_key.trim());
    Ok(url)
}

fn is_http(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl RowSource for HttpRowSource {
    fn fetch_rows(&self, settings: &Settings) -> SourceResult<Vec<Row>> {
        settings.source.validate()?;
        match &settings.source {
            DataSource::Csv { url } if is_http(url) => self.fetch_csv(url.trim()),
            DataSource::Csv { url } => FileRowSource::from_url(url).read(),
            DataSource::Sheets {
                spreadsheet_id,
                range,
                api_key,
            } => self.fetch_sheet(spreadsheet_id, range, api_key),
        }
    }
}

/// Reads CSV text from a local file
pub struct FileRowSource {
    path: PathBuf,
}

impl FileRowSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Accepts a plain path or a `file://` url
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        Self::new(url.strip_prefix("file://").unwrap_or(url))
    }

    fn read(&self) -> SourceResult<Vec<Row>> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            SyncError::Fetch(format!("CSV request failed: {:?}: {}", self.path, e))
        })?;
        Ok(parse_csv(&text))
    }
}

impl RowSource for FileRowSource {
    fn fetch_rows(&self, _settings: &Settings) -> SourceResult<Vec<Row>> {
        self.read()
    }
}
