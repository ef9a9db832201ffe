//! Google Sheets v4 `values.get` client.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use custom_debug_derive::Debug;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::brs::json::parse_json_with_context;
use crate::marks::portal::{ServiceError, ServiceResult, SheetSource};
use crate::utils::log_if_slow;

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";

const SLOW_READ_THRESHOLD: Duration = Duration::from_secs(5);

/// How requests to the Sheets API are authorized.
#[derive(Debug, Clone)]
pub enum SheetsAuth {
    /// Public or link-shared sheets.
    ApiKey(#[debug(skip)] String),
    /// OAuth access token obtained elsewhere.
    AccessToken(#[debug(skip)] String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug)]
pub struct SheetsClient {
    #[debug(skip)]
    http: reqwest::Client,
    base_url: String,
    auth: SheetsAuth,
}

impl SheetsClient {
    pub fn new(
        base_url: impl Into<String>,
        auth: SheetsAuth,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Sheets HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn values_url(&self, spreadsheet_id: &str, a1_range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(a1_range)
        )
    }
}

#[async_trait]
impl SheetSource for SheetsClient {
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        a1_range: &str,
    ) -> ServiceResult<Vec<Vec<String>>> {
        let start = Instant::now();
        let url = self.values_url(spreadsheet_id, a1_range);
        let request = self.http.get(&url).query(&[("majorDimension", "ROWS")]);
        let request = match &self.auth {
            SheetsAuth::ApiKey(key) => request.query(&[("key", key.as_str())]),
            SheetsAuth::AccessToken(token) => request.bearer_auth(token),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ServiceError::Unavailable(anyhow!(e).context("Sheets API unreachable"))
            } else {
                ServiceError::Failed(anyhow!(e).context("Sheets API request failed"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                ServiceError::Unavailable(anyhow!(e).context("Failed to read Sheets response"))
            })?;
        trace!(%status, bytes = body.len(), "Sheets response");

        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ServiceError::SessionExpired(format!(
                    "Google Sheets rejected credentials ({status})"
                )));
            }
            s if s.is_server_error() => {
                return Err(ServiceError::Unavailable(anyhow!(
                    "Sheets API returned {status}"
                )));
            }
            _ => {
                return Err(ServiceError::Failed(anyhow!(
                    "Sheets API returned {status}: {body}"
                )));
            }
        }

        let range: ValueRange = parse_json_with_context(&body)
            .with_context(|| format!("Failed to parse Sheets range {a1_range}"))?;
        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect();

        debug!(rows = rows.len(), range = a1_range, "Sheet range read");
        log_if_slow(start, SLOW_READ_THRESHOLD, "sheets read_range");
        Ok(rows)
    }
}
