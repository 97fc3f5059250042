//! Google Sheets v4 REST client.
//!
//! Only two calls are needed: `values:append` for new rows and a plain
//! `values` read for duplicate checks.

use crate::config::SheetsConfig;
use crate::metrics::{RowSink, SinkError};
use crate::waitlist::LeadStore;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

pub struct SheetsClient {
    http: Client,
    endpoint: Url,
    spreadsheet_id: String,
    access_token: SecretString,
}

impl SheetsClient {
    /// `None` unless the sheets section is enabled and complete.
    pub fn from_config(config: &SheetsConfig) -> Result<Option<Self>, SinkError> {
        if !config.is_usable() {
            return Ok(None);
        }
        let endpoint = Url::parse(&config.endpoint).map_err(|_| SinkError::NotConfigured("sheets.endpoint"))?;
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Some(Self {
            http,
            endpoint,
            spreadsheet_id: config.spreadsheet_id.clone(),
            access_token: SecretString::new(config.access_token.expose_secret().clone()),
        }))
    }

    /// `{endpoint}/{spreadsheet}/values/{range}{suffix}`
    pub fn values_url(&self, range: &str, suffix: &str) -> Result<Url, SinkError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| SinkError::NotConfigured("sheets.endpoint"))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    pub async fn append(&self, range: &str, row: Vec<String>) -> Result<(), SinkError> {
        let mut url = self.values_url(range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token.expose_secret()))
            .json(&json!({ "values": [row] }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, body });
        }
        Ok(())
    }

    pub async fn read(&self, range: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let url = self.values_url(range, "")?;
        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token.expose_secret()))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, body });
        }
        Ok(resp.json::<ValueRange>().await?.values)
    }
}

/// Metrics rows on the events tab, columns A..F.
pub struct SheetsSink {
    client: Arc<SheetsClient>,
    sheet: String,
}

impl SheetsSink {
    pub fn new(client: Arc<SheetsClient>, sheet: impl Into<String>) -> Self {
        Self {
            client,
            sheet: sheet.into(),
        }
    }
}

#[async_trait]
impl RowSink for SheetsSink {
    async fn append_row(&self, fields: Vec<String>) -> Result<(), SinkError> {
        self.client.append(&format!("{}!A:F", self.sheet), fields).await
    }
}

/// Waitlist rows on the leads tab: A..E, email in column B.
pub struct SheetsLeadStore {
    client: Arc<SheetsClient>,
    sheet: String,
}

impl SheetsLeadStore {
    pub fn new(client: Arc<SheetsClient>, sheet: impl Into<String>) -> Self {
        Self {
            client,
            sheet: sheet.into(),
        }
    }
}

#[async_trait]
impl LeadStore for SheetsLeadStore {
    async fn emails(&self) -> Result<Vec<String>, SinkError> {
        let rows = self.client.read(&format!("{}!B:B", self.sheet)).await?;
        // Row 1 is the header.
        Ok(rows
            .into_iter()
            .skip(1)
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    async fn append(&self, row: Vec<String>) -> Result<(), SinkError> {
        self.client.append(&format!("{}!A:E", self.sheet), row).await
    }

    fn name(&self) -> &str {
        &self.sheet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> SheetsConfig {
        SheetsConfig {
            enabled: true,
            endpoint: endpoint.into(),
            spreadsheet_id: "sheet-id".into(),
            sheet_name: "Sheet1".into(),
            metrics_sheet_name: "Events".into(),
            access_token: SecretString::new("token".into()),
        }
    }

    #[test]
    fn disabled_config_yields_no_client() {
        let mut cfg = config("https://sheets.googleapis.com/v4/spreadsheets");
        cfg.enabled = false;
        assert!(SheetsClient::from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn values_url_encodes_the_range() {
        let client = SheetsClient::from_config(&config("https://sheets.googleapis.com/v4/spreadsheets/"))
            .unwrap()
            .unwrap();
        let url = client.values_url("Lead List!A:E", ":append").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/Lead%20List!A:E:append"
        );
    }
}
