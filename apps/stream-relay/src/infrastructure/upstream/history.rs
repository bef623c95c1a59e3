//! Statistic History Fetcher
//!
//! HTTP adapter for the provider's statistic-history endpoint, which serves
//! the recent settled games of the table. The endpoint is authenticated with
//! the session token as a query parameter and answers rows whose result
//! string leads with the winning number, e.g. `"7 Red"`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::application::ports::{HistoryError, HistoryFetcher, SessionToken};
use crate::domain::event::HistoryEntry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(rename = "errorCode")]
    error_code: String,
    #[serde(default)]
    history: Vec<HistoryRow>,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    #[serde(rename = "gameId")]
    game_id: String,
    #[serde(rename = "gameResult", default)]
    game_result: String,
}

/// History fetcher backed by the provider's statistic-history endpoint.
pub struct HttpHistoryFetcher {
    client: Client,
    url: String,
}

impl HttpHistoryFetcher {
    /// Create a fetcher for the given endpoint.
    pub fn new(url: String) -> Result<Self, HistoryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HistoryError::Request(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl HistoryFetcher for HttpHistoryFetcher {
    async fn fetch_history(
        &self,
        token: &SessionToken,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        let cache_buster = Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("JSESSIONID", token.as_str()),
                ("ck", cache_buster.as_str()),
            ])
            .send()
            .await
            .map_err(|e| HistoryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Rejected(format!("http status {status}")));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| HistoryError::Malformed(e.to_string()))?;

        if body.error_code != "0" {
            return Err(HistoryError::Rejected(format!(
                "provider error code {}",
                body.error_code
            )));
        }

        let entries: Vec<HistoryEntry> = body
            .history
            .iter()
            .filter_map(|row| {
                let number = leading_number(&row.game_result)?;
                Some(HistoryEntry::new(row.game_id.clone(), number))
            })
            .collect();

        tracing::debug!(entries = entries.len(), "history snapshot fetched");
        Ok(entries)
    }
}

/// The leading winning number of a result string like `"7 Red"`.
fn leading_number(game_result: &str) -> Option<u8> {
    let first = game_result.split_whitespace().next()?;
    let number: u8 = first.parse().ok()?;
    (number <= 36).then_some(number)
}
