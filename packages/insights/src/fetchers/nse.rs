//! Index membership from the NSE equity-stockIndices API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::fetchers::http::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::traits::source::IndexSource;
use crate::types::symbol::Symbol;

const NSE_API: &str = "https://www.nseindia.com/api/equity-stockIndices";
const NSE_REFERER: &str = "https://www.nseindia.com/";

#[derive(Debug, Deserialize)]
struct IndexResponse {
    data: Vec<IndexRow>,
}

#[derive(Debug, Deserialize)]
struct IndexRow {
    #[serde(default)]
    symbol: Option<String>,

    #[serde(default)]
    priority: Option<i64>,
}

/// Lists index constituents via the NSE API.
#[derive(Clone)]
pub struct NseIndexSource {
    client: reqwest::Client,
    user_agent: String,
}

impl NseIndexSource {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl IndexSource for NseIndexSource {
    async fn members(&self, index_name: &str) -> FetchResult<Vec<Symbol>> {
        let url = Url::parse_with_params(NSE_API, &[("index", index_name)]).map_err(|e| {
            FetchError::Http {
                url: NSE_API.to_string(),
                message: e.to_string(),
            }
        })?;
        debug!(url = %url, index = index_name, "Fetching index members");

        let to_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Http {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::REFERER, NSE_REFERER)
            .send()
            .await
            .map_err(to_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(index = index_name, status = status.as_u16(), "Index API returned error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(to_error)?;
        let symbols = parse_members(&body, index_name)?;
        info!(index = index_name, members = symbols.len(), "Fetched index members");
        Ok(symbols)
    }
}

/// Constituent symbols from an API response, without the index's own row.
pub fn parse_members(body: &str, index_name: &str) -> FetchResult<Vec<Symbol>> {
    let response: IndexResponse = serde_json::from_str(body).map_err(|e| FetchError::Parse {
        message: format!("invalid index response: {e}"),
        raw: body.chars().take(512).collect(),
    })?;

    Ok(response
        .data
        .into_iter()
        .filter(|row| row.priority != Some(1))
        .filter_map(|row| row.symbol)
        .filter(|symbol| symbol != index_name)
        .filter_map(|symbol| Symbol::parse(symbol).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_members_skips_index_row() {
        let body = r#"{"data": [
            {"symbol": "NIFTY IT", "priority": 1},
            {"symbol": "TCS", "priority": 0},
            {"symbol": " infy ", "priority": 0},
            {"symbol": "NIFTY IT"},
            {"priority": 0},
            {"symbol": "", "priority": 0}
        ]}"#;

        let members = parse_members(body, "NIFTY IT").unwrap();
        let names: Vec<_> = members.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["TCS", "INFY"]);
    }

    #[test]
    fn test_parse_members_rejects_bad_shape() {
        let err = parse_members(r#"{"rows": []}"#, "NIFTY 50").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }
}
