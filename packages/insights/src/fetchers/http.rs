//! HTTP + HTML implementation of the metadata and extraction collaborators.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::fetchers::table::table_to_json;
use crate::traits::source::{InsightExtractor, MetadataSource};
use crate::types::{
    request::{RequestDescriptor, TargetSelector},
    result::ExtractedPayload,
    symbol::{Metadata, Symbol},
};

/// Browser user agent; the target site rejects obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const METADATA_URL: &str = "https://trendlyne.com/equity/{symbol}/stock-page/";

/// Fetches pages over HTTP and extracts targets with CSS selectors.
///
/// # Example
///
/// ```rust,ignore
/// use insights::fetchers::HttpInsightSource;
///
/// let source = Arc::new(HttpInsightSource::new()?.with_timeout(Duration::from_secs(5))?);
/// let orchestrator = BatchOrchestrator::new(cache, source.clone(), source);
/// ```
#[derive(Clone)]
pub struct HttpInsightSource {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpInsightSource {
    /// Create a source with the default timeout and user agent.
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    /// Rebuild the client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, reqwest::Error> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// GET a page as text.
    pub async fn fetch(&self, url: &str) -> FetchResult<String> {
        let url = normalize_url(url)?;
        debug!(url = %url, "HTTP fetch starting");

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| request_error(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "HTTP fetch returned error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| request_error(url.as_str(), e))?;
        debug!(url = %url, bytes = body.len(), "HTTP fetch complete");
        Ok(body)
    }
}

#[async_trait]
impl MetadataSource for HttpInsightSource {
    async fn lookup(&self, symbol: &Symbol) -> FetchResult<Option<Metadata>> {
        let url = METADATA_URL.replace("{symbol}", symbol.as_str());
        let html = self.fetch(&url).await?;
        parse_metadata(&html)
    }
}

#[async_trait]
impl InsightExtractor for HttpInsightSource {
    async fn extract(&self, descriptor: &RequestDescriptor) -> FetchResult<ExtractedPayload> {
        let html = self.fetch(&descriptor.url).await?;
        extract_target(&html, &descriptor.target)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        warn!(url = %url, "HTTP request timed out");
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        warn!(url = %url, error = %e, "HTTP request failed");
        FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

/// Parse a URL, assuming `https://` when no scheme is given.
pub fn normalize_url(raw: &str) -> FetchResult<Url> {
    let raw = raw.trim();
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate).map_err(|e| FetchError::Http {
        url: raw.to_string(),
        message: format!("invalid URL: {e}"),
    })
}

fn selector(css: &str) -> FetchResult<Selector> {
    Selector::parse(css).map_err(|e| FetchError::Parse {
        message: format!("invalid selector: {e}"),
        raw: css.to_string(),
    })
}

/// Read `data-stock-pk` and `data-stockslugname` from a stock page.
pub fn parse_metadata(html: &str) -> FetchResult<Option<Metadata>> {
    let doc = Html::parse_document(html);
    let first_attr = |attr: &str| -> FetchResult<Option<String>> {
        let sel = selector(&format!("[{attr}]"))?;
        Ok(doc
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    };

    match (first_attr("data-stock-pk")?, first_attr("data-stockslugname")?) {
        (Some(pk), Some(slug)) => Ok(Some(Metadata::new(pk, slug))),
        _ => Ok(None),
    }
}

/// Locate a descriptor's target in a fetched page.
pub fn extract_target(html: &str, target: &TargetSelector) -> FetchResult<ExtractedPayload> {
    let Some(css) = target.css() else {
        return Ok(ExtractedPayload::html(html));
    };
    let attribute = target.attribute.as_deref().unwrap_or_default();
    let doc = Html::parse_document(html);
    let sel = selector(&css)?;
    let element = doc
        .select(&sel)
        .next()
        .ok_or_else(|| FetchError::NotFound(format!("no element matches {css}")))?;

    if target.attribute_value.as_deref().is_some_and(|v| !v.is_empty()) {
        if target.tag_name.as_deref() == Some("table") {
            return Ok(ExtractedPayload::json(table_to_json(element)?));
        }
        return Ok(ExtractedPayload::html(element.html()));
    }

    let raw = element
        .value()
        .attr(attribute)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FetchError::NotFound(format!("attribute {attribute} is empty")))?;

    let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|_| FetchError::Parse {
        message: "Could not parse as JSON".to_string(),
        raw: raw.to_string(),
    })?;

    // Insight attributes wrap their rows as [[label, { tableData }], ...]
    let data = match parsed.pointer("/0/1/tableData") {
        Some(table) if is_truthy(table) => table.clone(),
        _ => parsed,
    };
    Ok(ExtractedPayload::json(data))
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::result::PayloadKind;
    use serde_json::json;

    const STOCK_PAGE: &str = r#"<html><body>
        <div id="hdr" data-stock-pk="1372" data-stockslugname="tata-consultancy-services-ltd"></div>
        <div class="tlcard p-a-1 m-b-2"><span>Insider buy</span></div>
        <div data-metrics='{"pe": 31.2}'></div>
        <div data-stock-insight='[["Revenue", {"tableData": [{"q": "Q1"}]}]]'></div>
        <div data-broken='{not json'></div>
        <div data-empty=""></div>
    </body></html>"#;

    #[test]
    fn test_parse_metadata() {
        assert_eq!(
            parse_metadata(STOCK_PAGE).unwrap(),
            Some(Metadata::new("1372", "tata-consultancy-services-ltd"))
        );
        assert_eq!(parse_metadata("<html></html>").unwrap(), None);
    }

    #[test]
    fn test_element_target_returns_outer_html() {
        let payload = extract_target(
            STOCK_PAGE,
            &TargetSelector::element("class", "tlcard p-a-1 m-b-2"),
        )
        .unwrap();

        assert_eq!(payload.kind, PayloadKind::Html);
        let html = payload.data.as_str().unwrap();
        assert!(html.starts_with("<div"));
        assert!(html.contains("Insider buy"));
    }

    #[test]
    fn test_attribute_target_parses_json() {
        let payload = extract_target(STOCK_PAGE, &TargetSelector::attribute("data-metrics")).unwrap();
        assert_eq!(payload.kind, PayloadKind::Json);
        assert_eq!(payload.data, json!({"pe": 31.2}));
    }

    #[test]
    fn test_attribute_target_unwraps_table_data() {
        let payload =
            extract_target(STOCK_PAGE, &TargetSelector::attribute("data-stock-insight")).unwrap();
        assert_eq!(payload.data, json!([{"q": "Q1"}]));
    }

    #[test]
    fn test_unparseable_attribute_keeps_raw() {
        let err = extract_target(STOCK_PAGE, &TargetSelector::attribute("data-broken")).unwrap_err();
        assert_eq!(err.raw(), Some("{not json"));
    }

    #[test]
    fn test_missing_and_empty_targets() {
        assert!(matches!(
            extract_target(STOCK_PAGE, &TargetSelector::element("id", "share-change-analysis")),
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            extract_target(STOCK_PAGE, &TargetSelector::attribute("data-empty")),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_document_target() {
        let payload = extract_target("{\"a\":1}", &TargetSelector::document()).unwrap();
        assert_eq!(payload.kind, PayloadKind::Html);
        assert_eq!(payload.data, json!("{\"a\":1}"));
    }

    #[test]
    fn test_table_tag_converts_rows() {
        let page = r#"<table id="holders"><tr><th>Name</th></tr><tr><td>A</td></tr></table>"#;
        let target = TargetSelector::element("id", "holders").with_tag("table");
        let payload = extract_target(page, &target).unwrap();
        assert_eq!(payload.data, json!([{"Name": "A"}]));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("trendlyne.com/equity/1/TCS/").unwrap().as_str(),
            "https://trendlyne.com/equity/1/TCS/"
        );
        assert!(normalize_url("https://").is_err());
    }
}
