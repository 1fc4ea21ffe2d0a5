// =============================================================================
// Yahoo Finance quoteSummary Client — quarterly income + institutional owners
// =============================================================================
//
// Only two quoteSummary modules are requested:
//   incomeStatementHistoryQuarterly -> netIncome per quarter
//   institutionOwnership            -> organization + position value
// =============================================================================

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, instrument};

use super::provider::{Fundamentals, FundamentalsProvider, InstitutionalHolder};

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Yahoo Finance fundamentals client.
#[derive(Debug, Clone)]
pub struct YahooClient {
    base_url: String,
    client: reqwest::Client,
}

impl YahooClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// GET /v10/finance/quoteSummary/{symbol}
    #[instrument(skip(self), name = "yahoo::get_fundamentals")]
    pub async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);

        let resp = self
            .client
            .get(&url)
            .query(&[(
                "modules",
                "incomeStatementHistoryQuarterly,institutionOwnership",
            )])
            .send()
            .await
            .with_context(|| format!("GET quoteSummary for {symbol} failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse quoteSummary response for {symbol}"))?;

        if !status.is_success() {
            anyhow::bail!("Yahoo quoteSummary for {symbol} returned {status}: {body}");
        }

        let fundamentals = parse_quote_summary(&body)?;
        debug!(
            symbol,
            quarters = fundamentals.quarterly_net_income.len(),
            holders = fundamentals.institutional_holders.len(),
            "fundamentals fetched"
        );
        Ok(fundamentals)
    }
}

fn raw_f64(val: &serde_json::Value) -> Option<f64> {
    val.get("raw")
        .and_then(|v| v.as_f64())
        .or_else(|| val.as_f64())
}

fn parse_quote_summary(body: &serde_json::Value) -> Result<Fundamentals> {
    let result = body["quoteSummary"]["result"]
        .as_array()
        .and_then(|arr| arr.first())
        .context("quoteSummary response has no result")?;

    // Most recent quarter first.
    let mut quarters: Vec<(i64, f64)> = result["incomeStatementHistoryQuarterly"]
        ["incomeStatementHistory"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let end = row["endDate"]["raw"].as_i64()?;
                    let net = raw_f64(&row["netIncome"])?;
                    Some((end, net))
                })
                .collect()
        })
        .unwrap_or_default();
    quarters.sort_by(|a, b| b.0.cmp(&a.0));

    let holders = result["institutionOwnership"]["ownershipList"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let name = row["organization"].as_str()?.to_string();
                    let value = raw_f64(&row["value"]).unwrap_or(0.0);
                    Some(InstitutionalHolder { name, value })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Fundamentals {
        quarterly_net_income: quarters.into_iter().map(|(_, n)| n).collect(),
        institutional_holders: holders,
    })
}

impl FundamentalsProvider for YahooClient {
    fn fundamentals<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, Result<Fundamentals>> {
        self.get_fundamentals(symbol).boxed()
    }
}
