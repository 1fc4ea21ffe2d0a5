// =============================================================================
// Polygon.io REST Client — daily and minute aggregate bars
// =============================================================================
//
// SECURITY: The API key is sent as a query parameter (Polygon's convention)
// and is never logged or serialized.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::bar::PriceBar;
use super::provider::MarketDataProvider;

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// One entry of the `results` array of `/v2/aggs/ticker/.../range/...`.
#[derive(Debug, Deserialize)]
struct AggregateBar {
    /// Bar start, UNIX milliseconds.
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Option<Vec<AggregateBar>>,
}

/// Bar width of an aggregates request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timespan {
    Day,
    Minute,
}

impl Timespan {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Minute => "minute",
        }
    }
}

fn aggregates_url(
    base_url: &str,
    symbol: &str,
    timespan: Timespan,
    from: NaiveDate,
    to: NaiveDate,
) -> String {
    format!(
        "{base_url}/v2/aggs/ticker/{symbol}/range/1/{}/{from}/{to}",
        timespan.as_str()
    )
}

/// Polygon.io aggregates client.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl PolygonClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into();
        debug!(base_url = %base_url, "PolygonClient initialised");

        Ok(Self {
            api_key: api_key.into(),
            base_url,
            client,
        })
    }

    /// GET /v2/aggs/ticker/{symbol}/range/1/{timespan}/{from}/{to}
    #[instrument(skip(self), name = "polygon::get_aggregates")]
    pub async fn get_aggregates(
        &self,
        symbol: &str,
        timespan: Timespan,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let url = aggregates_url(&self.base_url, symbol, timespan, from, to);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("GET aggregates for {symbol} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Polygon aggregates for {symbol} returned {status}: {body}");
        }

        let body: AggregatesResponse = resp
            .json()
            .await
            .with_context(|| format!("failed to parse aggregates response for {symbol}"))?;

        let bars = parse_aggregates(body);
        if bars.is_empty() {
            warn!(symbol, "Polygon returned no results");
        }
        debug!(symbol, ?timespan, count = bars.len(), "bars fetched");
        Ok(bars)
    }
}

fn parse_aggregates(body: AggregatesResponse) -> Vec<PriceBar> {
    body.results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| {
            let ts = Utc.timestamp_millis_opt(a.t).single()?;
            Some(PriceBar::new(ts, a.o, a.h, a.l, a.c, a.v))
        })
        .collect()
}

impl MarketDataProvider for PolygonClient {
    fn daily_bars<'a>(
        &'a self,
        symbol: &'a str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<PriceBar>>> {
        self.get_aggregates(symbol, Timespan::Day, from, to).boxed()
    }

    fn intraday_bars<'a>(
        &'a self,
        symbol: &'a str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<PriceBar>>> {
        self.get_aggregates(symbol, Timespan::Minute, from, to).boxed()
    }
}

impl std::fmt::Debug for PolygonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aggregate_payload() {
        let json = r#"{
            "ticker": "AAPL", "status": "OK", "resultsCount": 2,
            "results": [
                {"v": 1000, "o": 10.0, "c": 10.5, "h": 11.0, "l": 9.5, "t": 1704153600000},
                {"v": 1200, "o": 10.5, "c": 10.1, "h": 10.8, "l": 10.0, "t": 1704240000000}
            ]
        }"#;
        let body: AggregatesResponse = serde_json::from_str(json).unwrap();
        let bars = parse_aggregates(body);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[1].volume, 1200.0);
        assert_eq!(bars[0].timestamp.date_naive().to_string(), "2024-01-02");
    }

    #[test]
    fn missing_results_is_empty() {
        let body: AggregatesResponse =
            serde_json::from_str(r#"{"status": "OK", "resultsCount": 0}"#).unwrap();
        assert!(parse_aggregates(body).is_empty());
    }

    #[test]
    fn url_names_the_timespan() {
        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(
            aggregates_url("https://api.polygon.io", "AAPL", Timespan::Minute, from, to),
            "https://api.polygon.io/v2/aggs/ticker/AAPL/range/1/minute/2024-03-01/2024-03-04"
        );
        assert!(aggregates_url("http://x", "MSFT", Timespan::Day, from, to)
            .ends_with("/range/1/day/2024-03-01/2024-03-04"));
    }

    #[test]
    fn debug_redacts_key() {
        let client = PolygonClient::new("secret-key").unwrap();
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("secret-key"));
    }
}
