// =============================================================================
// Upstream collaborators — market data and fundamentals
// =============================================================================
//
// The scanner only depends on these traits; the concrete HTTP clients live in
// `polygon.rs` and `yahoo.rs`.  Methods return boxed futures so the providers
// can be stored as trait objects inside the shared application state.

use anyhow::Result;
use chrono::NaiveDate;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::bar::PriceBar;

/// Source of OHLCV bars.
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for `symbol` between `from` and `to` inclusive.
    fn daily_bars<'a>(
        &'a self,
        symbol: &'a str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<PriceBar>>>;

    /// One-minute bars for `symbol` between `from` and `to` inclusive.
    fn intraday_bars<'a>(
        &'a self,
        symbol: &'a str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<PriceBar>>>;
}

/// One institutional holder position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalHolder {
    pub name: String,
    /// Market value of the position in USD.
    pub value: f64,
}

/// Fundamental data consumed by the CANSLIM screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Quarterly net income, most recent quarter first.
    pub quarterly_net_income: Vec<f64>,
    pub institutional_holders: Vec<InstitutionalHolder>,
}

/// Source of income-statement and ownership data.
pub trait FundamentalsProvider: Send + Sync {
    fn fundamentals<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, Result<Fundamentals>>;
}
