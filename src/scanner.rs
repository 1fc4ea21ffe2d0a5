// =============================================================================
// Batch Scanner — fan a screen out over a symbol list
// =============================================================================
//
// One tokio task per instrument.  A semaphore bounds the number of upstream
// fetches in flight; bars and fundamentals go through sharded TTL caches so
// back-to-back runs of different screens share one download.
//
// Per-instrument failures never abort the batch: they become `SkipReason`s in
// the report.  The batch as a whole, benchmark download included, runs under a
// timeout; when it fires every in-flight task is aborted and the partial
// results are dropped.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::indicators::{compute_indicators, IndicatorConfig};
use crate::market_data::{
    Fundamentals, FundamentalsProvider, MarketDataProvider, PriceSeries, TtlCache,
};
use crate::screens::{self, canslim, ScreenInput, ScreenParams};
use crate::types::{ScreenKind, SkipReason, Verdict};

/// Calendar days of minute bars requested; the screen keeps the last session.
const INTRADAY_LOOKBACK_DAYS: i64 = 5;

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedInstrument {
    pub instrument: String,
    pub reason: SkipReason,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub run_id: Uuid,
    pub screen: ScreenKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub verdicts: Vec<Verdict>,
    pub skipped: Vec<SkippedInstrument>,
}

impl ScanReport {
    /// Verdicts worth surfacing: Buy/Sell signals and screen passes.
    pub fn hits(&self) -> Vec<&Verdict> {
        self.verdicts.iter().filter(|v| v.result.is_hit()).collect()
    }
}

/// What to run.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub screen: ScreenKind,
    pub symbols: Vec<String>,
    pub params: ScreenParams,
    pub indicators: IndicatorConfig,
    /// Benchmark for CANSLIM relative strength and the market gate.
    pub benchmark: String,
}

// =============================================================================
// Scanner
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ScannerSettings {
    pub lookback_days: i64,
    pub max_concurrent_fetches: usize,
    pub timeout: Duration,
}

/// Shared, cheaply clonable batch runner.
#[derive(Clone)]
pub struct Scanner {
    market: Arc<dyn MarketDataProvider>,
    fundamentals: Arc<dyn FundamentalsProvider>,
    bars: Arc<TtlCache<String, Arc<PriceSeries>>>,
    fundamentals_cache: Arc<TtlCache<String, Arc<Fundamentals>>>,
    permits: Arc<Semaphore>,
    settings: ScannerSettings,
}

impl Scanner {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        fundamentals: Arc<dyn FundamentalsProvider>,
        cache_ttl: Duration,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            market,
            fundamentals,
            bars: Arc::new(TtlCache::new(cache_ttl)),
            fundamentals_cache: Arc::new(TtlCache::new(cache_ttl)),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_fetches.max(1))),
            settings,
        }
    }

    /// Drop every cached download.
    pub fn clear_caches(&self) {
        self.bars.clear();
        self.fundamentals_cache.clear();
    }

    /// Daily bars for `symbol` over the configured lookback, through the cache.
    pub async fn load_series(&self, symbol: &str) -> Result<Arc<PriceSeries>, SkipReason> {
        self.load_bars(symbol, false).await
    }

    /// Minute bars covering the latest sessions, cached apart from daily bars.
    pub async fn load_intraday(&self, symbol: &str) -> Result<Arc<PriceSeries>, SkipReason> {
        self.load_bars(symbol, true).await
    }

    async fn load_bars(&self, symbol: &str, intraday: bool) -> Result<Arc<PriceSeries>, SkipReason> {
        let key = if intraday {
            format!("{symbol}@1m")
        } else {
            symbol.to_string()
        };
        if let Some(series) = self.bars.get(&key) {
            debug!(symbol, intraday, "bar cache hit");
            return Ok(series);
        }

        let to = Utc::now().date_naive();
        let days = if intraday {
            INTRADAY_LOOKBACK_DAYS
        } else {
            self.settings.lookback_days
        };
        let from = to - ChronoDuration::days(days);
        let bars = {
            let _permit = self.permits.acquire().await.map_err(|e| SkipReason::TaskFailed {
                message: e.to_string(),
            })?;
            let fetched = if intraday {
                self.market.intraday_bars(symbol, from, to).await
            } else {
                self.market.daily_bars(symbol, from, to).await
            };
            fetched.map_err(|e| SkipReason::FetchFailed {
                message: format!("{e:#}"),
            })?
        };
        if bars.is_empty() {
            return Err(SkipReason::NoData);
        }
        let series = PriceSeries::new(symbol, bars).map_err(|e| SkipReason::FetchFailed {
            message: format!("{e:#}"),
        })?;
        let series = Arc::new(series);
        self.bars.insert(key, series.clone());
        Ok(series)
    }

    pub async fn load_fundamentals(&self, symbol: &str) -> Result<Arc<Fundamentals>, SkipReason> {
        let key = symbol.to_string();
        if let Some(f) = self.fundamentals_cache.get(&key) {
            debug!(symbol, "fundamentals cache hit");
            return Ok(f);
        }
        let fundamentals = {
            let _permit = self.permits.acquire().await.map_err(|e| SkipReason::TaskFailed {
                message: e.to_string(),
            })?;
            self.fundamentals
                .fundamentals(symbol)
                .await
                .map_err(|e| SkipReason::MissingFundamentals {
                    message: format!("{e:#}"),
                })?
        };
        let fundamentals = Arc::new(fundamentals);
        self.fundamentals_cache.insert(key, fundamentals.clone());
        Ok(fundamentals)
    }

    async fn screen_one(
        &self,
        symbol: &str,
        request: &ScanRequest,
        config: &IndicatorConfig,
        benchmark: Option<&PriceSeries>,
    ) -> Result<Verdict, SkipReason> {
        let series = if request.screen.uses_intraday_bars() {
            self.load_intraday(symbol).await?
        } else {
            self.load_series(symbol).await?
        };
        let fundamentals = if request.screen == ScreenKind::Canslim {
            Some(self.load_fundamentals(symbol).await?)
        } else {
            None
        };

        let set = compute_indicators(&series, config);
        let input = ScreenInput {
            series: &series,
            indicators: &set,
            fundamentals: fundamentals.as_deref(),
            benchmark,
        };
        let evaluation = screens::evaluate(request.screen, &request.params, config, input)?;
        let timestamp = series.last().map(|b| b.timestamp).unwrap_or_else(Utc::now);
        Ok(evaluation.into_verdict(symbol, request.screen, timestamp))
    }

    /// Run one screen over `request.symbols`.
    ///
    /// Errors only when the batch times out; instrument-level problems are
    /// reported in `skipped`.
    pub async fn run(&self, request: ScanRequest) -> Result<ScanReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let screen = request.screen;
        let timeout = self.settings.timeout;
        info!(%run_id, %screen, symbols = request.symbols.len(), "scan started");

        let report = match tokio::time::timeout(timeout, self.execute(run_id, started_at, request))
            .await
        {
            Ok(report) => report,
            Err(_) => {
                warn!(%run_id, %screen, ?timeout, "scan timed out, partial results discarded");
                bail!("{screen} scan timed out after {timeout:?}");
            }
        };

        info!(
            %run_id,
            %screen,
            evaluated = report.verdicts.len(),
            hits = report.hits().len(),
            skipped = report.skipped.len(),
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "scan finished"
        );
        Ok(report)
    }

    async fn execute(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        request: ScanRequest,
    ) -> ScanReport {
        let screen = request.screen;

        // ── Market gate (CANSLIM) ────────────────────────────────────────
        let benchmark = if screen == ScreenKind::Canslim {
            match self.load_series(&request.benchmark).await {
                Ok(b) if canslim::market_in_uptrend(&b, &request.params.canslim) => Some(b),
                Ok(_) => {
                    info!(%run_id, benchmark = %request.benchmark, "market not in uptrend, no CANSLIM picks");
                    return empty_report(run_id, screen, started_at);
                }
                Err(reason) => {
                    warn!(%run_id, benchmark = %request.benchmark, %reason, "benchmark unavailable, no CANSLIM picks");
                    return empty_report(run_id, screen, started_at);
                }
            }
        } else {
            None
        };

        // ── Fan out ──────────────────────────────────────────────────────
        let config = request.params.indicator_config(screen, &request.indicators);
        let request = Arc::new(request);
        let config = Arc::new(config);

        let handles: Vec<_> = request
            .symbols
            .iter()
            .map(|symbol| {
                let scanner = self.clone();
                let task_symbol = symbol.clone();
                let request = request.clone();
                let config = config.clone();
                let benchmark = benchmark.clone();
                let handle = tokio::spawn(async move {
                    scanner
                        .screen_one(&task_symbol, &request, &config, benchmark.as_deref())
                        .await
                });
                (symbol.clone(), handle)
            })
            .collect();

        // Dropped with this future, so a timeout aborts every task.
        let _guard = AbortOnDrop(handles.iter().map(|(_, h)| h.abort_handle()).collect());
        let outcomes = join_all(
            handles
                .into_iter()
                .map(|(symbol, handle)| async move { (symbol, handle.await) }),
        )
        .await;

        // ── Collect ──────────────────────────────────────────────────────
        let mut verdicts = Vec::new();
        let mut skipped = Vec::new();
        for (symbol, outcome) in outcomes {
            let outcome = outcome.unwrap_or_else(|e| {
                Err(SkipReason::TaskFailed {
                    message: e.to_string(),
                })
            });
            match outcome {
                Ok(verdict) => verdicts.push(verdict),
                Err(reason) => {
                    warn!(symbol = %symbol, %screen, %reason, "instrument skipped");
                    skipped.push(SkippedInstrument {
                        instrument: symbol,
                        reason,
                    });
                }
            }
        }

        ScanReport {
            run_id,
            screen,
            started_at,
            finished_at: Utc::now(),
            verdicts: screens::finalize(screen, &request.params, verdicts),
            skipped,
        }
    }
}

struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

fn empty_report(run_id: Uuid, screen: ScreenKind, started_at: DateTime<Utc>) -> ScanReport {
    ScanReport {
        run_id,
        screen,
        started_at,
        finished_at: Utc::now(),
        verdicts: Vec::new(),
        skipped: Vec::new(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use chrono::NaiveDate;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;

    use super::*;
    use crate::market_data::bar::test_support::bar_at;
    use crate::market_data::PriceBar;

    /// In-memory market data keyed by symbol; unknown symbols fail.
    #[derive(Default)]
    pub struct FakeMarket {
        pub closes: HashMap<String, Vec<f64>>,
        pub daily: HashMap<String, Vec<PriceBar>>,
        pub intraday: HashMap<String, Vec<PriceBar>>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl FakeMarket {
        pub fn with(mut self, symbol: &str, closes: Vec<f64>) -> Self {
            self.closes.insert(symbol.to_string(), closes);
            self
        }

        pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
            self.daily.insert(symbol.to_string(), bars);
            self
        }

        pub fn with_intraday(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
            self.intraday.insert(symbol.to_string(), bars);
            self
        }

        async fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MarketDataProvider for FakeMarket {
        fn daily_bars<'a>(
            &'a self,
            symbol: &'a str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> BoxFuture<'a, Result<Vec<PriceBar>>> {
            async move {
                self.tick().await;
                if let Some(bars) = self.daily.get(symbol) {
                    return Ok(bars.clone());
                }
                let closes = self
                    .closes
                    .get(symbol)
                    .ok_or_else(|| anyhow!("unknown symbol {symbol}"))?;
                Ok(closes
                    .iter()
                    .enumerate()
                    .map(|(i, &c)| bar_at(i, c, c, c * 1.01, c * 0.99, 1_000_000.0))
                    .collect())
            }
            .boxed()
        }

        fn intraday_bars<'a>(
            &'a self,
            symbol: &'a str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> BoxFuture<'a, Result<Vec<PriceBar>>> {
            async move {
                self.tick().await;
                self.intraday
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| anyhow!("no minute bars for {symbol}"))
            }
            .boxed()
        }
    }

    #[derive(Default)]
    pub struct FakeFundamentals {
        pub data: HashMap<String, Fundamentals>,
    }

    impl FundamentalsProvider for FakeFundamentals {
        fn fundamentals<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, Result<Fundamentals>> {
            async move {
                self.data
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| anyhow!("no fundamentals for {symbol}"))
            }
            .boxed()
        }
    }

    pub fn settings() -> ScannerSettings {
        ScannerSettings {
            lookback_days: 730,
            max_concurrent_fetches: 4,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn uptrend(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    pub fn downtrend(n: usize) -> Vec<f64> {
        (0..n).map(|i| 500.0 - i as f64).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::market_data::bar::test_support::bar_at;
    use crate::market_data::PriceBar;
    use crate::types::VerdictResult;

    fn scanner(market: Arc<FakeMarket>) -> Scanner {
        Scanner::new(
            market,
            Arc::new(FakeFundamentals::default()),
            Duration::from_secs(600),
            settings(),
        )
    }

    fn request(screen: ScreenKind, symbols: &[&str]) -> ScanRequest {
        ScanRequest {
            screen,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            params: ScreenParams::default(),
            indicators: IndicatorConfig::default(),
            benchmark: "SPY".to_string(),
        }
    }

    #[tokio::test]
    async fn verdicts_and_skips_are_collected() {
        let market = Arc::new(
            FakeMarket::default()
                .with("UP", uptrend(300))
                .with("DOWN", downtrend(300))
                .with("SHORT", uptrend(40)),
        );
        let report = scanner(market)
            .run(request(ScreenKind::Stage2, &["UP", "DOWN", "SHORT", "GONE"]))
            .await
            .unwrap();

        assert_eq!(report.screen, ScreenKind::Stage2);
        let results: Vec<_> = report
            .verdicts
            .iter()
            .map(|v| (v.instrument.as_str(), v.result))
            .collect();
        assert_eq!(results, vec![("UP", VerdictResult::Pass), ("DOWN", VerdictResult::Fail)]);
        assert_eq!(report.hits().len(), 1);

        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].instrument, "SHORT");
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::InsufficientHistory { have: 40, need: 200 }
        );
        assert!(matches!(report.skipped[1].reason, SkipReason::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn second_run_is_served_from_cache() {
        let market = Arc::new(FakeMarket::default().with("UP", uptrend(300)));
        let scanner = scanner(market.clone());
        scanner.run(request(ScreenKind::Bora, &["UP"])).await.unwrap();
        scanner.run(request(ScreenKind::GoldenCross, &["UP"])).await.unwrap();
        assert_eq!(market.calls(), 1);

        scanner.clear_caches();
        scanner.run(request(ScreenKind::Bora, &["UP"])).await.unwrap();
        assert_eq!(market.calls(), 2);
    }

    #[tokio::test]
    async fn timeout_discards_partial_results() {
        let market = Arc::new(FakeMarket {
            delay: Some(Duration::from_secs(30)),
            ..FakeMarket::default().with("SLOW", uptrend(300))
        });
        let scanner = Scanner::new(
            market,
            Arc::new(FakeFundamentals::default()),
            Duration::from_secs(600),
            ScannerSettings {
                timeout: Duration::from_millis(50),
                ..settings()
            },
        );
        let err = scanner
            .run(request(ScreenKind::Bora, &["SLOW"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn canslim_benchmark_fetch_is_bounded_by_timeout() {
        let market = Arc::new(FakeMarket {
            delay: Some(Duration::from_secs(30)),
            ..FakeMarket::default()
                .with("SPY", uptrend(300))
                .with("UP", uptrend(300))
        });
        let scanner = Scanner::new(
            market.clone(),
            Arc::new(FakeFundamentals::default()),
            Duration::from_secs(600),
            ScannerSettings {
                timeout: Duration::from_millis(50),
                ..settings()
            },
        );
        let err = scanner
            .run(request(ScreenKind::Canslim, &["UP"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        // Only the benchmark download was attempted.
        assert_eq!(market.calls(), 1);
    }

    #[tokio::test]
    async fn trending_batch_is_ordered_by_move() {
        let two_days = |prev: f64, last: f64, volume: f64| {
            vec![
                bar_at(0, prev, prev, prev, prev, volume),
                bar_at(1, last, last, last, last, volume),
            ]
        };
        let market = Arc::new(
            FakeMarket::default()
                .with_bars("HOT", two_days(100.0, 105.0, 2e6))
                .with_bars("COLD", two_days(100.0, 101.0, 2e6))
                .with_bars("JUMP", two_days(100.0, 110.0, 5e6))
                .with_bars("QUIET", two_days(100.0, 90.0, 1e5)),
        );
        let report = scanner(market)
            .run(request(ScreenKind::Trending, &["HOT", "COLD", "JUMP", "QUIET"]))
            .await
            .unwrap();
        let results: Vec<_> = report
            .verdicts
            .iter()
            .map(|v| (v.instrument.as_str(), v.result))
            .collect();
        assert_eq!(
            results,
            vec![
                ("JUMP", VerdictResult::Pass),
                ("HOT", VerdictResult::Pass),
                ("COLD", VerdictResult::Fail),
                ("QUIET", VerdictResult::Fail),
            ]
        );
    }

    #[tokio::test]
    async fn most_traded_uses_minute_bars_and_keeps_top_n() {
        use chrono::TimeZone;
        let session = |volume: f64| {
            let open = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
            vec![
                PriceBar::new(open, 10.0, 10.2, 9.9, 10.1, volume * 0.75),
                PriceBar::new(open + ChronoDuration::minutes(1), 10.1, 10.1, 9.8, 9.9, volume * 0.25),
            ]
        };
        let market = Arc::new(
            FakeMarket::default()
                .with_intraday("A", session(400.0))
                .with_intraday("B", session(800.0))
                .with("B", uptrend(300)),
        );
        let scanner = scanner(market.clone());
        let mut req = request(ScreenKind::MostTraded, &["A", "B"]);
        req.params.most_traded.top_n = 1;
        let report = scanner.run(req).await.unwrap();

        assert_eq!(report.verdicts[0].instrument, "B");
        assert_eq!(report.verdicts[0].result, VerdictResult::Pass);
        assert_eq!(report.verdicts[1].result, VerdictResult::Fail);
        let details = report.verdicts[0].details.as_ref().unwrap();
        assert_eq!(details["buy_volume"], 600.0);
        assert_eq!(details["buy_pct"], 75.0);

        // Daily bars are cached separately from minute bars.
        assert_eq!(market.calls(), 2);
        scanner.run(request(ScreenKind::Trending, &["B"])).await.unwrap();
        assert_eq!(market.calls(), 3);
    }

    #[tokio::test]
    async fn sector_breadth_reports_one_verdict_per_sector() {
        use std::collections::BTreeMap;
        let market = Arc::new(
            FakeMarket::default()
                .with("T1", uptrend(10))
                .with("T2", uptrend(10))
                .with("E1", downtrend(10)),
        );
        let mut req = request(ScreenKind::SectorBreadth, &["T1", "T2", "E1", "GONE"]);
        req.params.sector_breadth.sectors = BTreeMap::from([
            ("Energy".to_string(), vec!["E1".to_string()]),
            (
                "Technology".to_string(),
                vec!["T1".to_string(), "T2".to_string(), "GONE".to_string()],
            ),
        ]);
        let report = scanner(market).run(req).await.unwrap();

        let sectors: Vec<_> = report
            .verdicts
            .iter()
            .map(|v| (v.instrument.as_str(), v.result))
            .collect();
        assert_eq!(
            sectors,
            vec![("Technology", VerdictResult::Pass), ("Energy", VerdictResult::Fail)]
        );
        assert_eq!(report.verdicts[1].details.as_ref().unwrap()["class"], "laggard");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].instrument, "GONE");
    }

    #[tokio::test]
    async fn canslim_blocked_when_market_is_down() {
        let market = Arc::new(
            FakeMarket::default()
                .with("SPY", downtrend(300))
                .with("UP", uptrend(300)),
        );
        let report = scanner(market)
            .run(request(ScreenKind::Canslim, &["UP"]))
            .await
            .unwrap();
        assert!(report.verdicts.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn canslim_without_fundamentals_skips_instrument() {
        let market = Arc::new(
            FakeMarket::default()
                .with("SPY", uptrend(300))
                .with("UP", uptrend(300)),
        );
        let report = scanner(market)
            .run(request(ScreenKind::Canslim, &["UP"]))
            .await
            .unwrap();
        assert!(report.verdicts.is_empty());
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::MissingFundamentals { .. }
        ));
    }
}
