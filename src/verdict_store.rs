// =============================================================================
// Verdict Store — append-only scan reports with an optional JSON snapshot
// =============================================================================
//
// Reports are only ever appended; the sole mutation besides append is the
// age-based retention prune.  Queries:
//   - latest report of a screen finished on a given day
//   - latest passing verdict per LEAP option strategy
//
// The snapshot file uses the same atomic tmp + rename write as the runtime
// config.
// =============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::scanner::ScanReport;
use crate::types::{ScreenKind, Verdict, VerdictResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    reports: Vec<ScanReport>,
}

pub struct VerdictStore {
    reports: RwLock<Vec<ScanReport>>,
    path: Option<PathBuf>,
}

impl VerdictStore {
    /// In-memory store without persistence.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            reports: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Store backed by `path`. A missing file starts an empty store; an
    /// unreadable one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let reports = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read verdict store {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse verdict store {}", path.display()))?;
            info!(path = %path.display(), reports = snapshot.reports.len(), "verdict store loaded");
            snapshot.reports
        } else {
            warn!(path = %path.display(), "verdict store not found, starting empty");
            Vec::new()
        };
        Ok(Self {
            reports: RwLock::new(reports),
            path: Some(path),
        })
    }

    pub fn append(&self, report: ScanReport) {
        self.reports.write().push(report);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }

    /// Most recent report of `screen` that finished on `day` (UTC).
    pub fn latest_for_day(&self, screen: ScreenKind, day: NaiveDate) -> Option<ScanReport> {
        self.reports
            .read()
            .iter()
            .filter(|r| r.screen == screen && r.finished_at.date_naive() == day)
            .max_by_key(|r| r.finished_at)
            .cloned()
    }

    pub fn latest_for_today(&self, screen: ScreenKind) -> Option<ScanReport> {
        self.latest_for_day(screen, Utc::now().date_naive())
    }

    /// Latest passing verdict per option strategy (`None` if it never fired).
    pub fn latest_option_signals(&self) -> BTreeMap<&'static str, Option<Verdict>> {
        let reports = self.reports.read();
        ScreenKind::ALL
            .iter()
            .filter(|k| k.is_option_strategy())
            .map(|kind| {
                let latest = reports
                    .iter()
                    .filter(|r| r.screen == *kind)
                    .flat_map(|r| r.verdicts.iter())
                    .filter(|v| v.result == VerdictResult::Pass)
                    .max_by_key(|v| v.timestamp)
                    .cloned();
                (kind.as_str(), latest)
            })
            .collect()
    }

    /// Drop reports that started more than `days` days before `now`.
    /// Returns how many were removed.
    pub fn prune_older_than(&self, days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(days);
        let mut reports = self.reports.write();
        let before = reports.len();
        reports.retain(|r| r.started_at >= cutoff);
        before - reports.len()
    }

    /// Write the snapshot to the configured path (no-op when in memory).
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            reports: self.reports.read().clone(),
        };
        let content =
            serde_json::to_string(&snapshot).context("failed to serialise verdict store")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp store to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp store to {}", path.display()))?;

        info!(path = %path.display(), reports = snapshot.reports.len(), "verdict store saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn verdict(symbol: &str, screen: ScreenKind, result: VerdictResult, ts: DateTime<Utc>) -> Verdict {
        Verdict {
            instrument: symbol.to_string(),
            screen,
            timestamp: ts,
            result,
            details: None,
        }
    }

    fn report(screen: ScreenKind, finished: DateTime<Utc>, verdicts: Vec<Verdict>) -> ScanReport {
        ScanReport {
            run_id: Uuid::new_v4(),
            screen,
            started_at: finished - Duration::minutes(2),
            finished_at: finished,
            verdicts,
            skipped: vec![],
        }
    }

    #[test]
    fn latest_for_day_picks_most_recent_run() {
        let store = VerdictStore::in_memory();
        store.append(report(ScreenKind::Bora, at(10, 9), vec![]));
        let late = report(ScreenKind::Bora, at(10, 15), vec![]);
        let late_id = late.run_id;
        store.append(late);
        store.append(report(ScreenKind::Stage2, at(10, 18), vec![]));
        store.append(report(ScreenKind::Bora, at(11, 9), vec![]));

        let day = at(10, 0).date_naive();
        assert_eq!(store.latest_for_day(ScreenKind::Bora, day).unwrap().run_id, late_id);
        assert!(store.latest_for_day(ScreenKind::Canslim, day).is_none());
    }

    #[test]
    fn option_signals_keep_latest_pass() {
        let store = VerdictStore::in_memory();
        store.append(report(
            ScreenKind::LeapDip,
            at(3, 21),
            vec![verdict("QQQ", ScreenKind::LeapDip, VerdictResult::Pass, at(3, 20))],
        ));
        store.append(report(
            ScreenKind::LeapDip,
            at(4, 21),
            vec![verdict("QQQ", ScreenKind::LeapDip, VerdictResult::Fail, at(4, 20))],
        ));

        let signals = store.latest_option_signals();
        let dip = signals["leap_option_qqq"].as_ref().unwrap();
        assert_eq!(dip.timestamp, at(3, 20));
        assert!(signals["leap_option_qqq_gap"].is_none());
    }

    #[test]
    fn prune_removes_old_reports() {
        let store = VerdictStore::in_memory();
        store.append(report(ScreenKind::Bora, at(1, 12), vec![]));
        store.append(report(ScreenKind::Bora, at(20, 12), vec![]));
        let removed = store.prune_older_than(10, at(25, 12));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = std::env::temp_dir().join(format!("verdict-store-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("verdicts.json");

        let store = VerdictStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.append(report(
            ScreenKind::GoldenCross,
            at(5, 12),
            vec![verdict("AMD", ScreenKind::GoldenCross, VerdictResult::Pass, at(5, 0))],
        ));
        store.save().unwrap();

        let reopened = VerdictStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        let r = reopened
            .latest_for_day(ScreenKind::GoldenCross, at(5, 0).date_naive())
            .unwrap();
        assert_eq!(r.verdicts[0].instrument, "AMD");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn in_memory_save_is_noop() {
        VerdictStore::in_memory().save().unwrap();
    }
}
