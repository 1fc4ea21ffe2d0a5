// =============================================================================
// Instrument Universe — normalised symbol list with a TTL cache
// =============================================================================
//
// The universe comes from configuration (no constituent scraping).  Symbols
// are upper-cased, share-class dots become dashes (BRK.B -> BRK-B) and known
// unsupported tickers are dropped.  The normalised list is cached so repeated
// scans do not redo the work; `clear` forces a rebuild.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::cache::TtlCache;

const UNIVERSE_KEY: &str = "universe";

/// Normalise raw ticker strings into provider-compatible symbols.
pub fn normalise_symbols(raw: &[String], unsupported: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for s in raw {
        let upper = s.trim().to_uppercase();
        if upper.is_empty() || unsupported.iter().any(|u| u.eq_ignore_ascii_case(&upper)) {
            continue;
        }
        let symbol = upper.replace('.', "-");
        if !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            debug!(symbol = %symbol, "dropping symbol with unsupported characters");
            continue;
        }
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

/// Cached view of the configured instrument universe.
pub struct Universe {
    cache: TtlCache<&'static str, Arc<Vec<String>>>,
}

impl Universe {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::with_shards(ttl, 1),
        }
    }

    /// Return the cached universe, rebuilding it from `raw` when expired.
    pub fn symbols(&self, raw: &[String], unsupported: &[String]) -> Arc<Vec<String>> {
        if let Some(cached) = self.cache.get(&UNIVERSE_KEY) {
            return cached;
        }
        let symbols = Arc::new(normalise_symbols(raw, unsupported));
        info!(count = symbols.len(), "universe rebuilt");
        self.cache.insert(UNIVERSE_KEY, symbols.clone());
        symbols
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
