use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::DF;
use crate::models::OhlcvTimeSeries;

/// Process-wide map from item to its last fetched dataset.
///
/// Cloning shares the same map. Concurrent stores of the same item are
/// last-writer-wins; readers always see a complete dataset.
#[derive(Clone, Default)]
pub struct SharedCache {
    inner: Arc<RwLock<HashMap<String, Arc<OhlcvTimeSeries>>>>,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: HashMap<String, OhlcvTimeSeries>) -> Self {
        let inner = map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<OhlcvTimeSeries>> {
        self.inner.read().get(symbol).cloned()
    }

    pub fn insert(&self, symbol: &str, dataset: Arc<OhlcvTimeSeries>) {
        if DF.log_cache {
            log::info!("CACHE: storing {} ({} rows)", symbol, dataset.klines());
        }
        self.inner.write().insert(symbol.to_string(), dataset);
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.inner.read().contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Owned copy of every dataset, for persistence
    pub fn snapshot(&self) -> HashMap<String, OhlcvTimeSeries> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), OhlcvTimeSeries::clone(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_utils::series_from_closes;

    #[test]
    fn clones_share_storage() {
        let cache = SharedCache::new();
        let other = cache.clone();
        cache.insert("A", Arc::new(series_from_closes("A", &[1.0, 2.0], 1.0)));
        assert!(other.contains("A"));
        assert_eq!(other.get("A").map(|d| d.klines()), Some(2));
    }

    #[test]
    fn last_writer_wins() {
        let cache = SharedCache::new();
        cache.insert("A", Arc::new(series_from_closes("A", &[1.0], 1.0)));
        cache.insert("A", Arc::new(series_from_closes("A", &[1.0, 2.0, 3.0], 1.0)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("A").map(|d| d.klines()), Some(3));
    }
}
