use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::config::{PERSISTENCE, cache_filename};
use crate::data::SharedCache;
use crate::models::OhlcvTimeSeries;

/// Binary cache file wrapper with metadata
#[derive(Serialize, Deserialize, Debug)]
struct CacheFile {
    pub version: f64,
    pub timestamp_ms: i64,
    pub duration: String,
    pub data: HashMap<String, OhlcvTimeSeries>,
}

/// Default location of the cache file for a candle duration
pub fn default_cache_path(duration: &str) -> PathBuf {
    PathBuf::from(PERSISTENCE.cache.directory).join(cache_filename(duration))
}

// Helper function to create a new file and any missing parent directories.
pub(crate) fn create_file_with_parents(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))
}

/// Write every cached dataset to `path` (bincode).
pub fn save_cache(cache: &SharedCache, duration: &str, path: &Path) -> Result<usize> {
    let start_time = std::time::Instant::now();
    let file = create_file_with_parents(path)?;
    let writer = BufWriter::new(file);

    let data = cache.snapshot();
    let count = data.len();
    let cache_file = CacheFile {
        version: PERSISTENCE.cache.version,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        duration: duration.to_string(),
        data,
    };

    bincode::serialize_into(writer, &cache_file)
        .with_context(|| format!("Failed to serialize cache to: {}", path.display()))?;

    log::info!(
        "Cache written: {} items to {} in {:.2}s",
        count,
        path.display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(count)
}

/// Read a cache file written by [`save_cache`]. Version and duration must match.
pub fn load_cache(path: &Path, duration: &str) -> Result<SharedCache> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    let reader = BufReader::new(file);
    let cache_file: CacheFile = bincode::deserialize_from(reader)
        .with_context(|| format!("Failed to deserialize cache from: {:?}", path))?;

    if cache_file.version != PERSISTENCE.cache.version {
        bail!(
            "Cache version mismatch: file v{} vs required v{}",
            cache_file.version,
            PERSISTENCE.cache.version
        );
    }
    if cache_file.duration != duration {
        bail!(
            "Cache duration mismatch: file has {}, expected {}",
            cache_file.duration,
            duration
        );
    }

    log::info!(
        "Cache loaded: {} items from {}",
        cache_file.data.len(),
        path.display()
    );
    Ok(SharedCache::from_map(cache_file.data))
}
