mod read_tests;
mod recovery_tests;

use crate::LsmConfig;
use std::fs;
use std::path::Path;

/// A config with a tiny memtable and auto-compaction off, so tests control
/// exactly when segments appear.
pub fn small_config(memtable_threshold: usize) -> LsmConfig {
    LsmConfig {
        memtable_threshold,
        compaction_trigger: 0,
        ..LsmConfig::default()
    }
}

pub fn count_data_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "data")
                .unwrap_or(false)
        })
        .count()
}
