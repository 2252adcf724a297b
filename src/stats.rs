//! # Statistics Module
//!
//! Statistiche cumulative delle ottimizzazioni e log persistente.
//!
//! ## Responsabilità:
//! - `StatisticsAggregator`: aggiorna i totali in O(1) a ogni ottimizzazione
//! - `StatsStore`: confine di persistenza iniettato (file JSON o memoria)
//! - Log delle ottimizzazioni con riepilogo in byte e storico recente
//! - `LibraryStatistics`: statistiche calcolate dai record del catalogo
//!
//! ## Due medie distinte:
//! - `GlobalStatistics::average_savings_percent`: media incrementale delle
//!   percentuali, `avg = (avg × n + pct) / (n + 1)`
//! - `LogSummary::average_saved_bytes`: byte risparmiati / voci del log
//!
//! Le due metriche non vengono mai fuse. Il revert non sottrae nulla ai totali.
//!
//! ## File per libreria (in `data_dir`):
//! - `stats_<hash>.json`: totali correnti
//! - `log_<hash>.jsonl`: una `LogEntry` JSON per riga

use crate::catalog::{Asset, AssetId, OptimizationRecord};
use crate::config::CompressionMode;
use crate::file_manager::FileManager;
use crate::error::StatsError;
use crate::optimizer::OptimizationOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Running totals over every successful optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStatistics {
    pub total_optimized: u64,
    pub total_saved_bytes: u64,
    pub average_savings_percent: f64,
}

impl GlobalStatistics {
    /// Aggiunge un risultato ai totali
    pub fn fold(&mut self, saved_bytes: u64, savings_percent: f64) {
        let count = self.total_optimized as f64;
        self.average_savings_percent = (self.average_savings_percent * count + savings_percent) / (count + 1.0);
        self.total_optimized += 1;
        self.total_saved_bytes += saved_bytes;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    /// Il file è stato sostituito
    Optimized,
    /// Risparmio sotto soglia, originale intatto
    Skipped,
}

/// One line of the optimization log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    pub asset_id: AssetId,
    pub original_size: u64,
    pub optimized_size: u64,
    pub savings_percent: f64,
    pub compression_mode: CompressionMode,
    pub status: LogStatus,
}

/// Bytes-based summary of the log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub entries: usize,
    pub total_saved_bytes: u64,
    pub average_saved_bytes: f64,
}

impl LogSummary {
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        let total_saved_bytes: u64 = entries
            .iter()
            .map(|e| e.original_size.saturating_sub(e.optimized_size))
            .sum();
        let average_saved_bytes = if entries.is_empty() {
            0.0
        } else {
            total_saved_bytes as f64 / entries.len() as f64
        };

        Self {
            entries: entries.len(),
            total_saved_bytes,
            average_saved_bytes,
        }
    }
}

/// Statistiche della libreria calcolate dai record del catalogo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryStatistics {
    pub total_images: usize,
    pub optimized_images: usize,
    pub total_saved_bytes: u64,
    /// Mean of per-record percent, one decimal
    pub average_savings_percent: f64,
}

impl LibraryStatistics {
    pub fn from_assets(assets: &[(Asset, Option<OptimizationRecord>)]) -> Self {
        let images: Vec<_> = assets
            .iter()
            .filter(|(asset, _)| asset.mime_type.starts_with("image/"))
            .collect();

        let records: Vec<&OptimizationRecord> = images
            .iter()
            .filter_map(|(_, record)| record.as_ref())
            .filter(|record| record.optimized)
            .collect();

        let total_saved_bytes = records
            .iter()
            .map(|r| r.original_size.saturating_sub(r.optimized_size))
            .sum();
        let average_savings_percent = if records.is_empty() {
            0.0
        } else {
            let mean = records.iter().map(|r| r.savings_percent).sum::<f64>() / records.len() as f64;
            (mean * 10.0).round() / 10.0
        };

        Self {
            total_images: images.len(),
            optimized_images: records.len(),
            total_saved_bytes,
            average_savings_percent,
        }
    }
}

/// Persistence boundary for statistics and log
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn load(&self) -> Result<GlobalStatistics, StatsError>;

    async fn save(&self, stats: &GlobalStatistics) -> Result<(), StatsError>;

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StatsError>;

    async fn read_log(&self) -> Result<Vec<LogEntry>, StatsError>;
}

/// Store su file JSON, uno per libreria
pub struct JsonStatsStore {
    stats_file_path: PathBuf,
    log_file_path: PathBuf,
}

impl JsonStatsStore {
    pub fn new(stats_file_path: PathBuf, log_file_path: PathBuf) -> Self {
        Self {
            stats_file_path,
            log_file_path,
        }
    }

    /// Files of a library root inside the data directory
    pub fn for_library(data_dir: &Path, library_root: &Path) -> Self {
        let hash = FileManager::library_hash(library_root);

        Self::new(
            data_dir.join(format!("stats_{}.json", hash)),
            data_dir.join(format!("log_{}.jsonl", hash)),
        )
    }

    async fn ensure_parent(path: &Path) -> Result<(), StatsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StatsStore for JsonStatsStore {
    async fn load(&self) -> Result<GlobalStatistics, StatsError> {
        if !self.stats_file_path.exists() {
            return Ok(GlobalStatistics::default());
        }
        let content = fs::read_to_string(&self.stats_file_path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, stats: &GlobalStatistics) -> Result<(), StatsError> {
        Self::ensure_parent(&self.stats_file_path).await?;
        let content = serde_json::to_string_pretty(stats)?;
        fs::write(&self.stats_file_path, content).await?;
        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StatsError> {
        Self::ensure_parent(&self.log_file_path).await?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_log(&self) -> Result<Vec<LogEntry>, StatsError> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.log_file_path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StatsError::from))
            .collect()
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStatsStore {
    stats: Mutex<GlobalStatistics>,
    log: Mutex<Vec<LogEntry>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn load(&self) -> Result<GlobalStatistics, StatsError> {
        Ok(self.stats.lock().await.clone())
    }

    async fn save(&self, stats: &GlobalStatistics) -> Result<(), StatsError> {
        *self.stats.lock().await = stats.clone();
        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StatsError> {
        self.log.lock().await.push(entry.clone());
        Ok(())
    }

    async fn read_log(&self) -> Result<Vec<LogEntry>, StatsError> {
        Ok(self.log.lock().await.clone())
    }
}

/// Aggiorna statistiche e log tramite lo store iniettato
#[derive(Clone)]
pub struct StatisticsAggregator {
    store: Arc<dyn StatsStore>,
    update_lock: Arc<Mutex<()>>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self {
            store,
            update_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Fold one successful outcome into the totals and append it to the log
    pub async fn record(
        &self,
        asset_id: AssetId,
        outcome: &OptimizationOutcome,
        compression_mode: CompressionMode,
    ) -> Result<GlobalStatistics, StatsError> {
        let _guard = self.update_lock.lock().await;

        let mut stats = self.store.load().await?;
        stats.fold(outcome.saved_bytes(), outcome.savings_percent);
        self.store.save(&stats).await?;

        let entry = LogEntry {
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            asset_id,
            original_size: outcome.original_size,
            optimized_size: outcome.optimized_size,
            savings_percent: outcome.savings_percent,
            compression_mode,
            status: if outcome.replaced {
                LogStatus::Optimized
            } else {
                LogStatus::Skipped
            },
        };
        self.store.append_log(&entry).await?;

        debug!(
            "Statistics updated: {} optimized, {} bytes saved, {:.2}% average",
            stats.total_optimized, stats.total_saved_bytes, stats.average_savings_percent
        );
        Ok(stats)
    }

    pub async fn current(&self) -> Result<GlobalStatistics, StatsError> {
        self.store.load().await
    }

    pub async fn log_summary(&self) -> Result<LogSummary, StatsError> {
        Ok(LogSummary::from_entries(&self.store.read_log().await?))
    }

    /// Ultime `limit` voci del log, dalla più recente
    pub async fn history(&self, limit: usize) -> Result<Vec<LogEntry>, StatsError> {
        let mut entries = self.store.read_log().await?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use tempfile::TempDir;

    fn outcome(original_size: u64, optimized_size: u64, savings_percent: f64) -> OptimizationOutcome {
        OptimizationOutcome {
            original_size,
            optimized_size,
            savings_percent,
            replaced: optimized_size < original_size,
        }
    }

    #[tokio::test]
    async fn test_incremental_average() {
        let aggregator = StatisticsAggregator::new(Arc::new(MemoryStatsStore::new()));

        for (i, pct) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            aggregator
                .record(AssetId(i as u64 + 1), &outcome(100, 100 - pct as u64, pct), CompressionMode::Lossy)
                .await
                .unwrap();
        }

        let stats = aggregator.current().await.unwrap();
        assert_eq!(stats.total_optimized, 3);
        assert_eq!(stats.total_saved_bytes, 60);
        assert!((stats.average_savings_percent - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_below_threshold_counts_as_optimized() {
        let aggregator = StatisticsAggregator::new(Arc::new(MemoryStatsStore::new()));
        aggregator
            .record(AssetId(1), &outcome(1000, 1000, 0.0), CompressionMode::Lossless)
            .await
            .unwrap();

        let stats = aggregator.current().await.unwrap();
        assert_eq!(stats.total_optimized, 1);
        assert_eq!(stats.total_saved_bytes, 0);

        let history = aggregator.history(10).await.unwrap();
        assert_eq!(history[0].status, LogStatus::Skipped);
    }

    #[tokio::test]
    async fn test_log_summary_is_bytes_based() {
        let aggregator = StatisticsAggregator::new(Arc::new(MemoryStatsStore::new()));
        aggregator
            .record(AssetId(1), &outcome(1000, 500, 50.0), CompressionMode::Lossy)
            .await
            .unwrap();
        aggregator
            .record(AssetId(2), &outcome(100, 90, 10.0), CompressionMode::Lossy)
            .await
            .unwrap();

        let summary = aggregator.log_summary().await.unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.total_saved_bytes, 510);
        assert_eq!(summary.average_saved_bytes, 255.0);

        // The percent average stays separate
        let stats = aggregator.current().await.unwrap();
        assert_eq!(stats.average_savings_percent, 30.0);

        let history = aggregator.history(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].asset_id, AssetId(2));
    }

    #[tokio::test]
    async fn test_json_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let library = Path::new("/media/library");

        let aggregator = StatisticsAggregator::new(Arc::new(JsonStatsStore::for_library(
            temp_dir.path(),
            library,
        )));
        aggregator
            .record(AssetId(5), &outcome(2000, 1000, 50.0), CompressionMode::Lossy)
            .await
            .unwrap();

        let reopened = StatisticsAggregator::new(Arc::new(JsonStatsStore::for_library(
            temp_dir.path(),
            library,
        )));
        let stats = reopened.current().await.unwrap();
        assert_eq!(stats.total_optimized, 1);
        assert_eq!(stats.total_saved_bytes, 1000);
        assert_eq!(reopened.log_summary().await.unwrap().entries, 1);
    }

    #[test]
    fn test_library_statistics() {
        let asset = |id: u64, mime: &str| Asset {
            id: AssetId(id),
            file_path: PathBuf::from(format!("/media/{}", id)),
            mime_type: mime.to_string(),
        };
        let record = |pct: f64, original: u64, optimized: u64| OptimizationRecord {
            optimized: true,
            original_size: original,
            optimized_size: optimized,
            savings_percent: pct,
            settings_used: Settings::default(),
        };

        let assets = vec![
            (asset(1, "image/jpeg"), Some(record(10.0, 100, 90))),
            (asset(2, "image/png"), Some(record(25.25, 400, 299))),
            (asset(3, "image/gif"), None),
            (asset(4, "application/pdf"), None),
        ];

        let stats = LibraryStatistics::from_assets(&assets);
        assert_eq!(stats.total_images, 3);
        assert_eq!(stats.optimized_images, 2);
        assert_eq!(stats.total_saved_bytes, 111);
        assert_eq!(stats.average_savings_percent, 17.6);
    }

    #[test]
    fn test_history_newest_first() {
        let aggregator = StatisticsAggregator::new(Arc::new(MemoryStatsStore::new()));

        tokio_test::block_on(async {
            for id in 1..=3 {
                aggregator
                    .record(AssetId(id), &outcome(100, 80, 20.0), CompressionMode::Lossy)
                    .await
                    .unwrap();
            }

            let history = aggregator.history(2).await.unwrap();
            let ids: Vec<_> = history.iter().map(|entry| entry.asset_id).collect();
            assert_eq!(ids, vec![AssetId(3), AssetId(2)]);
            assert!(aggregator.history(0).await.unwrap().is_empty());
        });
    }
}
