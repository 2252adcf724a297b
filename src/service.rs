//! # Service Module
//!
//! Punto d'ingresso dei protocolli esposti: batch, singolo asset, revert, statistiche.
//!
//! ## Protocolli:
//! - `BatchRequest { batch_size, offset, compression_mode, quality }` → `BatchResult`
//! - `OptimizeRequest { asset_id, compression_mode, quality }` → `BatchItem`
//! - `RevertRequest { asset_id }` → `()` | `BackupNotFound` | `CopyFailed`
//! - statistiche → `StatisticsReport`
//!
//! Ogni richiesta costruisce i propri `Settings` partendo dalla configurazione:
//! nessuno stato globale viene modificato durante un run.
//!
//! ## Esempio:
//! ```rust,ignore
//! let service = OptimizerService::new(config, catalog, Arc::new(ImageCodec::new()), stats_store);
//! let result = service
//!     .batch(&BatchRequest { batch_size: 5, offset: 0, compression_mode: CompressionMode::Lossy, quality: 80 })
//!     .await?;
//! ```

use crate::backup::BackupStore;
use crate::catalog::{AssetId, Catalog};
use crate::codec::RasterCodec;
use crate::config::{CompressionMode, Config, Settings};
use crate::error::RestoreError;
use crate::optimizer::{AssetOptimizer, BatchController, BatchItem, BatchResult, JobRunner, JobStore};
use crate::stats::{GlobalStatistics, LibraryStatistics, LogEntry, LogSummary, StatisticsAggregator, StatsStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub batch_size: usize,
    #[serde(default)]
    pub offset: usize,
    pub compression_mode: CompressionMode,
    pub quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeRequest {
    pub asset_id: AssetId,
    pub compression_mode: CompressionMode,
    pub quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertRequest {
    pub asset_id: AssetId,
}

/// Tutte le statistiche disponibili in un'unica risposta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub global: GlobalStatistics,
    pub log: LogSummary,
    pub library: LibraryStatistics,
    pub total_backups: usize,
    pub recent: Vec<LogEntry>,
}

/// Wires catalog, codec, backups and statistics behind the request handlers
pub struct OptimizerService {
    config: Config,
    controller: BatchController,
}

impl OptimizerService {
    pub fn new(
        config: Config,
        catalog: Arc<dyn Catalog>,
        codec: Arc<dyn RasterCodec>,
        stats_store: Arc<dyn StatsStore>,
    ) -> Self {
        let backups = BackupStore::new(config.backup_dir.clone(), config.backup_keying);
        let controller = BatchController::new(
            catalog,
            AssetOptimizer::new(codec, backups),
            StatisticsAggregator::new(stats_store),
        );
        Self { config, controller }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &BatchController {
        &self.controller
    }

    /// Settings di default con modalità e qualità della richiesta
    pub fn settings_for(&self, compression_mode: CompressionMode, quality: u8) -> Result<Settings> {
        let settings = self.config.settings.with_encoding(compression_mode, quality);
        settings.validate()?;
        Ok(settings)
    }

    pub async fn batch(&self, request: &BatchRequest) -> Result<BatchResult> {
        let mut settings = self.settings_for(request.compression_mode, request.quality)?;
        settings.batch_size = request.batch_size;
        settings.validate()?;

        Ok(self
            .controller
            .run_batch(settings.batch_size, request.offset, &settings)
            .await?)
    }

    pub async fn optimize(&self, request: &OptimizeRequest) -> Result<BatchItem> {
        let settings = self.settings_for(request.compression_mode, request.quality)?;
        Ok(self.controller.optimize_asset(request.asset_id, &settings).await?)
    }

    pub async fn revert(&self, request: &RevertRequest) -> Result<(), RestoreError> {
        self.controller
            .optimizer()
            .backups()
            .restore(request.asset_id, self.controller.catalog().as_ref())
            .await?;
        info!("Reverted asset {}", request.asset_id);
        Ok(())
    }

    pub async fn statistics(&self, recent: usize) -> Result<StatisticsReport> {
        let stats = self.controller.stats();
        let assets = self.controller.catalog().list_assets().await?;

        Ok(StatisticsReport {
            global: stats.current().await?,
            log: stats.log_summary().await?,
            library: LibraryStatistics::from_assets(&assets),
            total_backups: self.controller.optimizer().backups().count().await?,
            recent: stats.history(recent).await?,
        })
    }

    /// Job runner over this service's batch controller
    pub fn job_runner(&self, store: JobStore) -> JobRunner<'_> {
        JobRunner::new(&self.controller, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::JsonCatalog;
    use crate::codec::testing::SyntheticCodec;
    use crate::config::BackupKeying;
    use crate::stats::MemoryStatsStore;
    use std::path::Path;
    use tempfile::TempDir;

    async fn service(temp_dir: &TempDir) -> (OptimizerService, Arc<JsonCatalog>) {
        let catalog = Arc::new(
            JsonCatalog::open(&temp_dir.path().join("catalog.json"))
                .await
                .unwrap(),
        );
        let config = Config {
            backup_dir: temp_dir.path().join("backups"),
            data_dir: temp_dir.path().join("data"),
            backup_keying: BackupKeying::AssetId,
            ..Default::default()
        };
        let service = OptimizerService::new(
            config,
            catalog.clone(),
            Arc::new(SyntheticCodec::with_ratio(0.6)),
            Arc::new(MemoryStatsStore::new()),
        );
        (service, catalog)
    }

    async fn add_image(temp_dir: &TempDir, catalog: &JsonCatalog, name: &str, bytes: &[u8]) -> AssetId {
        let path = temp_dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        catalog.register(&path, "image/jpeg", Vec::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_optimize_then_revert() {
        let temp_dir = TempDir::new().unwrap();
        let (service, catalog) = service(&temp_dir).await;
        let original = vec![5u8; 1000];
        let id = add_image(&temp_dir, &catalog, "photo.jpg", &original).await;

        let item = service
            .optimize(&OptimizeRequest {
                asset_id: id,
                compression_mode: CompressionMode::Lossy,
                quality: 70,
            })
            .await
            .unwrap();
        assert_eq!(item.outcome.optimized_size, 600);
        assert_eq!(item.outcome.savings_percent, 40.0);

        let record = catalog.get_optimization_record(id).await.unwrap().unwrap();
        assert_eq!(record.settings_used.quality, 70);

        service.revert(&RevertRequest { asset_id: id }).await.unwrap();
        assert_eq!(std::fs::read(temp_dir.path().join("photo.jpg")).unwrap(), original);
        assert!(catalog.get_optimization_record(id).await.unwrap().is_none());

        assert!(matches!(
            service.revert(&RevertRequest { asset_id: id }).await,
            Err(RestoreError::BackupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_request_validation() {
        let temp_dir = TempDir::new().unwrap();
        let (service, _) = service(&temp_dir).await;

        let invalid_quality = BatchRequest {
            batch_size: 5,
            offset: 0,
            compression_mode: CompressionMode::Lossy,
            quality: 101,
        };
        assert!(service.batch(&invalid_quality).await.is_err());

        let empty_batch = BatchRequest {
            batch_size: 0,
            quality: 80,
            ..invalid_quality
        };
        assert!(service.batch(&empty_batch).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_request_parses_from_json() {
        let request: BatchRequest = serde_json::from_str(
            r#"{"batch_size": 5, "compression_mode": "lossless", "quality": 90}"#,
        )
        .unwrap();
        assert_eq!(request.offset, 0);
        assert_eq!(request.compression_mode, CompressionMode::Lossless);
    }

    #[tokio::test]
    async fn test_statistics_report() {
        let temp_dir = TempDir::new().unwrap();
        let (service, catalog) = service(&temp_dir).await;
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            add_image(&temp_dir, &catalog, name, &[1u8; 1000]).await;
        }
        catalog
            .register(Path::new("/media/manual.pdf"), "application/pdf", Vec::new())
            .await
            .unwrap();

        let result = service
            .batch(&BatchRequest {
                batch_size: 2,
                offset: 0,
                compression_mode: CompressionMode::Lossy,
                quality: 80,
            })
            .await
            .unwrap();
        assert_eq!(result.selected, 2);

        let report = service.statistics(10).await.unwrap();
        assert_eq!(report.global.total_optimized, 2);
        assert_eq!(report.global.total_saved_bytes, 800);
        assert_eq!(report.log.entries, 2);
        assert_eq!(report.log.average_saved_bytes, 400.0);
        assert_eq!(report.library.total_images, 3);
        assert_eq!(report.library.optimized_images, 2);
        assert_eq!(report.library.average_savings_percent, 40.0);
        assert_eq!(report.total_backups, 2);
        assert_eq!(report.recent.len(), 2);
    }
}
