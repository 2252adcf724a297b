//! # Batch Controller Module
//!
//! Orchestratore dei batch di ottimizzazione.
//!
//! ## Responsabilità:
//! - Selezione di una pagina di asset non ancora ottimizzati con i settings richiesti
//! - Processing strettamente sequenziale, un asset alla volta
//! - Isolamento: il fallimento di un asset viene registrato, il batch prosegue
//! - Ri-ottimizzazione delle derived sizes con gli stessi settings
//! - Persistenza del record e aggiornamento delle statistiche dopo ogni successo
//!
//! Il controller è stateless: l'offset appartiene al chiamante. Gli asset
//! ottimizzati con successo escono dalla selezione, quindi un client che
//! avanza l'offset del numero di asset processati salta elementi. Vedi
//! `job::JobRunner` per un cursore che avanza solo dei fallimenti.

use super::asset_optimizer::{AssetOptimizer, OptimizationOutcome};
use crate::catalog::{Asset, AssetId, Catalog, OptimizationRecord};
use crate::config::Settings;
use crate::error::{CatalogError, OptimizeError};
use crate::file_manager::FileManager;
use crate::stats::StatisticsAggregator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A successfully processed asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: AssetId,
    pub bytes_saved: u64,
    /// Derived sizes that were re-optimized without error
    pub derived_optimized: usize,
    pub outcome: OptimizationOutcome,
}

/// A failed asset with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: AssetId,
    pub reason: String,
}

/// Risultato di un batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub succeeded: Vec<BatchItem>,
    pub failed: Vec<BatchFailure>,
    pub total_saved_bytes: u64,
    /// Number of ids returned by the selection
    pub selected: usize,
}

impl BatchResult {
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Processa batch di asset dal catalogo
pub struct BatchController {
    catalog: Arc<dyn Catalog>,
    optimizer: AssetOptimizer,
    stats: StatisticsAggregator,
}

impl BatchController {
    pub fn new(catalog: Arc<dyn Catalog>, optimizer: AssetOptimizer, stats: StatisticsAggregator) -> Self {
        Self {
            catalog,
            optimizer,
            stats,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn optimizer(&self) -> &AssetOptimizer {
        &self.optimizer
    }

    pub fn stats(&self) -> &StatisticsAggregator {
        &self.stats
    }

    /// Optimize up to `limit` unoptimized assets starting at `offset` in the selection
    pub async fn run_batch(
        &self,
        limit: usize,
        offset: usize,
        settings: &Settings,
    ) -> Result<BatchResult, CatalogError> {
        let ids = self.catalog.select_unoptimized(settings, limit, offset).await?;
        info!(
            "Batch: {} assets selected (limit {}, offset {})",
            ids.len(),
            limit,
            offset
        );

        let mut result = BatchResult {
            selected: ids.len(),
            ..Default::default()
        };

        for id in ids {
            match self.optimize_asset(id, settings).await {
                Ok(item) => {
                    result.total_saved_bytes += item.bytes_saved;
                    result.succeeded.push(item);
                }
                Err(e) => {
                    error!("Failed to optimize asset {}: {}", id, e);
                    result.failed.push(BatchFailure {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Batch done: {} optimized, {} failed, {} saved",
            result.succeeded.len(),
            result.failed.len(),
            FileManager::format_size(result.total_saved_bytes)
        );
        Ok(result)
    }

    /// Ottimizza un singolo asset: file principale, record, derived sizes, statistiche
    pub async fn optimize_asset(&self, id: AssetId, settings: &Settings) -> Result<BatchItem, OptimizeError> {
        let asset = self.catalog.get_asset(id).await?;
        let backups = self.optimizer.backups();
        let slot = settings
            .backup_original
            .then(|| backups.slot(id, &asset.file_path));

        let outcome = self
            .optimizer
            .optimize(&asset.file_path, &asset.mime_type, slot.as_ref(), settings)
            .await?;

        let record = OptimizationRecord {
            optimized: true,
            original_size: outcome.original_size,
            optimized_size: outcome.optimized_size,
            savings_percent: outcome.savings_percent,
            settings_used: settings.clone(),
        };
        // Il file è già stato sostituito: un record non salvato non annulla il successo
        if let Err(e) = self.catalog.persist_optimization_record(id, &record).await {
            warn!("Failed to persist optimization record of asset {}: {}", id, e);
        }

        let derived_optimized = self.optimize_derived_sizes(&asset, settings).await;

        if let Err(e) = self
            .stats
            .record(id, &outcome, settings.compression_mode)
            .await
        {
            warn!("Failed to record statistics for asset {}: {}", id, e);
        }

        Ok(BatchItem {
            id,
            bytes_saved: outcome.saved_bytes(),
            derived_optimized,
            outcome,
        })
    }

    /// Re-optimize every derived size of an asset; failures are logged and skipped
    async fn optimize_derived_sizes(&self, asset: &Asset, settings: &Settings) -> usize {
        let derived_sizes = match self.catalog.get_derived_sizes(asset.id).await {
            Ok(sizes) => sizes,
            Err(e) => {
                warn!("Could not list derived sizes of asset {}: {}", asset.id, e);
                return 0;
            }
        };

        let backups = self.optimizer.backups();
        let mut optimized = 0;
        for derived in derived_sizes {
            let mime_type = FileManager::mime_for_path(&derived.path).unwrap_or(asset.mime_type.as_str());
            let slot = settings
                .backup_original
                .then(|| backups.slot(asset.id, &derived.path));

            match self
                .optimizer
                .optimize(&derived.path, mime_type, slot.as_ref(), settings)
                .await
            {
                Ok(outcome) => {
                    debug!(
                        "Derived size {} of asset {}: {:.2}% saved",
                        derived.name, asset.id, outcome.savings_percent
                    );
                    optimized += 1;
                }
                Err(e) => warn!(
                    "Failed to optimize derived size {} of asset {}: {}",
                    derived.name, asset.id, e
                ),
            }
        }
        optimized
    }
}
