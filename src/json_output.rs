//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico (`--json`).
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Converte i risultati di batch, asset e statistiche in eventi
//!
//! ## Tipi di messaggi:
//! - `scanned`: libreria registrata nel catalogo
//! - `start`: inizio di un run sulla libreria
//! - `asset_complete`: asset ottimizzato (anche sotto soglia)
//! - `asset_failed`: asset fallito con il motivo
//! - `batch_complete`: fine di un batch con cursore del job
//! - `reverted`: originale ripristinato
//! - `stats`: report completo delle statistiche
//! - `complete`: fine del run con i totali
//! - `error`: errore generale

use crate::catalog::AssetId;
use crate::config::{CompressionMode, Settings};
use crate::optimizer::{BatchItem, BatchResult};
use crate::progress::RunTally;
use crate::service::StatisticsReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Scanned {
        library: PathBuf,
        registered: usize,
    },

    Start {
        library: PathBuf,
        total_assets: usize,
        settings: JsonSettings,
    },

    AssetComplete {
        id: AssetId,
        original_size: u64,
        optimized_size: u64,
        savings_percent: f64,
        replaced: bool,
        derived_optimized: usize,
    },

    AssetFailed {
        id: AssetId,
        reason: String,
    },

    BatchComplete {
        selected: usize,
        succeeded: usize,
        failed: usize,
        bytes_saved: u64,
        cursor: Option<usize>,
    },

    Reverted {
        id: AssetId,
    },

    Stats {
        report: StatisticsReport,
    },

    Complete {
        assets_processed: usize,
        assets_optimized: usize,
        assets_unchanged: usize,
        errors: usize,
        total_bytes_saved: u64,
        duration_seconds: f64,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

/// Settings riportati nell'evento di start
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonSettings {
    pub compression_mode: CompressionMode,
    pub quality: u8,
    pub batch_size: usize,
}

impl From<&Settings> for JsonSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            compression_mode: settings.compression_mode,
            quality: settings.quality,
            batch_size: settings.batch_size,
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn asset_complete(item: &BatchItem) -> Self {
        Self::AssetComplete {
            id: item.id,
            original_size: item.outcome.original_size,
            optimized_size: item.outcome.optimized_size,
            savings_percent: item.outcome.savings_percent,
            replaced: item.outcome.replaced,
            derived_optimized: item.derived_optimized,
        }
    }

    /// Eventi per ogni asset del batch seguiti dal riepilogo
    pub fn from_batch(result: &BatchResult, cursor: Option<usize>) -> Vec<Self> {
        let mut messages: Vec<Self> = result.succeeded.iter().map(Self::asset_complete).collect();
        messages.extend(result.failed.iter().map(|failure| Self::AssetFailed {
            id: failure.id,
            reason: failure.reason.clone(),
        }));
        messages.push(Self::BatchComplete {
            selected: result.selected,
            succeeded: result.succeeded.len(),
            failed: result.failed.len(),
            bytes_saved: result.total_saved_bytes,
            cursor,
        });
        messages
    }

    pub fn complete(tally: &RunTally, duration_seconds: f64) -> Self {
        Self::Complete {
            assets_processed: tally.assets_processed,
            assets_optimized: tally.assets_optimized,
            assets_unchanged: tally.assets_unchanged,
            errors: tally.errors,
            total_bytes_saved: tally.total_bytes_saved,
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
