//! # Media Library Optimizer
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare del motore di ottimizzazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Settings per chiamata, configurazione e validazione
//! - `error`: Tipi di errore custom per ogni componente
//! - `catalog`: Interfaccia verso il catalogo asset + catalogo JSON di default
//! - `file_manager`: Discovery delle immagini e utilità sui file
//! - `policy`: Regole pure di resize e mappatura della qualità
//! - `codec`: Primitive raster (decode/resample/encode)
//! - `backup`: Backup e ripristino degli originali
//! - `optimizer`: Singolo asset, batch controller, job persistente
//! - `stats`: Statistiche cumulative, log e statistiche di libreria
//! - `service`: Handler dei protocolli batch/optimize/revert/stats
//! - `progress` / `json_output`: Feedback a terminale e output JSON
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use media_library_optimizer::{Config, ImageCodec, JsonCatalog, JsonStatsStore, OptimizerService};
//!
//! let config = Config::default();
//! let catalog = Arc::new(JsonCatalog::for_library(&config.data_dir, &library).await?);
//! catalog.scan_directory(&library).await?;
//! let stats = Arc::new(JsonStatsStore::for_library(&config.data_dir, &library));
//! let service = OptimizerService::new(config, catalog, Arc::new(ImageCodec::new()), stats);
//! ```

pub mod backup;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod policy;
pub mod progress;
pub mod service;
pub mod stats;

pub use backup::{BackupSlot, BackupStore};
pub use catalog::{Asset, AssetId, Catalog, DerivedSize, JsonCatalog, OptimizationRecord};
pub use codec::{ImageCodec, RasterBuffer, RasterCodec};
pub use config::{BackupKeying, CompressionMode, Config, Settings, TransparencyScan};
pub use error::{CatalogError, CodecError, OptimizeError, RestoreError, StatsError};
pub use optimizer::{
    AssetOptimizer, BatchController, BatchResult, JobRecord, JobRunner, JobState, JobStore, OptimizationOutcome,
};
pub use service::{BatchRequest, OptimizeRequest, OptimizerService, RevertRequest, StatisticsReport};
pub use stats::{GlobalStatistics, JsonStatsStore, LogSummary, MemoryStatsStore, StatisticsAggregator, StatsStore};
