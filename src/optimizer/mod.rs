//! # Optimizer Module
//!
//! Motore di ottimizzazione separato in sottomoduli:
//! - `asset_optimizer`: pipeline della singola immagine (decode → encode → accept/reject)
//! - `batch_controller`: selezione paginata e processing sequenziale con isolamento
//! - `job`: job persistente con cursore durevole sopra i batch stateless

pub mod asset_optimizer;
pub mod batch_controller;
pub mod job;

pub use asset_optimizer::{AssetOptimizer, OptimizationOutcome, ACCEPT_THRESHOLD};
pub use batch_controller::{BatchController, BatchFailure, BatchItem, BatchResult};
pub use job::{JobRecord, JobRunner, JobState, JobStore};
