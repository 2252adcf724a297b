//! # Progress Tracking Module
//!
//! Questo modulo gestisce il progress tracking a terminale durante i run lunghi.
//!
//! ## Responsabilità:
//! - Progress bar visuale con `indicatif` per il comando `run`
//! - Spinner per operazioni indeterminate (scan della libreria)
//! - `RunTally`: conteggi del run corrente (ottimizzati, sotto soglia, errori)
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [=====================>------------------] 150/280 (53%) batch 30: 5 ok, 0 failed
//! ```

use crate::file_manager::FileManager;
use crate::optimizer::BatchResult;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages the progress bar of a library run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total_assets: u64) -> Self {
        let bar = ProgressBar::new(total_assets);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Avanza di `processed` asset
    pub fn advance(&self, processed: u64, message: &str) {
        self.bar.inc(processed);
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Counters of the current run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunTally {
    pub assets_processed: usize,
    /// File sostituiti
    pub assets_optimized: usize,
    /// Sotto soglia, originale intatto
    pub assets_unchanged: usize,
    pub derived_optimized: usize,
    pub errors: usize,
    pub total_bytes_saved: u64,
    pub total_original_size: u64,
}

impl RunTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch(&mut self, result: &BatchResult) {
        for item in &result.succeeded {
            self.assets_processed += 1;
            if item.outcome.replaced {
                self.assets_optimized += 1;
            } else {
                self.assets_unchanged += 1;
            }
            self.derived_optimized += item.derived_optimized;
            self.total_original_size += item.outcome.original_size;
            self.total_bytes_saved += item.bytes_saved;
        }
        self.assets_processed += result.failed.len();
        self.errors += result.failed.len();
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} | Optimized: {} | Unchanged: {} | Errors: {} | Derived sizes: {} | Total saved: {} ({:.2}%)",
            self.assets_processed,
            self.assets_optimized,
            self.assets_unchanged,
            self.errors,
            self.derived_optimized,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AssetId;
    use crate::optimizer::{BatchFailure, BatchItem, OptimizationOutcome};

    fn item(id: u64, original_size: u64, optimized_size: u64, replaced: bool) -> BatchItem {
        BatchItem {
            id: AssetId(id),
            bytes_saved: original_size - optimized_size,
            derived_optimized: 2,
            outcome: OptimizationOutcome {
                original_size,
                optimized_size,
                savings_percent: 0.0,
                replaced,
            },
        }
    }

    #[test]
    fn test_tally_counts_batches() {
        let mut tally = RunTally::new();
        tally.add_batch(&BatchResult {
            succeeded: vec![item(3, 1000, 500, true), item(2, 1000, 1000, false)],
            failed: vec![BatchFailure {
                id: AssetId(1),
                reason: "Decode failed".to_string(),
            }],
            total_saved_bytes: 500,
            selected: 3,
        });

        assert_eq!(tally.assets_processed, 3);
        assert_eq!(tally.assets_optimized, 1);
        assert_eq!(tally.assets_unchanged, 1);
        assert_eq!(tally.errors, 1);
        assert_eq!(tally.derived_optimized, 4);
        assert_eq!(tally.total_bytes_saved, 500);
        assert_eq!(tally.overall_reduction_percent(), 25.0);
        assert!(tally.format_summary().contains("Errors: 1"));
    }
}
