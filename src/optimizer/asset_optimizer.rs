//! # Asset Optimizer Module
//!
//! Pipeline di ottimizzazione di un singolo file immagine.
//!
//! ## Pipeline:
//! 1. Lettura del file (`NotFound` → `FileNotFound`)
//! 2. Backup dell'originale se lo slot è vuoto (un fallimento è solo un warning)
//! 3. Decode → piano (resize + parametri) → resample → encode, in un task bloccante
//! 4. Scrittura su file temporaneo accanto all'originale
//! 5. Accept/reject: sostituzione solo se `optimized < original × 0.95`
//! 6. Rename atomico sopra l'originale, oppure scarto del temporaneo
//!
//! Un risultato sotto soglia è un successo con `savings_percent = 0` e
//! `optimized_size = original_size`. Buffer e file temporaneo vengono
//! rilasciati su ogni percorso d'uscita.

use crate::backup::{BackupSlot, BackupStore};
use crate::codec::RasterCodec;
use crate::config::{CompressionMode, Settings};
use crate::error::{CodecError, OptimizeError};
use crate::file_manager::FileManager;
use crate::policy::{self, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Il file viene sostituito solo sotto questa frazione della dimensione originale
pub const ACCEPT_THRESHOLD: f64 = 0.95;

/// Result of optimizing one file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub original_size: u64,
    pub optimized_size: u64,
    pub savings_percent: f64,
    /// Whether the file on disk was replaced
    pub replaced: bool,
}

impl OptimizationOutcome {
    fn unchanged(original_size: u64) -> Self {
        Self {
            original_size,
            optimized_size: original_size,
            savings_percent: 0.0,
            replaced: false,
        }
    }

    pub fn saved_bytes(&self) -> u64 {
        self.original_size.saturating_sub(self.optimized_size)
    }
}

/// Ottimizzatore della singola immagine
#[derive(Clone)]
pub struct AssetOptimizer {
    codec: Arc<dyn RasterCodec>,
    backups: BackupStore,
}

impl AssetOptimizer {
    pub fn new(codec: Arc<dyn RasterCodec>, backups: BackupStore) -> Self {
        Self { codec, backups }
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Optimize `file_path` in place
    pub async fn optimize(
        &self,
        file_path: &Path,
        mime_type: &str,
        backup_slot: Option<&BackupSlot>,
        settings: &Settings,
    ) -> Result<OptimizationOutcome, OptimizeError> {
        let format = ImageFormat::from_mime(mime_type)
            .ok_or_else(|| OptimizeError::UnsupportedFormat(mime_type.to_string()))?;

        let original = match tokio::fs::read(file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OptimizeError::FileNotFound(file_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let original_size = original.len() as u64;

        if let Some(slot) = backup_slot {
            if let Err(e) = self.backups.backup(file_path, slot).await {
                warn!("Failed to back up {}: {}", file_path.display(), e);
            }
        }

        let codec = Arc::clone(&self.codec);
        let mime = mime_type.to_string();
        let settings = settings.clone();
        let encoded = tokio::task::spawn_blocking(move || run_pipeline(codec.as_ref(), &original, format, &mime, &settings))
            .await
            .map_err(|e| OptimizeError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        let target = file_path.to_path_buf();
        let (optimized_size, replaced) = tokio::task::spawn_blocking(move || commit(&target, &encoded, original_size))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        if !replaced {
            debug!(
                "Insufficient reduction for {} ({} -> {} bytes), keeping original",
                file_path.display(),
                original_size,
                optimized_size
            );
            return Ok(OptimizationOutcome::unchanged(original_size));
        }

        let savings_percent = FileManager::savings_percent(original_size, optimized_size);
        debug!(
            "Optimized {}: {} -> {} ({:.2}% saved)",
            file_path.display(),
            FileManager::format_size(original_size),
            FileManager::format_size(optimized_size),
            savings_percent
        );

        Ok(OptimizationOutcome {
            original_size,
            optimized_size,
            savings_percent,
            replaced: true,
        })
    }
}

/// Regola di accettazione
pub fn is_accepted(original_size: u64, optimized_size: u64) -> bool {
    (optimized_size as f64) < original_size as f64 * ACCEPT_THRESHOLD
}

/// Decode, plan, resample and encode. Runs on a blocking thread.
fn run_pipeline(
    codec: &dyn RasterCodec,
    bytes: &[u8],
    format: ImageFormat,
    mime_type: &str,
    settings: &Settings,
) -> Result<Vec<u8>, OptimizeError> {
    let buffer = stage(|| codec.decode(bytes, format), OptimizeError::DecodeFailed)?;

    // La trasparenza conta solo per i PNG lossy
    let has_transparency = format == ImageFormat::Png
        && settings.compression_mode == CompressionMode::Lossy
        && buffer.has_transparency(settings.transparency_scan);

    let plan = policy::plan(buffer.width(), buffer.height(), mime_type, settings, has_transparency)
        .ok_or_else(|| OptimizeError::UnsupportedFormat(mime_type.to_string()))?;

    let buffer = match plan.resize {
        Some(target) => {
            debug!(
                "Resizing {}x{} -> {}x{}",
                buffer.width(),
                buffer.height(),
                target.width,
                target.height
            );
            stage(|| codec.resample(&buffer, target), OptimizeError::ResizeFailed)?
        }
        None => buffer,
    };

    stage(|| codec.encode(&buffer, &plan.params), OptimizeError::EncodeFailed)
}

/// Esegue una fase del codec convertendo errori e panic nell'errore della fase
fn stage<T>(
    operation: impl FnOnce() -> Result<T, CodecError>,
    stage_error: fn(String) -> OptimizeError,
) -> Result<T, OptimizeError> {
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(stage_error(e.to_string())),
        Err(_) => Err(stage_error("codec panicked".to_string())),
    }
}

/// Writes the candidate next to `target` and renames it over `target` when accepted.
///
/// Returns the candidate size and whether it replaced the original. A rejected
/// candidate is deleted when the temp file handle drops.
fn commit(target: &Path, encoded: &[u8], original_size: u64) -> io::Result<(u64, bool)> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(&dir)?;
    temp.write_all(encoded)?;
    temp.as_file().sync_all()?;

    let optimized_size = temp.as_file().metadata()?.len();
    if !is_accepted(original_size, optimized_size) {
        return Ok((optimized_size, false));
    }

    if let Ok(metadata) = std::fs::metadata(target) {
        let _ = std::fs::set_permissions(temp.path(), metadata.permissions());
    }
    temp.persist(target).map_err(|e| e.error)?;
    Ok((optimized_size, true))
}
