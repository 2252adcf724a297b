//! # Backup Store Module
//!
//! Copie byte-per-byte dei file originali, create prima di ogni modifica.
//!
//! ## Responsabilità:
//! - Calcolo dello slot di backup per un file (per asset id o per nome file)
//! - Creazione del backup al massimo una volta per slot
//! - Ripristino dell'originale (e delle derived sizes) + rimozione del record
//! - Conteggio dei backup presenti
//!
//! ## Layout su disco:
//! ```text
//! BackupKeying::AssetId   <backup_dir>/<asset_id>/<file name>
//! BackupKeying::Filename  <backup_dir>/<file name>
//! ```
//!
//! Con `Filename` due asset con lo stesso nome file condividono lo slot: il
//! secondo non viene mai salvato e il suo revert ripristina il primo.
//!
//! ## Ciclo di vita di uno slot:
//! `vuoto → presente` (prima ottimizzazione) `→ vuoto` (revert). Una volta
//! presente non viene mai sovrascritto: la creazione passa da un file
//! temporaneo rinominato senza clobber.

use crate::catalog::{AssetId, Catalog};
use crate::config::BackupKeying;
use crate::error::RestoreError;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Location of the backup copy of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSlot {
    path: PathBuf,
}

impl BackupSlot {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Gestisce i backup degli originali
#[derive(Debug, Clone)]
pub struct BackupStore {
    backup_dir: PathBuf,
    keying: BackupKeying,
}

impl BackupStore {
    pub fn new(backup_dir: impl Into<PathBuf>, keying: BackupKeying) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            keying,
        }
    }

    /// Slot for a file belonging to an asset (the original or one of its derived sizes)
    pub fn slot(&self, asset_id: AssetId, file_path: &Path) -> BackupSlot {
        let file_name = file_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| asset_id.to_string().into());

        let path = match self.keying {
            BackupKeying::AssetId => self.backup_dir.join(asset_id.to_string()).join(file_name),
            BackupKeying::Filename => self.backup_dir.join(file_name),
        };
        BackupSlot { path }
    }

    pub fn exists(&self, slot: &BackupSlot) -> bool {
        slot.path.is_file()
    }

    /// Copy `source` into an empty slot. Returns `false` when the slot was already taken.
    pub async fn backup(&self, source: &Path, slot: &BackupSlot) -> io::Result<bool> {
        if self.exists(slot) {
            debug!("Backup already present: {}", slot.path.display());
            return Ok(false);
        }

        let source = source.to_path_buf();
        let target = slot.path.clone();
        let created = tokio::task::spawn_blocking(move || copy_once(&source, &target))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        if created {
            debug!("Backup created: {}", slot.path.display());
        }
        Ok(created)
    }

    /// Ripristina l'originale di un asset e cancella il suo record di ottimizzazione.
    ///
    /// Derived sizes with a backup are restored too. Every restored backup is removed,
    /// so a second revert fails with `BackupNotFound`. The record is cleared before
    /// any backup is consumed: a failure after that point leaves the backup in place
    /// and the asset selectable again.
    pub async fn restore(&self, asset_id: AssetId, catalog: &dyn Catalog) -> Result<(), RestoreError> {
        let file_path = catalog.get_asset_path(asset_id).await?;
        let slot = self.slot(asset_id, &file_path);

        if !self.exists(&slot) {
            return Err(RestoreError::BackupNotFound(asset_id));
        }

        let derived_sizes = catalog.get_derived_sizes(asset_id).await?;
        catalog.delete_optimization_record(asset_id).await?;

        restore_file(&slot, &file_path)
            .await
            .map_err(RestoreError::CopyFailed)?;

        let mut derived_restored = 0;
        for derived in derived_sizes {
            let derived_slot = self.slot(asset_id, &derived.path);
            if derived_slot == slot || !self.exists(&derived_slot) {
                continue;
            }
            match restore_file(&derived_slot, &derived.path).await {
                Ok(()) => derived_restored += 1,
                Err(e) => warn!(
                    "Failed to restore derived size {} of asset {}: {}",
                    derived.name, asset_id, e
                ),
            }
        }

        if self.keying == BackupKeying::AssetId {
            if let Some(asset_dir) = slot.path.parent() {
                // Rimuove la directory solo se vuota
                let _ = tokio::fs::remove_dir(asset_dir).await;
            }
        }

        info!(
            "Restored asset {} from backup ({} derived sizes)",
            asset_id, derived_restored
        );
        Ok(())
    }

    /// Number of backup files currently stored
    pub async fn count(&self) -> io::Result<usize> {
        let backup_dir = self.backup_dir.clone();
        tokio::task::spawn_blocking(move || {
            if !backup_dir.is_dir() {
                return 0;
            }
            WalkDir::new(&backup_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| !e.file_name().to_string_lossy().starts_with(".tmp"))
                .count()
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Scrive `source` in `target` solo se `target` non esiste ancora
fn copy_once(source: &Path, target: &Path) -> io::Result<bool> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "backup slot has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    let mut source_file = std::fs::File::open(source)?;
    io::copy(&mut source_file, temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    match temp.persist_noclobber(target) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

/// Copia il backup sopra il file e rimuove lo slot
async fn restore_file(slot: &BackupSlot, target: &Path) -> io::Result<()> {
    let source = slot.path.clone();
    let target = target.to_path_buf();

    tokio::task::spawn_blocking(move || -> io::Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file has no parent"))?;
        std::fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        let mut backup_file = std::fs::File::open(&source)?;
        io::copy(&mut backup_file, temp.as_file_mut())?;
        temp.persist(&target).map_err(|e| e.error)?;

        std::fs::remove_file(&source)
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}
