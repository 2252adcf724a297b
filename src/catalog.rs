//! # Asset Catalog Module
//!
//! Questo modulo definisce l'interfaccia verso il catalogo degli asset e una
//! implementazione di default basata su file JSON.
//!
//! ## Responsabilità:
//! - `Catalog`: trait consumato dal motore (lookup path, derived sizes, record)
//! - `JsonCatalog`: catalogo persistito in un file JSON per libreria
//! - Registrazione degli asset tramite scansione di una directory
//! - Selezione paginata degli asset da (ri)ottimizzare
//!
//! ## Selezione degli asset:
//! - Solo asset con mime `image/*`
//! - Ordinati per id decrescente
//! - Inclusi se senza `OptimizationRecord` o se ottimizzati con settings
//!   di codifica (modalità/qualità) diversi da quelli richiesti
//!
//! ## Strategia di persistence:
//! - Un file JSON per libreria (basato su hash del path della root)
//! - Salvataggio in `<data_dir>/catalog_<hash>.json` dopo ogni modifica
//!
//! ## Esempio struttura catalog file:
//! ```json
//! {
//!   "next_id": 3,
//!   "assets": {
//!     "1": {
//!       "asset": { "id": 1, "file_path": "/media/a.jpg", "mime_type": "image/jpeg" },
//!       "derived_sizes": [{ "name": "150x150", "path": "/media/a-150x150.jpg" }],
//!       "record": null
//!     }
//!   }
//! }
//! ```

use crate::config::Settings;
use crate::error::CatalogError;
use crate::file_manager::{FileManager, LibraryImage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Identity of an asset in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored raster file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub file_path: PathBuf,
    pub mime_type: String,
}

/// Rendition secondaria di un asset (es. thumbnail)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedSize {
    pub name: String,
    pub path: PathBuf,
}

/// Result of the last successful optimization of an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub optimized: bool,
    pub original_size: u64,
    pub optimized_size: u64,
    pub savings_percent: f64,
    pub settings_used: Settings,
}

/// Storage of assets and their optimization records
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_asset(&self, id: AssetId) -> Result<Asset, CatalogError>;

    async fn get_asset_path(&self, id: AssetId) -> Result<PathBuf, CatalogError> {
        Ok(self.get_asset(id).await?.file_path)
    }

    async fn get_derived_sizes(&self, id: AssetId) -> Result<Vec<DerivedSize>, CatalogError>;

    async fn get_optimization_record(
        &self,
        id: AssetId,
    ) -> Result<Option<OptimizationRecord>, CatalogError>;

    async fn persist_optimization_record(
        &self,
        id: AssetId,
        record: &OptimizationRecord,
    ) -> Result<(), CatalogError>;

    async fn delete_optimization_record(&self, id: AssetId) -> Result<(), CatalogError>;

    /// Page of image assets that are not optimized with these settings, newest first
    async fn select_unoptimized(
        &self,
        settings: &Settings,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AssetId>, CatalogError>;

    /// All assets with their current record
    async fn list_assets(&self) -> Result<Vec<(Asset, Option<OptimizationRecord>)>, CatalogError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    asset: Asset,
    #[serde(default)]
    derived_sizes: Vec<DerivedSize>,
    #[serde(default)]
    record: Option<OptimizationRecord>,
}

/// Contenuto del file di catalogo
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    next_id: u64,
    assets: BTreeMap<AssetId, CatalogEntry>,
}

impl Default for CatalogFile {
    fn default() -> Self {
        Self {
            next_id: 1,
            assets: BTreeMap::new(),
        }
    }
}

/// Catalogo persistito su file JSON
pub struct JsonCatalog {
    catalog_file_path: PathBuf,
    state: Mutex<CatalogFile>,
}

impl JsonCatalog {
    /// Open (or create) the catalog stored at `path`
    pub async fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let state = if path.exists() {
            let content = fs::read_to_string(path).await?;
            serde_json::from_str(&content)?
        } else {
            CatalogFile::default()
        };

        Ok(Self {
            catalog_file_path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// Open the catalog of a library root inside the data directory
    pub async fn for_library(data_dir: &Path, library_root: &Path) -> Result<Self, CatalogError> {
        Self::open(&Self::catalog_path(data_dir, library_root)).await
    }

    /// Path del file di catalogo per una libreria (hash del path della root)
    pub fn catalog_path(data_dir: &Path, library_root: &Path) -> PathBuf {
        let hash = FileManager::library_hash(library_root);

        data_dir.join(format!("catalog_{}.json", hash))
    }

    async fn save(&self, state: &CatalogFile) -> Result<(), CatalogError> {
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&self.catalog_file_path, content).await?;
        Ok(())
    }

    /// Register an image and its derived sizes, returning the new id.
    ///
    /// A path that is already registered keeps its id; its derived sizes are replaced.
    pub async fn register(
        &self,
        file_path: &Path,
        mime_type: &str,
        derived_sizes: Vec<DerivedSize>,
    ) -> Result<AssetId, CatalogError> {
        let mut state = self.state.lock().await;

        if let Some(entry) = state
            .assets
            .values_mut()
            .find(|entry| entry.asset.file_path == file_path)
        {
            entry.derived_sizes = derived_sizes;
            let id = entry.asset.id;
            self.save(&state).await?;
            return Ok(id);
        }

        let id = AssetId(state.next_id);
        state.next_id += 1;
        state.assets.insert(
            id,
            CatalogEntry {
                asset: Asset {
                    id,
                    file_path: file_path.to_path_buf(),
                    mime_type: mime_type.to_string(),
                },
                derived_sizes,
                record: None,
            },
        );
        self.save(&state).await?;

        debug!("Registered asset {} -> {}", id, file_path.display());
        Ok(id)
    }

    /// Registra tutte le immagini trovate in una directory
    pub async fn scan_directory(&self, library_root: &Path) -> Result<Vec<AssetId>, CatalogError> {
        let images = FileManager::find_library_images(library_root)?;
        let mut ids = Vec::with_capacity(images.len());

        for LibraryImage {
            path,
            mime_type,
            derived_sizes,
        } in images
        {
            ids.push(self.register(&path, mime_type, derived_sizes).await?);
        }

        info!("Registered {} images from {}", ids.len(), library_root.display());
        Ok(ids)
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn get_asset(&self, id: AssetId) -> Result<Asset, CatalogError> {
        let state = self.state.lock().await;
        state
            .assets
            .get(&id)
            .map(|entry| entry.asset.clone())
            .ok_or(CatalogError::AssetNotFound(id))
    }

    async fn get_derived_sizes(&self, id: AssetId) -> Result<Vec<DerivedSize>, CatalogError> {
        let state = self.state.lock().await;
        state
            .assets
            .get(&id)
            .map(|entry| entry.derived_sizes.clone())
            .ok_or(CatalogError::AssetNotFound(id))
    }

    async fn get_optimization_record(
        &self,
        id: AssetId,
    ) -> Result<Option<OptimizationRecord>, CatalogError> {
        let state = self.state.lock().await;
        state
            .assets
            .get(&id)
            .map(|entry| entry.record.clone())
            .ok_or(CatalogError::AssetNotFound(id))
    }

    async fn persist_optimization_record(
        &self,
        id: AssetId,
        record: &OptimizationRecord,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.lock().await;
        let entry = state
            .assets
            .get_mut(&id)
            .ok_or(CatalogError::AssetNotFound(id))?;
        entry.record = Some(record.clone());
        self.save(&state).await
    }

    async fn delete_optimization_record(&self, id: AssetId) -> Result<(), CatalogError> {
        let mut state = self.state.lock().await;
        let entry = state
            .assets
            .get_mut(&id)
            .ok_or(CatalogError::AssetNotFound(id))?;
        entry.record = None;
        self.save(&state).await
    }

    async fn select_unoptimized(
        &self,
        settings: &Settings,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AssetId>, CatalogError> {
        let state = self.state.lock().await;
        let ids = state
            .assets
            .values()
            .rev()
            .filter(|entry| entry.asset.mime_type.starts_with("image/"))
            .filter(|entry| match &entry.record {
                None => true,
                Some(record) => !record.optimized || !record.settings_used.same_encoding(settings),
            })
            .skip(offset)
            .take(limit)
            .map(|entry| entry.asset.id)
            .collect();
        Ok(ids)
    }

    async fn list_assets(&self) -> Result<Vec<(Asset, Option<OptimizationRecord>)>, CatalogError> {
        let state = self.state.lock().await;
        Ok(state
            .assets
            .values()
            .map(|entry| (entry.asset.clone(), entry.record.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionMode;
    use tempfile::TempDir;

    fn record_with(settings: &Settings) -> OptimizationRecord {
        OptimizationRecord {
            optimized: true,
            original_size: 1000,
            optimized_size: 800,
            savings_percent: 20.0,
            settings_used: settings.clone(),
        }
    }

    #[tokio::test]
    async fn test_register_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let catalog = JsonCatalog::open(&path).await.unwrap();
        let id = catalog
            .register(Path::new("/media/a.jpg"), "image/jpeg", Vec::new())
            .await
            .unwrap();
        assert_eq!(id, AssetId(1));

        let again = catalog
            .register(Path::new("/media/a.jpg"), "image/jpeg", Vec::new())
            .await
            .unwrap();
        assert_eq!(again, id);

        let reopened = JsonCatalog::open(&path).await.unwrap();
        let asset = reopened.get_asset(id).await.unwrap();
        assert_eq!(asset.file_path, PathBuf::from("/media/a.jpg"));
        assert_eq!(asset.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_select_unoptimized_orders_and_filters() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = JsonCatalog::open(&temp_dir.path().join("catalog.json"))
            .await
            .unwrap();

        for name in ["a.jpg", "b.png", "c.gif", "d.jpg"] {
            let mime = FileManager::mime_for_path(Path::new(name)).unwrap();
            catalog
                .register(&temp_dir.path().join(name), mime, Vec::new())
                .await
                .unwrap();
        }
        catalog
            .register(&temp_dir.path().join("notes.txt"), "text/plain", Vec::new())
            .await
            .unwrap();

        let settings = Settings::default();
        let page = catalog.select_unoptimized(&settings, 10, 0).await.unwrap();
        assert_eq!(page, vec![AssetId(4), AssetId(3), AssetId(2), AssetId(1)]);

        catalog
            .persist_optimization_record(AssetId(3), &record_with(&settings))
            .await
            .unwrap();
        let page = catalog.select_unoptimized(&settings, 2, 1).await.unwrap();
        assert_eq!(page, vec![AssetId(2), AssetId(1)]);

        // Different quality makes the asset selectable again
        let other = settings.with_encoding(CompressionMode::Lossy, 50);
        let page = catalog.select_unoptimized(&other, 10, 0).await.unwrap();
        assert!(page.contains(&AssetId(3)));
    }

    #[tokio::test]
    async fn test_delete_record() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = JsonCatalog::open(&temp_dir.path().join("catalog.json"))
            .await
            .unwrap();
        let id = catalog
            .register(Path::new("/media/a.jpg"), "image/jpeg", Vec::new())
            .await
            .unwrap();

        catalog
            .persist_optimization_record(id, &record_with(&Settings::default()))
            .await
            .unwrap();
        assert!(catalog.get_optimization_record(id).await.unwrap().is_some());

        catalog.delete_optimization_record(id).await.unwrap();
        assert!(catalog.get_optimization_record(id).await.unwrap().is_none());

        assert!(matches!(
            catalog.get_asset(AssetId(42)).await,
            Err(CatalogError::AssetNotFound(AssetId(42)))
        ));
    }

    #[test]
    fn test_catalog_path_is_stable_per_library() {
        let data = Path::new("/data");
        let a = JsonCatalog::catalog_path(data, Path::new("/media/one"));
        let b = JsonCatalog::catalog_path(data, Path::new("/media/one"));
        let c = JsonCatalog::catalog_path(data, Path::new("/media/two"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
