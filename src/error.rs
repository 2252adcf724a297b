//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - `OptimizeError`: errori terminali per la singola immagine (mai per il batch)
//! - `RestoreError`: errori del protocollo di revert
//! - `CatalogError`: errori del catalogo asset (collaboratore esterno)
//! - `CodecError`: errori delle primitive raster (decode/resample/encode)
//! - `StatsError`: errori di persistenza delle statistiche
//!
//! ## Categorie di errori per l'ottimizzazione:
//! - `FileNotFound`: il file dell'asset non esiste
//! - `DecodeFailed` / `ResizeFailed` / `EncodeFailed`: fallimento di una fase del codec
//! - `UnsupportedFormat`: mime type senza piano di codifica
//! - `Io`: errori di copia/rename
//!
//! Un risultato sotto la soglia di risparmio NON è un errore: viene riportato
//! come successo con `savings_percent = 0`.

use crate::catalog::AssetId;
use std::path::PathBuf;

/// Errors terminal for a single asset optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Resize failed: {0}")]
    ResizeFailed(String),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Errors returned by the revert protocol
#[derive(thiserror::Error, Debug)]
pub enum RestoreError {
    #[error("Backup not found for asset {0}")]
    BackupNotFound(AssetId),

    #[error("Failed to restore original image: {0}")]
    CopyFailed(#[source] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Errors raised by the asset catalog
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("Asset not found: {0}")]
    AssetNotFound(AssetId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog file is corrupted: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by the raster codec primitives
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),

    #[error("GIF encoding error: {0}")]
    Gif(#[from] gif::EncodingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid dimensions {0}x{1}")]
    InvalidDimensions(u32, u32),
}

/// Errors raised by the statistics store
#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Statistics file is corrupted: {0}")]
    Serde(#[from] serde_json::Error),
}
