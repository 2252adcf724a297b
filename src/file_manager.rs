//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini in una libreria
//! - Riconoscimento delle derived sizes (`foto-150x150.jpg` → `foto.jpg`)
//! - Determinazione mime type dall'estensione
//! - Utilità per calcoli dimensioni e percentuali
//! - Hash della root usato per i file per libreria in `data_dir`
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, GIF
//!
//! ## Utilità:
//! - `format_size()`: Converte bytes in formato leggibile (KB, MB, GB)
//! - `savings_percent()`: Percentuale di risparmio arrotondata a 2 decimali
//!
//! ## Esempio:
//! ```rust,ignore
//! let images = FileManager::find_library_images(Path::new("/path/to/uploads"))?;
//! for image in images {
//!     println!("{} ({} derived sizes)", image.path.display(), image.derived_sizes.len());
//! }
//! ```

use crate::catalog::DerivedSize;
use std::collections::HashMap;
use std::io;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Immagine trovata nella libreria con le sue derived sizes
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryImage {
    pub path: PathBuf,
    pub mime_type: &'static str,
    pub derived_sizes: Vec<DerivedSize>,
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Hash breve della root di una libreria, usato nei nomi dei file di stato
    pub fn library_hash(library_root: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(library_root.to_string_lossy().as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }

    /// Mime type of a supported image, based on its extension
    pub fn mime_for_path(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "gif" => Some("image/gif"),
            _ => None,
        }
    }

    /// Check if a file is a supported image
    pub fn is_image(path: &Path) -> bool {
        Self::mime_for_path(path).is_some()
    }

    /// Find all supported images in a library, grouping derived sizes with their original
    pub fn find_library_images(library_root: &Path) -> io::Result<Vec<LibraryImage>> {
        if !library_root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Library directory does not exist: {}", library_root.display()),
            ));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(library_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::is_image(path))
            .collect();
        files.sort();

        let originals: HashMap<PathBuf, usize> = files
            .iter()
            .enumerate()
            .filter(|(_, path)| Self::derived_size_name(path).is_none())
            .map(|(index, path)| (path.clone(), index))
            .collect();

        let mut images: Vec<LibraryImage> = Vec::new();
        let mut slot_of: HashMap<usize, usize> = HashMap::new();
        let mut derived: Vec<(PathBuf, String, PathBuf)> = Vec::new();

        for (index, path) in files.iter().enumerate() {
            if let Some((parent_path, name)) = Self::derived_size_name(path) {
                if originals.contains_key(&parent_path) {
                    derived.push((parent_path, name, path.clone()));
                    continue;
                }
            }

            let Some(mime_type) = Self::mime_for_path(path) else {
                continue;
            };
            slot_of.insert(index, images.len());
            images.push(LibraryImage {
                path: path.clone(),
                mime_type,
                derived_sizes: Vec::new(),
            });
        }

        for (parent_path, name, path) in derived {
            if let Some(slot) = originals
                .get(&parent_path)
                .and_then(|index| slot_of.get(index))
            {
                images[*slot].derived_sizes.push(DerivedSize { name, path });
            }
        }

        Ok(images)
    }

    /// Se il file è una rendition `nome-LxA.ext`, ritorna il path dell'originale e `LxA`
    fn derived_size_name(path: &Path) -> Option<(PathBuf, String)> {
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?;
        let (base, dimensions) = stem.rsplit_once('-')?;
        let (width, height) = dimensions.split_once('x')?;

        let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if base.is_empty() || !is_number(width) || !is_number(height) {
            return None;
        }

        Some((
            path.with_file_name(format!("{}.{}", base, ext)),
            dimensions.to_string(),
        ))
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Percentuale di risparmio, arrotondata a 2 decimali (0 se le dimensioni coincidono)
    pub fn savings_percent(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 || new_size >= original_size {
            return 0.0;
        }
        let percent = (original_size - new_size) as f64 / original_size as f64 * 100.0;
        (percent * 100.0).round() / 100.0
    }
}
