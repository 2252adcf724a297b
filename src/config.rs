//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `Settings`: i parametri di una singola chiamata di ottimizzazione
//! - Definisce `Config`: settings di default + directory di backup e dati
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//!
//! ## Parametri di ottimizzazione (`Settings`):
//! - `compression_mode`: Lossy o Lossless (default: Lossy)
//! - `quality`: 0-100, mappata sui parametri di ogni encoder (default: 80)
//! - `max_width` / `max_height`: accettati e validati, la regola di resize usa
//!   comunque il limite fisso di 1140px (default: 2048)
//! - `auto_optimize`: ottimizzazione automatica all'upload (default: true)
//! - `backup_original`: crea il backup prima di modificare (default: true)
//! - `batch_size`: dimensione della pagina di un batch (default: 5)
//! - `transparency_scan`: strategia di rilevamento trasparenza PNG (default: Full)
//!
//! I `Settings` sono immutabili per chiamata: vengono passati ogni volta,
//! nessuna mutazione globale durante un run.
//!
//! ## Esempio:
//! ```rust,ignore
//! let settings = Settings {
//!     quality: 60,
//!     compression_mode: CompressionMode::Lossy,
//!     ..Default::default()
//! };
//! settings.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether the encoder may discard visual information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    #[default]
    Lossy,
    Lossless,
}

impl CompressionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMode::Lossy => "lossy",
            CompressionMode::Lossless => "lossless",
        }
    }
}

impl std::str::FromStr for CompressionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lossy" => Ok(Self::Lossy),
            "lossless" => Ok(Self::Lossless),
            other => Err(anyhow::anyhow!("Unknown compression mode: {}", other)),
        }
    }
}

/// Strategia per decidere se un PNG contiene trasparenza
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyScan {
    /// Scansione completa di ogni pixel, O(width × height)
    #[default]
    Full,
    /// Considera trasparente ogni buffer con canale alpha, senza scansione
    TrustAlphaChannel,
}

/// How backup slots are addressed inside the backup directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackupKeying {
    /// `<backup_dir>/<asset_id>/<file name>`
    #[default]
    AssetId,
    /// `<backup_dir>/<file name>`: two assets with the same file name share one slot
    Filename,
}

/// Parameters of a single optimization call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compression_mode: CompressionMode,
    /// Quality knob (0-100)
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub auto_optimize: bool,
    pub backup_original: bool,
    pub batch_size: usize,
    pub transparency_scan: TransparencyScan,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compression_mode: CompressionMode::Lossy,
            quality: 80,
            max_width: 2048,
            max_height: 2048,
            auto_optimize: true,
            backup_original: true,
            batch_size: 5,
            transparency_scan: TransparencyScan::Full,
        }
    }
}

impl Settings {
    /// Settings derivati con modalità e qualità di una richiesta
    pub fn with_encoding(&self, compression_mode: CompressionMode, quality: u8) -> Self {
        Self {
            compression_mode,
            quality,
            ..self.clone()
        }
    }

    /// True when both settings produce the same encoder parameters.
    ///
    /// Only mode and quality take part: a record made with different
    /// dimensions or batch size is still considered up to date.
    pub fn same_encoding(&self, other: &Settings) -> bool {
        self.compression_mode == other.compression_mode && self.quality == other.quality
    }

    /// Validate optimization parameters
    pub fn validate(&self) -> Result<()> {
        if self.quality > 100 {
            return Err(anyhow::anyhow!("Quality must be between 0 and 100"));
        }

        if self.max_width == 0 || self.max_height == 0 {
            return Err(anyhow::anyhow!("Maximum dimensions must be greater than 0"));
        }

        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("Batch size must be greater than 0"));
        }

        Ok(())
    }
}

/// Configuration for the media library optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default optimization settings
    pub settings: Settings,
    /// Directory holding the original copies
    pub backup_dir: PathBuf,
    /// Directory holding catalog, statistics, log and job files
    pub data_dir: PathBuf,
    /// Backup slot addressing
    pub backup_keying: BackupKeying,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".media-library-optimizer");

        Self {
            settings: Settings::default(),
            backup_dir: data_dir.join("backups"),
            data_dir,
            backup_keying: BackupKeying::AssetId,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        if self.backup_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Backup directory must not be empty"));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Data directory must not be empty"));
        }

        if self.backup_dir.exists() && !self.backup_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "Backup path is not a directory: {}",
                self.backup_dir.display()
            ));
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.quality = 0;
        assert!(settings.validate().is_ok());

        settings.quality = 101;
        assert!(settings.validate().is_err());

        settings.quality = 80;
        settings.batch_size = 0;
        assert!(settings.validate().is_err());

        settings.batch_size = 5;
        settings.max_width = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.compression_mode, CompressionMode::Lossy);
        assert_eq!(settings.quality, 80);
        assert_eq!(settings.max_width, 2048);
        assert_eq!(settings.max_height, 2048);
        assert!(settings.auto_optimize);
        assert!(settings.backup_original);
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.transparency_scan, TransparencyScan::Full);
    }

    #[test]
    fn test_same_encoding_ignores_non_encoder_fields() {
        let base = Settings::default();
        let resized = Settings {
            max_width: 800,
            batch_size: 20,
            ..Settings::default()
        };
        assert!(base.same_encoding(&resized));
        assert!(!base.same_encoding(&base.with_encoding(CompressionMode::Lossy, 60)));
        assert!(!base.same_encoding(&base.with_encoding(CompressionMode::Lossless, 80)));
    }

    #[test]
    fn test_compression_mode_parse() {
        assert_eq!("LOSSY".parse::<CompressionMode>().unwrap(), CompressionMode::Lossy);
        assert_eq!("lossless".parse::<CompressionMode>().unwrap(), CompressionMode::Lossless);
        assert!("webp".parse::<CompressionMode>().is_err());
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            settings: Settings {
                quality: 65,
                compression_mode: CompressionMode::Lossless,
                batch_size: 10,
                ..Default::default()
            },
            backup_dir: temp_dir.path().join("backups"),
            data_dir: temp_dir.path().join("data"),
            backup_keying: BackupKeying::Filename,
            json_output: true,
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.settings, original_config.settings);
        assert_eq!(loaded_config.backup_dir, original_config.backup_dir);
        assert_eq!(loaded_config.backup_keying, BackupKeying::Filename);
        assert!(loaded_config.json_output);
    }

    #[tokio::test]
    async fn test_config_missing_file_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("missing.json"))
            .await
            .unwrap();
        assert_eq!(config.settings, Settings::default());
    }
}
