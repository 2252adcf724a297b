//! # Optimization Policy Module
//!
//! Funzioni pure che decidono se e come ridimensionare un'immagine e con quali
//! parametri codificarla. Nessun I/O, nessun accesso ai pixel.
//!
//! ## Regola di resize:
//! - Larghezza > 1140px: larghezza = 1140, altezza = round(1140 × h / w)
//! - Larghezza ≤ 1140px: dimensioni invariate (mai upscaling)
//! - Il limite è fisso: `max_width`/`max_height` dei settings non partecipano
//!
//! ## Mappatura della qualità (0-100):
//!
//! | Formato | Lossy                                  | Lossless                          |
//! |---------|----------------------------------------|-----------------------------------|
//! | JPEG    | quality = min(100, q), progressive     | quality = 92, progressive         |
//! | PNG     | palette clamp(16, 256, round(2.56 q)), deflate 9 (se opaco) | truecolor, deflate clamp(0, 9, round(9 (100-q) / 100)) |
//! | GIF     | palette clamp(32, 256, round(2.56 q))  | palette 256                       |
//!
//! Un PNG lossy con trasparenza usa la codifica truecolor come il lossless.

use crate::config::{CompressionMode, Settings};
use serde::{Deserialize, Serialize};

/// Larghezza massima oltre la quale l'immagine viene ridotta
pub const MAX_WIDTH: u32 = 1140;

/// Qualità JPEG usata in modalità lossless
pub const LOSSLESS_JPEG_QUALITY: u8 = 92;

/// Deflate level for palette PNGs
pub const PALETTE_PNG_DEFLATE_LEVEL: u8 = 9;

/// Supported raster formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// Target dimensions of a resample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Format-specific parameters handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncodeParams {
    Jpeg { quality: u8, progressive: bool },
    /// Immagine palettizzata, senza trasparenza
    PngPalette { colors: u16, deflate_level: u8 },
    /// Full color, alpha preservato se presente nel sorgente
    PngTruecolor { deflate_level: u8 },
    Gif { colors: u16 },
}

/// Decisione completa per una singola immagine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodePlan {
    pub format: ImageFormat,
    pub resize: Option<Dimensions>,
    pub params: EncodeParams,
}

/// Build the plan for an image. `None` means the mime type is unsupported.
///
/// `has_transparency` is only consulted for lossy PNGs.
pub fn plan(
    width: u32,
    height: u32,
    mime_type: &str,
    settings: &Settings,
    has_transparency: bool,
) -> Option<EncodePlan> {
    let format = ImageFormat::from_mime(mime_type)?;
    Some(EncodePlan {
        format,
        resize: resize_target(width, height),
        params: encode_params(format, settings, has_transparency),
    })
}

/// Dimensioni di destinazione, `None` se non serve ridimensionare
pub fn resize_target(width: u32, height: u32) -> Option<Dimensions> {
    if width <= MAX_WIDTH || height == 0 {
        return None;
    }

    let new_height = (MAX_WIDTH as f64 * height as f64 / width as f64).round() as u32;
    Some(Dimensions {
        width: MAX_WIDTH,
        height: new_height.max(1),
    })
}

/// Encoder parameters for a format
pub fn encode_params(format: ImageFormat, settings: &Settings, has_transparency: bool) -> EncodeParams {
    let quality = settings.quality.min(100);
    let lossy = settings.compression_mode == CompressionMode::Lossy;

    match format {
        ImageFormat::Jpeg => EncodeParams::Jpeg {
            quality: if lossy { quality } else { LOSSLESS_JPEG_QUALITY },
            progressive: true,
        },
        ImageFormat::Png if lossy && !has_transparency => EncodeParams::PngPalette {
            colors: palette_colors(quality, 16),
            deflate_level: PALETTE_PNG_DEFLATE_LEVEL,
        },
        ImageFormat::Png => EncodeParams::PngTruecolor {
            deflate_level: png_deflate_level(quality),
        },
        ImageFormat::Gif => EncodeParams::Gif {
            colors: if lossy { palette_colors(quality, 32) } else { 256 },
        },
    }
}

/// `clamp(min_colors, 256, round(256 * quality / 100))`
pub fn palette_colors(quality: u8, min_colors: u16) -> u16 {
    let colors = (256.0 * f64::from(quality.min(100)) / 100.0).round() as u16;
    colors.clamp(min_colors, 256)
}

/// Higher quality means lower deflate effort: `clamp(0, 9, round(9 * (100 - q) / 100))`
pub fn png_deflate_level(quality: u8) -> u8 {
    let level = (9.0 * f64::from(100 - quality.min(100)) / 100.0).round() as u8;
    level.min(9)
}
