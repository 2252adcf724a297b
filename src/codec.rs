//! # Raster Codec Module
//!
//! Primitive di basso livello sui pixel: decode, resample, encode.
//!
//! ## Responsabilità:
//! - `RasterCodec`: trait sincrono consumato dall'ottimizzatore (eseguito in
//!   `spawn_blocking`, mai sul thread del runtime)
//! - `RasterBuffer`: buffer RGBA in memoria + flag del canale alpha sorgente
//! - `ImageCodec`: implementazione di default
//!
//! ## Encoder utilizzati da `ImageCodec`:
//!
//! | Formato | Decode  | Encode                                      |
//! |---------|---------|---------------------------------------------|
//! | JPEG    | `image` | `mozjpeg`, progressive, huffman ottimizzato |
//! | PNG     | `image` | `png` (indexed via NeuQuant o RGB/RGBA)     |
//! | GIF     | `image` | `gif` con palette NeuQuant                  |
//!
//! Il resample usa sempre Lanczos3. Ogni encode parte da una copia dei soli
//! pixel: EXIF, ICC e commenti del file originale non vengono mai riscritti.

use crate::config::TransparencyScan;
use crate::error::CodecError;
use crate::policy::{Dimensions, EncodeParams, ImageFormat};
use color_quant::NeuQuant;
use image::imageops::FilterType;
use image::RgbaImage;
use std::borrow::Cow;

/// NeuQuant sampling factor upper bound (1 = every pixel, 30 = fastest)
const NEUQUANT_MAX_SAMPLE_FACTOR: usize = 10;

/// Alpha sotto questa soglia diventa l'indice trasparente della GIF
const GIF_ALPHA_CUTOFF: u8 = 128;

/// Decoded pixels of one image
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    pixels: RgbaImage,
    has_alpha_channel: bool,
}

impl RasterBuffer {
    pub fn new(pixels: RgbaImage, has_alpha_channel: bool) -> Self {
        Self {
            pixels,
            has_alpha_channel,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Whether the source carried an alpha channel
    pub fn has_alpha_channel(&self) -> bool {
        self.has_alpha_channel
    }

    /// Rileva la trasparenza secondo la strategia configurata
    pub fn has_transparency(&self, strategy: TransparencyScan) -> bool {
        if !self.has_alpha_channel {
            return false;
        }

        match strategy {
            TransparencyScan::Full => self.pixels.pixels().any(|p| p[3] < u8::MAX),
            TransparencyScan::TrustAlphaChannel => true,
        }
    }
}

/// Pixel primitives used by the single-asset optimizer
pub trait RasterCodec: Send + Sync {
    fn decode(&self, bytes: &[u8], format: ImageFormat) -> Result<RasterBuffer, CodecError>;

    fn resample(&self, buffer: &RasterBuffer, target: Dimensions) -> Result<RasterBuffer, CodecError>;

    fn encode(&self, buffer: &RasterBuffer, params: &EncodeParams) -> Result<Vec<u8>, CodecError>;
}

/// Codec di default basato su `image` + encoder dedicati per formato
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_jpeg(buffer: &RasterBuffer, quality: u8, progressive: bool) -> Result<Vec<u8>, CodecError> {
        let rgb: Vec<u8> = buffer
            .pixels
            .pixels()
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(buffer.width() as usize, buffer.height() as usize);
        comp.set_quality(f32::from(quality));
        if progressive {
            comp.set_progressive_mode();
        }
        comp.set_optimize_coding(true);

        let mut comp = comp.start_compress(Vec::new())?;
        comp.write_scanlines(&rgb)?;
        Ok(comp.finish()?)
    }

    fn encode_png_palette(buffer: &RasterBuffer, colors: u16, deflate_level: u8) -> Result<Vec<u8>, CodecError> {
        let (palette, indices) = quantize(&buffer.pixels, usize::from(colors));

        let mut output = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut output, buffer.width(), buffer.height());
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(palette);
            encoder.set_compression(png_compression(deflate_level));

            let mut writer = encoder.write_header()?;
            writer.write_image_data(&indices)?;
            writer.finish()?;
        }
        Ok(output)
    }

    fn encode_png_truecolor(buffer: &RasterBuffer, deflate_level: u8) -> Result<Vec<u8>, CodecError> {
        let (color, data): (png::ColorType, Cow<'_, [u8]>) = if buffer.has_alpha_channel {
            (png::ColorType::Rgba, Cow::Borrowed(buffer.pixels.as_raw()))
        } else {
            let rgb = buffer
                .pixels
                .pixels()
                .flat_map(|p| [p[0], p[1], p[2]])
                .collect();
            (png::ColorType::Rgb, Cow::Owned(rgb))
        };

        let mut output = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut output, buffer.width(), buffer.height());
            encoder.set_color(color);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_compression(png_compression(deflate_level));

            let mut writer = encoder.write_header()?;
            writer.write_image_data(&data)?;
            writer.finish()?;
        }
        Ok(output)
    }

    fn encode_gif(buffer: &RasterBuffer, colors: u16) -> Result<Vec<u8>, CodecError> {
        let (width, height) = match (u16::try_from(buffer.width()), u16::try_from(buffer.height())) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(CodecError::InvalidDimensions(buffer.width(), buffer.height())),
        };

        let transparent = buffer.has_alpha_channel
            && buffer.pixels.pixels().any(|p| p[3] < GIF_ALPHA_CUTOFF);

        // Un indice della palette resta riservato alla trasparenza
        let opaque_colors = if transparent { colors.saturating_sub(1) } else { colors };
        let (mut palette, mut indices) = quantize(&buffer.pixels, usize::from(opaque_colors));

        let transparent_index = if transparent {
            let index = (palette.len() / 3) as u8;
            palette.extend_from_slice(&[0, 0, 0]);
            for (slot, pixel) in indices.iter_mut().zip(buffer.pixels.pixels()) {
                if pixel[3] < GIF_ALPHA_CUTOFF {
                    *slot = index;
                }
            }
            Some(index)
        } else {
            None
        };

        let mut output = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut output, width, height, &palette)?;
            let frame = gif::Frame {
                width,
                height,
                transparent: transparent_index,
                buffer: Cow::Owned(indices),
                ..gif::Frame::default()
            };
            encoder.write_frame(&frame)?;
        }
        Ok(output)
    }
}

impl RasterCodec for ImageCodec {
    fn decode(&self, bytes: &[u8], format: ImageFormat) -> Result<RasterBuffer, CodecError> {
        let format = match format {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Gif => image::ImageFormat::Gif,
        };

        let decoded = image::load_from_memory_with_format(bytes, format)?;
        let has_alpha_channel = decoded.color().has_alpha();
        Ok(RasterBuffer::new(decoded.to_rgba8(), has_alpha_channel))
    }

    fn resample(&self, buffer: &RasterBuffer, target: Dimensions) -> Result<RasterBuffer, CodecError> {
        if target.width == 0 || target.height == 0 {
            return Err(CodecError::InvalidDimensions(target.width, target.height));
        }

        let resized = image::imageops::resize(
            &buffer.pixels,
            target.width,
            target.height,
            FilterType::Lanczos3,
        );
        Ok(RasterBuffer::new(resized, buffer.has_alpha_channel))
    }

    fn encode(&self, buffer: &RasterBuffer, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
        if buffer.width() == 0 || buffer.height() == 0 {
            return Err(CodecError::InvalidDimensions(buffer.width(), buffer.height()));
        }

        match *params {
            EncodeParams::Jpeg { quality, progressive } => Self::encode_jpeg(buffer, quality, progressive),
            EncodeParams::PngPalette { colors, deflate_level } => {
                Self::encode_png_palette(buffer, colors, deflate_level)
            }
            EncodeParams::PngTruecolor { deflate_level } => Self::encode_png_truecolor(buffer, deflate_level),
            EncodeParams::Gif { colors } => Self::encode_gif(buffer, colors),
        }
    }
}

/// Riduce i pixel a una palette RGB di al più `colors` voci, ritorna (palette, indici)
fn quantize(pixels: &RgbaImage, colors: usize) -> (Vec<u8>, Vec<u8>) {
    // Small images are sampled in full
    let pixel_count = pixels.as_raw().len() / 4;
    let sample_factor = (pixel_count / 1000).clamp(1, NEUQUANT_MAX_SAMPLE_FACTOR) as i32;

    let quantizer = NeuQuant::new(sample_factor, colors.clamp(2, 256), pixels.as_raw());
    let indices = pixels
        .pixels()
        .map(|p| quantizer.index_of(&p.0) as u8)
        .collect();
    (quantizer.color_map_rgb(), indices)
}

/// Deflate level (0-9) to the png crate's compression presets
fn png_compression(level: u8) -> png::Compression {
    match level {
        0 => png::Compression::NoCompression,
        1 => png::Compression::Fastest,
        2..=3 => png::Compression::Fast,
        4..=6 => png::Compression::Balanced,
        _ => png::Compression::High,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Codec sintetico per i test: nessun pixel reale, dimensioni di output controllate.

    use super::*;
    use std::io;

    /// Input che inizia con questo prefisso fallisce il decode
    pub const UNDECODABLE: &[u8] = b"BAD!";

    /// Decodes N input bytes into an N×1 buffer and encodes it to `ratio × N` bytes
    pub struct SyntheticCodec {
        pub ratio: f64,
    }

    impl SyntheticCodec {
        pub fn with_ratio(ratio: f64) -> Self {
            Self { ratio }
        }
    }

    impl RasterCodec for SyntheticCodec {
        fn decode(&self, bytes: &[u8], _format: ImageFormat) -> Result<RasterBuffer, CodecError> {
            if bytes.starts_with(UNDECODABLE) || bytes.is_empty() {
                return Err(CodecError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "synthetic decode failure",
                )));
            }
            Ok(RasterBuffer::new(RgbaImage::new(bytes.len() as u32, 1), false))
        }

        fn resample(&self, buffer: &RasterBuffer, target: Dimensions) -> Result<RasterBuffer, CodecError> {
            Ok(RasterBuffer::new(
                RgbaImage::new(target.width, target.height),
                buffer.has_alpha_channel,
            ))
        }

        fn encode(&self, buffer: &RasterBuffer, _params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
            let len = (f64::from(buffer.width()) * self.ratio).round() as usize;
            Ok(vec![0u8; len])
        }
    }
}
