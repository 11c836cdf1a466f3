use std::{io::Cursor, path::Path};

use anyhow::Context;
use image::{imageops::FilterType, ColorType, DynamicImage, GenericImageView, ImageOutputFormat};
use tracing::{debug, info};

use crate::config::UploadConfig;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageValidationError {
    #[error("file is too large ({size} bytes, limit is {limit})")]
    TooLarge { size: usize, limit: usize },
    #[error("unsupported file extension {0:?}")]
    UnsupportedExtension(String),
    #[error("file is not a readable image")]
    Undecodable,
}

/// Lower-cased extension of `filename`, without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn mime_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

pub fn check_image_file(
    content: &[u8],
    filename: &str,
    cfg: &UploadConfig,
) -> Result<(), ImageValidationError> {
    if content.len() > cfg.max_bytes {
        return Err(ImageValidationError::TooLarge {
            size: content.len(),
            limit: cfg.max_bytes,
        });
    }

    let ext = extension_of(filename).unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ImageValidationError::UnsupportedExtension(ext));
    }

    image::load_from_memory(content).map_err(|e| {
        info!(error = %e, filename, "failed to validate image");
        ImageValidationError::Undecodable
    })?;
    Ok(())
}

pub fn validate_image_file(content: &[u8], filename: &str, cfg: &UploadConfig) -> bool {
    check_image_file(content, filename, cfg).is_ok()
}

/// Encoding used for the stored copy of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredFormat {
    Jpeg,
    Png,
    WebP,
    Bmp,
}

impl StoredFormat {
    pub fn for_extension(ext: &str) -> Self {
        match ext {
            "png" => StoredFormat::Png,
            "webp" => StoredFormat::WebP,
            "bmp" => StoredFormat::Bmp,
            _ => StoredFormat::Jpeg,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            StoredFormat::Jpeg => "jpg",
            StoredFormat::Png => "png",
            StoredFormat::WebP => "webp",
            StoredFormat::Bmp => "bmp",
        }
    }

    /// `quality` applies to the lossy encoders (JPEG, WebP).
    fn encode(self, img: &DynamicImage, quality: u8) -> anyhow::Result<Vec<u8>> {
        let output = match self {
            StoredFormat::Jpeg => ImageOutputFormat::Jpeg(quality),
            StoredFormat::Png => ImageOutputFormat::Png,
            StoredFormat::Bmp => ImageOutputFormat::Bmp,
            StoredFormat::WebP => {
                // the webp encoder only takes RGB(A) buffers
                let rgb = match img {
                    DynamicImage::ImageRgb8(_) => None,
                    other => Some(DynamicImage::ImageRgb8(other.to_rgb8())),
                };
                let encoder = webp::Encoder::from_image(rgb.as_ref().unwrap_or(img))
                    .map_err(|e| anyhow::anyhow!("webp encoder: {e}"))?;
                return Ok(encoder.encode(f32::from(quality)).to_vec());
            }
        };
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), output)?;
        Ok(bytes)
    }
}

#[derive(Debug)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: StoredFormat,
}

/// Drops alpha, palette and high bit depth so the stored copy is 8-bit RGB or grayscale.
fn normalize_color(img: DynamicImage) -> DynamicImage {
    match img.color() {
        ColorType::Rgb8 | ColorType::L8 => img,
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Fits the image inside a `max`×`max` box, keeping the aspect ratio.
fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= max && h <= max {
        return img;
    }
    let resized = img.resize(max, max, FilterType::Lanczos3);
    debug!(from = ?(w, h), to = ?resized.dimensions(), "downsized image");
    resized
}

/// Decodes, normalizes and re-encodes an upload. CPU bound; call from a blocking task.
pub fn normalize_image(
    content: &[u8],
    original_filename: &str,
    cfg: &UploadConfig,
) -> anyhow::Result<NormalizedImage> {
    let ext = extension_of(original_filename).unwrap_or_default();
    let format = StoredFormat::for_extension(&ext);

    let img = image::load_from_memory(content).context("decode image")?;
    let img = fit_within(normalize_color(img), cfg.max_dimension);
    let (width, height) = img.dimensions();

    let bytes = format
        .encode(&img, cfg.jpeg_quality)
        .context("encode image")?;

    Ok(NormalizedImage {
        bytes,
        width,
        height,
        format,
    })
}

#[cfg(test)]
pub(crate) mod test_images {
    use std::io::Cursor;

    use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb, Rgba};

    pub fn encode(img: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    pub fn jpeg(w: u32, h: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(w, h, Rgb([200u8, 30, 30]));
        encode(&DynamicImage::ImageRgb8(img), ImageOutputFormat::Jpeg(90))
    }

    pub fn rgba_png(w: u32, h: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(w, h, Rgba([255u8, 0, 0, 128]));
        encode(&DynamicImage::ImageRgba8(img), ImageOutputFormat::Png)
    }

    /// Palette-based input; GIF is always indexed colour.
    pub fn palette_gif(w: u32, h: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(w, h, |x, _| {
            if x % 2 == 0 {
                Rgb([10u8, 120, 40])
            } else {
                Rgb([240u8, 220, 20])
            }
        });
        encode(&DynamicImage::ImageRgb8(img), ImageOutputFormat::Gif)
    }

    pub fn webp(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(w, h, Rgb([90u8, 160, 60])));
        webp::Encoder::from_image(&img).unwrap().encode(80.0).to_vec()
    }
}
