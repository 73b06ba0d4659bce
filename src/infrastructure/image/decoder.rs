//! Raster decoding with scratch-buffer reuse, and fit-to-box scaling.

use std::io::Cursor;

use image::error::{ImageError, LimitErrorKind};
use image::imageops::{self, FilterType};
use image::{
    ColorType, DynamicImage, GrayAlphaImage, GrayImage, ImageDecoder, ImageReader, Limits,
    RgbImage, RgbaImage,
};
use tracing::trace;

use crate::domain::entities::{Bitmap, PixelFormat, TargetSize};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ImageCachePort, ImageDecoderPort};

/// Default ceiling on a single decode allocation.
pub const DEFAULT_MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// Decoder for PNG, JPEG and WebP built on the `image` crate.
#[derive(Debug, Clone)]
pub struct RasterDecoder {
    max_alloc: u64,
}

impl RasterDecoder {
    /// Creates a decoder refusing allocations larger than `max_alloc` bytes.
    #[must_use]
    pub const fn new(max_alloc: u64) -> Self {
        Self { max_alloc }
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc);
        limits
    }
}

impl Default for RasterDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECODE_ALLOC)
    }
}

impl ImageDecoderPort for RasterDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        reuse: Option<&dyn ImageCachePort>,
    ) -> Result<DynamicImage, LoadError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| LoadError::decode(format!("Failed to sniff format: {e}")))?;
        if reader.format().is_none() {
            return Err(LoadError::decode("Unrecognized image format"));
        }
        reader.limits(self.limits());

        let decoder = reader.into_decoder().map_err(map_image_error)?;
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();
        let format = PixelFormat::from(color);

        let scratch = reuse
            .filter(|_| format.supports_reuse())
            .and_then(|cache| cache.acquire_reusable_buffer(width, height, format));

        match scratch {
            Some(buffer) => decode_into(decoder, buffer, color),
            None => DynamicImage::from_decoder(decoder).map_err(map_image_error),
        }
    }
}

/// Decodes into `buffer`, growing it only if it is too small.
fn decode_into(
    decoder: impl ImageDecoder,
    mut buffer: Vec<u8>,
    color: ColorType,
) -> Result<DynamicImage, LoadError> {
    let (width, height) = decoder.dimensions();
    let total = usize::try_from(decoder.total_bytes())
        .map_err(|_| LoadError::out_of_memory("image larger than address space"))?;

    buffer.clear();
    buffer
        .try_reserve_exact(total)
        .map_err(|e| LoadError::out_of_memory(e.to_string()))?;
    buffer.resize(total, 0);
    decoder.read_image(&mut buffer).map_err(map_image_error)?;
    trace!(width, height, "Decoded into reused buffer");

    let image = match color {
        ColorType::Rgba8 => RgbaImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgba8),
        ColorType::Rgb8 => RgbImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8),
        ColorType::La8 => {
            GrayAlphaImage::from_raw(width, height, buffer).map(DynamicImage::ImageLumaA8)
        }
        ColorType::L8 => GrayImage::from_raw(width, height, buffer).map(DynamicImage::ImageLuma8),
        _ => None,
    };
    image.ok_or_else(|| LoadError::decode(format!("Unexpected buffer layout for {color:?}")))
}

fn map_image_error(err: ImageError) -> LoadError {
    match &err {
        ImageError::Limits(limit) if matches!(limit.kind(), LimitErrorKind::InsufficientMemory) => {
            LoadError::out_of_memory(err.to_string())
        }
        _ => LoadError::decode(err.to_string()),
    }
}

/// Computes the size of a `width` x `height` image scaled into `target`
/// without distortion: the larger side matches its target dimension and the
/// other side is at most its own. Small images are scaled up.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn fit_within(width: u32, height: u32, target: TargetSize) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let aspect = f64::from(width) / f64::from(height);
    let truncate = |v: f64| (v as u32).max(1);

    if width > height {
        let scaled_height = truncate(f64::from(target.width) / aspect);
        if scaled_height > target.height {
            (truncate(f64::from(target.height) * aspect), target.height)
        } else {
            (target.width, scaled_height)
        }
    } else {
        let scaled_width = truncate(f64::from(target.height) * aspect);
        if scaled_width > target.width {
            (target.width, truncate(f64::from(target.width) / aspect))
        } else {
            (scaled_width, target.height)
        }
    }
}

/// Scales a decoded image into `target`. The source pixels go back to
/// `reuse` when a new buffer had to be allocated.
#[must_use]
pub fn scale_to_fit(
    image: DynamicImage,
    target: TargetSize,
    reuse: Option<&dyn ImageCachePort>,
) -> Bitmap {
    let (width, height) = fit_within(image.width(), image.height(), target);
    if (width, height) == (image.width(), image.height()) {
        return Bitmap::from(image);
    }

    let scaled = imageops::resize(&image, width, height, FilterType::Triangle);
    if let Some(cache) = reuse
        && let Some(buffer) = into_raw_buffer(image)
    {
        cache.recycle(buffer);
    }
    Bitmap::new(scaled)
}

/// Decodes and scales in one step.
///
/// # Errors
/// Propagates decoder errors.
pub fn decode_scaled(
    decoder: &dyn ImageDecoderPort,
    bytes: &[u8],
    reuse: Option<&dyn ImageCachePort>,
    target: TargetSize,
) -> Result<Bitmap, LoadError> {
    let image = decoder.decode(bytes, reuse)?;
    Ok(scale_to_fit(image, target, reuse))
}

fn into_raw_buffer(image: DynamicImage) -> Option<Vec<u8>> {
    match image {
        DynamicImage::ImageRgba8(pixels) => Some(pixels.into_raw()),
        DynamicImage::ImageRgb8(pixels) => Some(pixels.into_raw()),
        DynamicImage::ImageLumaA8(pixels) => Some(pixels.into_raw()),
        DynamicImage::ImageLuma8(pixels) => Some(pixels.into_raw()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::png_bytes;
    use crate::infrastructure::image::MemoryImageCache;
    use std::sync::Arc;
    use test_case::test_case;

    fn target(width: u32, height: u32) -> TargetSize {
        TargetSize::new(width, height).expect("non-zero target")
    }

    #[test_case(1600, 400, 800, 600, 800, 200 ; "wide_source_is_width_bound")]
    #[test_case(400, 1600, 800, 600, 150, 600 ; "tall_source_is_height_bound")]
    #[test_case(1000, 1000, 800, 600, 600, 600 ; "square_source")]
    #[test_case(1200, 600, 300, 100, 200, 100 ; "wide_source_clamped_by_height")]
    #[test_case(100, 50, 800, 600, 800, 400 ; "small_source_scaled_up")]
    #[test_case(600, 1800, 100, 200, 66, 200 ; "truncates_fractional_width")]
    fn test_fit_within(sw: u32, sh: u32, tw: u32, th: u32, ew: u32, eh: u32) {
        assert_eq!(fit_within(sw, sh, target(tw, th)), (ew, eh));
    }

    #[test]
    fn test_fit_never_exceeds_box() {
        for (sw, sh) in [(1, 999), (999, 1), (333, 777), (640, 480), (7, 7)] {
            let (w, h) = fit_within(sw, sh, target(320, 240));
            assert!(w <= 320 && h <= 240, "{sw}x{sh} -> {w}x{h}");
            assert!(w == 320 || h == 240, "{sw}x{sh} -> {w}x{h}");
        }
    }

    #[test]
    fn test_decode_png() {
        let decoded = RasterDecoder::default()
            .decode(&png_bytes(16, 8), None)
            .expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_decode_reuses_buffer_from_cache() {
        let cache = MemoryImageCache::new(1024 * 1024);
        cache.recycle(vec![0u8; 16 * 8 * 4 + 128]);
        assert_eq!(cache.reuse_pool().len(), 1);

        let decoded = RasterDecoder::default()
            .decode(&png_bytes(16, 8), Some(&cache))
            .expect("valid png");

        assert_eq!((decoded.width(), decoded.height()), (16, 8));
        assert!(cache.reuse_pool().is_empty());
    }

    #[test]
    fn test_malformed_bytes_fail_to_decode() {
        let result = RasterDecoder::default().decode(b"definitely not an image", None);
        assert!(matches!(result, Err(LoadError::Decode { .. })));
    }

    #[test]
    fn test_truncated_png_fails_to_decode() {
        let bytes = png_bytes(32, 32);
        let result = RasterDecoder::default().decode(&bytes[..bytes.len() / 2], None);
        assert!(result.is_err());
        assert!(!result.is_err_and(|e| e.is_out_of_memory()));
    }

    #[test]
    fn test_allocation_limit_reports_out_of_memory() {
        let result = RasterDecoder::new(64).decode(&png_bytes(64, 64), None);
        assert!(matches!(result, Err(LoadError::OutOfMemory { .. })));
    }

    #[test]
    fn test_decode_scaled_returns_source_buffer_to_cache() {
        let cache = Arc::new(MemoryImageCache::new(1024 * 1024));
        let bitmap = decode_scaled(
            &RasterDecoder::default(),
            &png_bytes(1600, 400),
            Some(cache.as_ref()),
            target(800, 600),
        )
        .expect("valid png");

        assert_eq!((bitmap.width(), bitmap.height()), (800, 200));
        assert_eq!(cache.reuse_pool().len(), 1);
    }

    #[test]
    fn test_scale_keeps_exact_fit_without_copy() {
        let image = DynamicImage::new_rgba8(80, 60);
        let bitmap = scale_to_fit(image, target(80, 60), None);
        assert_eq!((bitmap.width(), bitmap.height()), (80, 60));
    }
}
