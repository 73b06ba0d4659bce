//! Domain types for image loading.

use image::{ColorType, RgbaImage};

use crate::domain::errors::LoadError;

/// Prefix marking a key that carries its own image bytes.
pub const INLINE_DATA_PREFIX: &str = "data:";

/// Identifies an image resource: a URL, a numeric backend resource id,
/// or an inline `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    /// Creates a new `ImageKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is empty and should be treated as absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns true if the key embeds the image bytes directly.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.0.starts_with(INLINE_DATA_PREFIX)
    }

    /// Returns the numeric resource id if the key is one.
    #[must_use]
    pub fn resource_id(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Short stable digest of the key, suitable for log fields.
    #[must_use]
    pub fn short_id(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }
}

impl std::fmt::Display for ImageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_inline() {
            write!(f, "data:<{} bytes, {}>", self.0.len(), self.short_id())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for ImageKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<u64> for ImageKey {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Display box an image is scaled into. Both dimensions are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TargetSize {
    /// Creates a target size.
    ///
    /// # Errors
    /// Returns [`LoadError::InvalidTarget`] if either dimension is zero.
    pub const fn new(width: u32, height: u32) -> Result<Self, LoadError> {
        if width == 0 || height == 0 {
            return Err(LoadError::InvalidTarget { width, height });
        }
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single request to resolve a key into a scaled bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// What to load.
    pub key: ImageKey,
    /// Box to fit the decoded image into.
    pub target: TargetSize,
}

impl LoadRequest {
    /// Creates a request, validating the target dimensions.
    ///
    /// # Errors
    /// Returns [`LoadError::InvalidTarget`] if either dimension is zero.
    pub fn new(key: impl Into<ImageKey>, width: u32, height: u32) -> Result<Self, LoadError> {
        Ok(Self {
            key: key.into(),
            target: TargetSize::new(width, height)?,
        })
    }
}

/// Pixel layout of a buffer, used to size reusable buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit color with alpha.
    Rgba8888,
    /// 24-bit color.
    Rgb888,
    /// 16-bit color.
    Rgb565,
    /// 16-bit color with alpha.
    Rgba4444,
    /// 8-bit luminance with 8-bit alpha.
    GrayAlpha88,
    /// 8-bit luminance.
    Gray8,
    /// 8-bit alpha mask.
    Alpha8,
    /// Anything else.
    Unknown,
}

impl PixelFormat {
    /// Bytes needed to store one pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u64 {
        match self {
            Self::Rgba8888 => 4,
            Self::Rgb888 => 3,
            Self::Rgb565 | Self::Rgba4444 | Self::GrayAlpha88 => 2,
            Self::Gray8 | Self::Alpha8 | Self::Unknown => 1,
        }
    }

    /// Bytes needed to store a `width` x `height` image in this format.
    #[must_use]
    pub const fn bytes_for(self, width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * self.bytes_per_pixel()
    }

    /// Returns true if the decoder can write this format straight into a
    /// caller-supplied buffer.
    #[must_use]
    pub const fn supports_reuse(self) -> bool {
        matches!(
            self,
            Self::Rgba8888 | Self::Rgb888 | Self::GrayAlpha88 | Self::Gray8
        )
    }
}

impl From<ColorType> for PixelFormat {
    fn from(color: ColorType) -> Self {
        match color {
            ColorType::Rgba8 => Self::Rgba8888,
            ColorType::Rgb8 => Self::Rgb888,
            ColorType::La8 => Self::GrayAlpha88,
            ColorType::L8 => Self::Gray8,
            _ => Self::Unknown,
        }
    }
}

/// Decoded, display-ready pixels (always RGBA8888).
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pixels: RgbaImage,
}

impl Bitmap {
    /// Wraps decoded pixels.
    #[must_use]
    pub const fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Builds a bitmap over an existing buffer.
    /// Returns None if the buffer is too small for the dimensions.
    #[must_use]
    pub fn from_buffer(width: u32, height: u32, mut buffer: Vec<u8>) -> Option<Self> {
        let len = usize::try_from(PixelFormat::Rgba8888.bytes_for(width, height)).ok()?;
        if buffer.len() < len {
            return None;
        }
        buffer.truncate(len);
        RgbaImage::from_raw(width, height, buffer).map(Self::new)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Pixel layout of the bitmap.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        PixelFormat::Rgba8888
    }

    /// Bytes occupied by the pixels. This is the cache weight.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// Bytes allocated by the backing buffer, which may exceed
    /// [`Bitmap::byte_count`] for a reused buffer.
    #[must_use]
    pub fn allocation_byte_count(&self) -> usize {
        self.pixels.as_raw().capacity()
    }

    /// Borrows the pixels.
    #[must_use]
    pub const fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Gives up the pixels, returning the backing buffer.
    #[must_use]
    pub fn into_buffer(self) -> Vec<u8> {
        self.pixels.into_raw()
    }
}

impl From<image::DynamicImage> for Bitmap {
    fn from(image: image::DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("allocated", &self.allocation_byte_count())
            .finish()
    }
}

/// Load state of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    /// Nothing requested, or a request is waiting for attachment or size.
    #[default]
    Idle,
    /// A loader is in flight.
    Loading,
    /// The requested image is displayed.
    Loaded,
    /// The last load failed.
    Error,
}

impl ViewState {
    /// Returns true if the image is displayed.
    #[must_use]
    pub const fn is_loaded(self) -> bool {
        matches!(self, Self::Loaded)
    }

    /// Returns true if a loader is in flight.
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns true if loading failed.
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Loaded => write!(f, "loaded"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Identifies a view within its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u64);

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Coarse memory pressure forwarded by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryPressure {
    /// No action needed.
    #[default]
    Normal,
    /// Give back part of the cache.
    Moderate,
    /// Give back everything.
    Severe,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_inline_key_detection() {
        assert!(ImageKey::new("data:image/png;base64,AAAA").is_inline());
        assert!(!ImageKey::new("https://example.com/a.png").is_inline());
        assert!(!ImageKey::from(42u64).is_inline());
    }

    #[test]
    fn test_resource_id() {
        assert_eq!(ImageKey::new("1234").resource_id(), Some(1234));
        assert_eq!(ImageKey::new("https://example.com/1234").resource_id(), None);
    }

    #[test]
    fn test_empty_key() {
        assert!(ImageKey::new("").is_empty());
        assert!(ImageKey::new("  ").is_empty());
        assert!(!ImageKey::new("x").is_empty());
    }

    #[test]
    fn test_inline_key_display_is_compact() {
        let payload = "A".repeat(10_000);
        let key = ImageKey::new(format!("data:image/png;base64,{payload}"));
        let shown = key.to_string();
        assert!(shown.len() < 64);
        assert!(shown.starts_with("data:<"));
    }

    #[test]
    fn test_short_id_consistency() {
        let a = ImageKey::new("https://example.com/image.png");
        let b = ImageKey::new("https://example.com/image.png");
        assert_eq!(a.short_id(), b.short_id());
        assert_eq!(a.short_id().len(), 16);
    }

    #[test_case(0, 10 ; "zero_width")]
    #[test_case(10, 0 ; "zero_height")]
    #[test_case(0, 0 ; "both_zero")]
    fn test_zero_target_fails_fast(width: u32, height: u32) {
        let result = LoadRequest::new("key", width, height);
        assert!(matches!(result, Err(LoadError::InvalidTarget { .. })));
    }

    #[test_case(PixelFormat::Rgba8888, 4)]
    #[test_case(PixelFormat::Rgb565, 2)]
    #[test_case(PixelFormat::Rgba4444, 2)]
    #[test_case(PixelFormat::Alpha8, 1)]
    #[test_case(PixelFormat::Unknown, 1)]
    fn test_bytes_per_pixel(format: PixelFormat, expected: u64) {
        assert_eq!(format.bytes_per_pixel(), expected);
    }

    #[test]
    fn test_pixel_format_from_color_type() {
        assert_eq!(PixelFormat::from(ColorType::Rgba8), PixelFormat::Rgba8888);
        assert_eq!(PixelFormat::from(ColorType::L8), PixelFormat::Gray8);
        assert_eq!(PixelFormat::from(ColorType::Rgb16), PixelFormat::Unknown);
    }

    #[test]
    fn test_bitmap_from_oversized_buffer() {
        let buffer = vec![0u8; 64];
        let bitmap = Bitmap::from_buffer(2, 2, buffer).expect("buffer is large enough");
        assert_eq!(bitmap.byte_count(), 16);
        assert!(bitmap.allocation_byte_count() >= 64);
    }

    #[test]
    fn test_bitmap_from_short_buffer() {
        assert!(Bitmap::from_buffer(4, 4, vec![0u8; 8]).is_none());
    }
}
