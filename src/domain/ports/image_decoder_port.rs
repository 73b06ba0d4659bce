//! Port definition for image decoding.

use image::DynamicImage;

use crate::domain::errors::LoadError;
use crate::domain::ports::ImageCachePort;

/// Turns encoded bytes into pixels. Runs on a blocking worker thread.
pub trait ImageDecoderPort: Send + Sync {
    /// Decodes `bytes`. When `reuse` is given the decoder may take a scratch
    /// buffer from it instead of allocating.
    ///
    /// # Errors
    /// [`LoadError::OutOfMemory`] when the pixels do not fit in memory,
    /// [`LoadError::Decode`] for malformed input.
    fn decode(
        &self,
        bytes: &[u8],
        reuse: Option<&dyn ImageCachePort>,
    ) -> Result<DynamicImage, LoadError>;
}
