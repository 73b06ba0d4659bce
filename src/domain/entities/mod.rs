//! Domain entity definitions.

mod image;

pub use self::image::{
    Bitmap, INLINE_DATA_PREFIX, ImageKey, LoadRequest, MemoryPressure, PixelFormat, TargetSize,
    ViewId, ViewState,
};
