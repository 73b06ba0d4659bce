/// Asynchronously loaded image view.
pub mod image_view;
mod transition;

pub use image_view::{
    Frame, ImageView, ImageViewOptions, Layer, LoadListener, LoadOutcome, SizeListener,
};
pub use transition::{CrossFade, DEFAULT_FADE};
