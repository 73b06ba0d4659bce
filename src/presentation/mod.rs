//! Presentation layer: image views and the host that drives them.

/// View host and completion routing.
pub mod host;
/// Reusable widgets.
pub mod widgets;

pub use host::ImageViewHost;
pub use widgets::{Frame, ImageView, ImageViewOptions, Layer, LoadOutcome};
