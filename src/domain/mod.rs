//! Domain layer with core image entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{Bitmap, ImageKey, LoadRequest, TargetSize, ViewState};
pub use errors::LoadError;
pub use ports::{ImageCachePort, ImageConnection, ImageExecutor, ImageInput};
