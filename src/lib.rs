//! imageview - asynchronous image views over a shared bitmap cache.
//!
//! Views show one image key each. Loads run in the background: the bytes
//! are fetched, decoded into reused buffers where possible, scaled to the
//! view and stored in a size-bounded LRU cache. Results are applied on the
//! main context only if they still belong to the view's current request.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;
/// Presentation layer containing views and their host.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "imageview";
