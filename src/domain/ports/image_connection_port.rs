//! Port definitions for turning an image key into bytes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::entities::ImageKey;
use crate::domain::errors::LoadError;

/// Stream of body chunks produced by a connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, LoadError>>;

/// A single-use connection to an image source.
#[async_trait]
pub trait ImageConnection: Send {
    /// Opens the connection for `key`.
    async fn connect(&mut self, key: &ImageKey) -> Result<(), LoadError>;

    /// Returns the body of the connected resource.
    async fn input_stream(&mut self) -> Result<ByteStream, LoadError>;

    /// Releases the connection. Called exactly once per connection, whatever
    /// the outcome of the load.
    async fn disconnect(&mut self);
}

/// Factory for connections.
pub trait ImageInput: Send + Sync {
    /// Returns a fresh connection.
    fn connection(&self) -> Box<dyn ImageConnection>;
}
