//! Connections that turn image keys into byte streams.
//!
//! - Inline `data:` keys are decoded locally from base64.
//! - Numeric keys resolve against the backend image endpoint when one is
//!   configured.
//! - Everything else is fetched as a plain URL.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::entities::{INLINE_DATA_PREFIX, ImageKey};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ByteStream, ImageConnection, ImageInput};

/// Backend endpoint serving images by numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEndpoint {
    /// Base URL; the id is appended as the last path segment.
    pub base_url: String,
    /// Basic auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,
}

impl ImageEndpoint {
    /// Creates an endpoint without credentials.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
        }
    }

    /// Sets basic auth credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    fn url_for(&self, id: u64) -> String {
        format!("{}/{id}", self.base_url.trim_end_matches('/'))
    }
}

/// Resolves the URL to fetch for `key`. The flag tells whether the URL
/// belongs to the endpoint.
#[must_use]
pub fn resolve_url(endpoint: Option<&ImageEndpoint>, key: &ImageKey) -> (String, bool) {
    match (endpoint, key.resource_id()) {
        (Some(endpoint), Some(id)) => (endpoint.url_for(id), true),
        _ => (key.as_str().to_owned(), false),
    }
}

/// Plain HTTP GET connection.
pub struct HttpConnection {
    client: reqwest::Client,
    endpoint: Option<Arc<ImageEndpoint>>,
    response: Option<reqwest::Response>,
}

impl HttpConnection {
    /// Creates a connection fetching keys as URLs.
    #[must_use]
    pub const fn new(client: reqwest::Client, endpoint: Option<Arc<ImageEndpoint>>) -> Self {
        Self {
            client,
            endpoint,
            response: None,
        }
    }
}

#[async_trait]
impl ImageConnection for HttpConnection {
    async fn connect(&mut self, key: &ImageKey) -> Result<(), LoadError> {
        let (url, on_endpoint) = resolve_url(self.endpoint.as_deref(), key);
        debug!(key = %key, url = %url, "Fetching image");

        let mut request = self.client.get(&url);
        if on_endpoint
            && let Some(endpoint) = &self.endpoint
            && let Some(username) = &endpoint.username
        {
            request = request.basic_auth(username, endpoint.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| LoadError::transport(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LoadError::transport(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        self.response = Some(response);
        Ok(())
    }

    async fn input_stream(&mut self) -> Result<ByteStream, LoadError> {
        let response = self
            .response
            .take()
            .ok_or_else(|| LoadError::transport("Not connected"))?;
        Ok(response
            .bytes_stream()
            .map_err(|e| LoadError::transport(format!("Failed to read body: {e}")))
            .boxed())
    }

    async fn disconnect(&mut self) {
        self.response = None;
    }
}

/// Decodes the base64 payload of a `data:` key locally.
#[derive(Debug, Default)]
pub struct InlineDataConnection {
    payload: Option<Bytes>,
}

impl InlineDataConnection {
    /// Extracts the bytes embedded in an inline key.
    ///
    /// # Errors
    /// Returns a decode error if the key is not inline or not valid base64.
    pub fn decode_payload(key: &ImageKey) -> Result<Bytes, LoadError> {
        let data = key
            .as_str()
            .strip_prefix(INLINE_DATA_PREFIX)
            .ok_or_else(|| LoadError::decode("Not an inline data key"))?;
        let (_, encoded) = data
            .split_once(',')
            .ok_or_else(|| LoadError::decode("Inline data has no payload"))?;
        STANDARD
            .decode(encoded.trim())
            .map(Bytes::from)
            .map_err(|e| LoadError::decode(format!("Invalid inline data: {e}")))
    }
}

#[async_trait]
impl ImageConnection for InlineDataConnection {
    async fn connect(&mut self, key: &ImageKey) -> Result<(), LoadError> {
        let payload = Self::decode_payload(key)?;
        trace!(bytes = payload.len(), "Decoded inline image data");
        self.payload = Some(payload);
        Ok(())
    }

    async fn input_stream(&mut self) -> Result<ByteStream, LoadError> {
        let payload = self
            .payload
            .take()
            .ok_or_else(|| LoadError::transport("Not connected"))?;
        Ok(futures_util::stream::once(async move { Ok(payload) }).boxed())
    }

    async fn disconnect(&mut self) {
        self.payload = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Http,
    Inline,
}

/// Picks inline decoding or HTTP per key.
struct RoutedConnection {
    http: HttpConnection,
    inline: InlineDataConnection,
    route: Option<Route>,
}

#[async_trait]
impl ImageConnection for RoutedConnection {
    async fn connect(&mut self, key: &ImageKey) -> Result<(), LoadError> {
        if key.is_inline() {
            self.route = Some(Route::Inline);
            self.inline.connect(key).await
        } else {
            self.route = Some(Route::Http);
            self.http.connect(key).await
        }
    }

    async fn input_stream(&mut self) -> Result<ByteStream, LoadError> {
        match self.route {
            Some(Route::Inline) => self.inline.input_stream().await,
            Some(Route::Http) => self.http.input_stream().await,
            None => Err(LoadError::transport("Not connected")),
        }
    }

    async fn disconnect(&mut self) {
        match self.route.take() {
            Some(Route::Inline) => self.inline.disconnect().await,
            Some(Route::Http) => self.http.disconnect().await,
            None => {}
        }
    }
}

/// Default connection provider: inline keys locally, the rest over HTTP.
#[derive(Clone)]
pub struct DefaultImageInput {
    client: reqwest::Client,
    endpoint: Option<Arc<ImageEndpoint>>,
}

impl DefaultImageInput {
    /// Direct fetches with `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: None,
        }
    }

    /// Resolves numeric keys against `endpoint`.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: ImageEndpoint) -> Self {
        self.endpoint = Some(Arc::new(endpoint));
        self
    }
}

impl std::fmt::Debug for DefaultImageInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultImageInput")
            .field("endpoint", &self.endpoint.as_ref().map(|e| &e.base_url))
            .finish_non_exhaustive()
    }
}

impl ImageInput for DefaultImageInput {
    fn connection(&self) -> Box<dyn ImageConnection> {
        Box::new(RoutedConnection {
            http: HttpConnection::new(self.client.clone(), self.endpoint.clone()),
            inline: InlineDataConnection::default(),
            route: None,
        })
    }
}
