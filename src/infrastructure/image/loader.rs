//! Async image loading pipeline.
//!
//! A load runs as a job on the [`ImageExecutor`]: connect, read the whole
//! body, disconnect, then decode and scale on the blocking pool. The result
//! goes into the cache and is reported on the event channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::domain::entities::{Bitmap, ImageKey, LoadRequest, ViewId};
use crate::domain::errors::LoadError;
use crate::domain::ports::{
    ImageCachePort, ImageConnection, ImageDecoderPort, ImageExecutor, ImageInput,
};

use super::connection::{DefaultImageInput, ImageEndpoint};
use super::decoder::{RasterDecoder, decode_scaled};
use super::executor::{DEFAULT_WORKERS, TokioImageExecutor, run_blocking};

const MIB: u64 = 1024 * 1024;

/// Configuration for the image loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLoaderConfig {
    /// Maximum loads running at once.
    pub workers: usize,
    /// Extra decode attempts after an out-of-memory failure. Each one is
    /// preceded by a full cache eviction.
    pub out_of_memory_retries: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Largest allocation a single decode may make, in MiB.
    pub max_decode_alloc_mb: u64,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            out_of_memory_retries: 1,
            timeout_secs: 30,
            max_decode_alloc_mb: 512,
        }
    }
}

/// Handle to one dispatched load.
///
/// Identity matters: a view applies a result only if the event carries the
/// very task the view is waiting for.
#[derive(Debug)]
pub struct LoadTask {
    id: u64,
    request: LoadRequest,
    cancelled: AtomicBool,
}

impl LoadTask {
    fn new(id: u64, request: LoadRequest) -> Self {
        Self {
            id,
            request,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Sequential id, for logs.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// What is being loaded.
    #[must_use]
    pub const fn request(&self) -> &LoadRequest {
        &self.request
    }

    /// Key being loaded.
    #[must_use]
    pub const fn key(&self) -> &ImageKey {
        &self.request.key
    }

    /// Requests cancellation. Takes effect before the next step; a read in
    /// progress is not interrupted.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once [`LoadTask::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Message sent when a load finishes.
#[derive(Debug, Clone)]
pub struct ImageLoadedEvent {
    /// View that dispatched the load.
    pub view: ViewId,
    /// The task that produced this result.
    pub task: Arc<LoadTask>,
    /// The scaled bitmap, or why there is none.
    pub result: Result<Arc<Bitmap>, LoadError>,
}

/// Dispatches loads and reports their completion.
pub struct ImageLoader {
    client: reqwest::Client,
    input: Arc<dyn ImageInput>,
    executor: Arc<dyn ImageExecutor>,
    decoder: Arc<dyn ImageDecoderPort>,
    events: mpsc::UnboundedSender<ImageLoadedEvent>,
    out_of_memory_retries: u32,
    next_task: AtomicU64,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("out_of_memory_retries", &self.out_of_memory_retries)
            .field("next_task", &self.next_task)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader fetching over HTTP and running on the current Tokio
    /// runtime.
    ///
    /// # Errors
    /// Returns a setup error if the HTTP client cannot be built or no
    /// runtime is available.
    pub fn new(
        config: &ImageLoaderConfig,
        events: mpsc::UnboundedSender<ImageLoadedEvent>,
    ) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LoadError::setup(format!("Failed to create HTTP client: {e}")))?;
        let executor = TokioImageExecutor::current(config.workers)?;

        Ok(Self {
            input: Arc::new(DefaultImageInput::new(client.clone())),
            client,
            executor: Arc::new(executor),
            decoder: Arc::new(RasterDecoder::new(
                config.max_decode_alloc_mb.saturating_mul(MIB),
            )),
            events,
            out_of_memory_retries: config.out_of_memory_retries,
            next_task: AtomicU64::new(1),
        })
    }

    /// Replaces the connection provider.
    #[must_use]
    pub fn with_input(mut self, input: Arc<dyn ImageInput>) -> Self {
        self.input = input;
        self
    }

    /// Resolves numeric keys against a backend image endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: ImageEndpoint) -> Self {
        self.input = Arc::new(DefaultImageInput::new(self.client.clone()).with_endpoint(endpoint));
        self
    }

    /// Replaces the job executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn ImageExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replaces the decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoderPort>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Starts loading `request` on behalf of `view`. The returned task can
    /// be cancelled; its result arrives as an [`ImageLoadedEvent`].
    pub fn dispatch(
        &self,
        view: ViewId,
        request: LoadRequest,
        cache: Option<Arc<dyn ImageCachePort>>,
    ) -> Arc<LoadTask> {
        let id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(LoadTask::new(id, request));
        debug!(
            view = %view,
            task = id,
            key = %task.key(),
            target = %task.request().target,
            "Dispatching image load"
        );

        let job = LoadJob {
            view,
            task: Arc::clone(&task),
            input: Arc::clone(&self.input),
            decoder: Arc::clone(&self.decoder),
            cache,
            out_of_memory_retries: self.out_of_memory_retries,
            events: self.events.clone(),
        };
        self.executor.execute(job.run().boxed());
        task
    }
}

struct LoadJob {
    view: ViewId,
    task: Arc<LoadTask>,
    input: Arc<dyn ImageInput>,
    decoder: Arc<dyn ImageDecoderPort>,
    cache: Option<Arc<dyn ImageCachePort>>,
    out_of_memory_retries: u32,
    events: mpsc::UnboundedSender<ImageLoadedEvent>,
}

impl LoadJob {
    async fn run(self) {
        let result = self.load().await;
        match &result {
            Ok(bitmap) => debug!(
                task = self.task.id(),
                key = %self.task.key(),
                width = bitmap.width(),
                height = bitmap.height(),
                "Image loaded"
            ),
            Err(LoadError::Cancelled) => trace!(task = self.task.id(), "Image load cancelled"),
            Err(e) => warn!(task = self.task.id(), key = %self.task.key(), error = %e, "Image load failed"),
        }

        let event = ImageLoadedEvent {
            view: self.view,
            task: self.task,
            result,
        };
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped, discarding result");
        }
    }

    async fn load(&self) -> Result<Arc<Bitmap>, LoadError> {
        self.ensure_active()?;
        let bytes = self.fetch().await?;
        self.decode(bytes).await
    }

    fn ensure_active(&self) -> Result<(), LoadError> {
        if self.task.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn fetch(&self) -> Result<Bytes, LoadError> {
        let mut connection = self.input.connection();
        let result = read_body(connection.as_mut(), self.task.key()).await;
        connection.disconnect().await;
        result
    }

    async fn decode(&self, bytes: Bytes) -> Result<Arc<Bitmap>, LoadError> {
        let target = self.task.request().target;
        let mut retries_left = self.out_of_memory_retries;

        loop {
            self.ensure_active()?;

            let decoder = Arc::clone(&self.decoder);
            let cache = self.cache.clone();
            let input = bytes.clone();
            let decoded = run_blocking(move || {
                decode_scaled(decoder.as_ref(), &input, cache.as_deref(), target)
            })
            .await?;

            match decoded {
                Ok(bitmap) => {
                    let bitmap = Arc::new(bitmap);
                    if let Some(cache) = &self.cache {
                        cache.put(self.task.key().clone(), Arc::clone(&bitmap));
                    }
                    return Ok(bitmap);
                }
                Err(err) if err.is_out_of_memory() && retries_left > 0 => {
                    let Some(cache) = &self.cache else {
                        return Err(err);
                    };
                    retries_left -= 1;
                    warn!(
                        key = %self.task.key(),
                        cached = cache.len(),
                        error = %err,
                        "Out of memory while decoding, evicting cache and retrying"
                    );
                    cache.evict_all();
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn read_body(connection: &mut dyn ImageConnection, key: &ImageKey) -> Result<Bytes, LoadError> {
    connection.connect(key).await?;
    let mut stream = connection.input_stream().await?;
    let mut body = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    trace!(key = %key, bytes = body.len(), "Read image body");
    Ok(body.freeze())
}
