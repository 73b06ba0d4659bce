//! A view that shows one image key, loaded asynchronously.
//!
//! Views live on the main context. They only dispatch a load once they are
//! attached and have a measured size; results come back through the
//! [`ImageViewHost`](crate::presentation::ImageViewHost), which applies them
//! only if they belong to the view's current task.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::domain::entities::{Bitmap, ImageKey, LoadRequest, TargetSize, ViewId, ViewState};
use crate::domain::errors::LoadError;
use crate::domain::ports::ImageCachePort;
use crate::infrastructure::config::ViewConfig;
use crate::infrastructure::image::{ImageLoadedEvent, LoadTask};
use crate::presentation::host::HostShared;

use super::transition::CrossFade;

/// Result of a load as reported to listeners.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The bitmap now shown.
    Loaded(Arc<Bitmap>),
    /// Why the load failed.
    Failed(LoadError),
}

impl LoadOutcome {
    /// True for [`LoadOutcome::Loaded`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Called after every load of the view. Return true to mark a failure as
/// handled, which suppresses the error image.
pub type LoadListener = Box<dyn FnMut(&ImageKey, &LoadOutcome) -> bool>;

/// Called once the view size is known, right before dispatching. Returns
/// the key to actually load, or `None` to abandon the load.
pub type SizeListener = Box<dyn FnMut(&ImageKey, TargetSize) -> Option<ImageKey>>;

/// Per-view options.
#[derive(Debug, Clone)]
pub struct ImageViewOptions {
    /// Look up and store bitmaps in the shared cache.
    pub use_memory_cache: bool,
    /// Cross-fade loaded images in.
    pub fading: bool,
    /// Drawn under the content, and alone until something is loaded.
    pub placeholder: Option<Arc<Bitmap>>,
    /// Shown when a load fails and no listener handles it.
    pub error_image: Option<Arc<Bitmap>>,
}

impl Default for ImageViewOptions {
    fn default() -> Self {
        Self {
            use_memory_cache: true,
            fading: true,
            placeholder: None,
            error_image: None,
        }
    }
}

impl From<&ViewConfig> for ImageViewOptions {
    fn from(config: &ViewConfig) -> Self {
        Self {
            use_memory_cache: config.use_memory_cache,
            fading: config.fading,
            ..Self::default()
        }
    }
}

/// What sits on top of the placeholder.
#[derive(Debug, Clone)]
pub enum Layer {
    /// The loaded image.
    Image(Arc<Bitmap>),
    /// The configured error image.
    ErrorImage(Arc<Bitmap>),
}

impl Layer {
    /// The bitmap of either layer.
    #[must_use]
    pub fn bitmap(&self) -> &Arc<Bitmap> {
        match self {
            Self::Image(bitmap) | Self::ErrorImage(bitmap) => bitmap,
        }
    }
}

/// Everything a renderer needs to draw the view at one instant.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Bottom layer, if any is visible.
    pub placeholder: Option<Arc<Bitmap>>,
    /// Top layer.
    pub top: Option<Layer>,
    /// Opacity of the top layer.
    pub opacity: f32,
    /// The cross-fade is still running; draw again soon.
    pub animating: bool,
}

pub(crate) struct ViewCore {
    id: ViewId,
    key: Option<ImageKey>,
    displayed_key: Option<ImageKey>,
    content: Option<Layer>,
    state: ViewState,
    attached: bool,
    size: Option<TargetSize>,
    task: Option<Arc<LoadTask>>,
    fade: CrossFade,
    options: ImageViewOptions,
    listener: Option<LoadListener>,
    size_listener: Option<SizeListener>,
}

impl ViewCore {
    fn new(id: ViewId, options: ImageViewOptions) -> Self {
        Self {
            id,
            key: None,
            displayed_key: None,
            content: None,
            state: ViewState::Idle,
            attached: false,
            size: None,
            task: None,
            fade: CrossFade::with_fading(options.fading),
            options,
            listener: None,
            size_listener: None,
        }
    }

    fn show(&mut self, layer: Layer, immediate: bool) {
        self.content = Some(layer);
        self.fade.start(Instant::now(), immediate);
    }

    fn hide(&mut self) {
        self.content = None;
        self.displayed_key = None;
        self.fade.reset();
    }

    fn detach_task(&mut self) {
        if let Some(task) = self.task.take() {
            trace!(view = %self.id, task = task.id(), "Cancelling load");
            task.cancel();
        }
    }

    fn is_current(&self, task: &Arc<LoadTask>) -> bool {
        self.task.as_ref().is_some_and(|t| Arc::ptr_eq(t, task))
    }
}

/// An image view. Not `Send`: it belongs to the main context.
pub struct ImageView {
    id: ViewId,
    core: Rc<RefCell<ViewCore>>,
    host: Rc<HostShared>,
}

impl ImageView {
    pub(crate) fn new(id: ViewId, options: ImageViewOptions, host: Rc<HostShared>) -> Self {
        Self {
            id,
            core: Rc::new(RefCell::new(ViewCore::new(id, options))),
            host,
        }
    }

    pub(crate) fn core(&self) -> &Rc<RefCell<ViewCore>> {
        &self.core
    }

    /// Identity within the host.
    #[must_use]
    pub const fn id(&self) -> ViewId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ViewState {
        self.core.borrow().state
    }

    /// The key last set.
    #[must_use]
    pub fn key(&self) -> Option<ImageKey> {
        self.core.borrow().key.clone()
    }

    /// The key whose image is on screen.
    #[must_use]
    pub fn displayed_key(&self) -> Option<ImageKey> {
        self.core.borrow().displayed_key.clone()
    }

    /// The loaded bitmap, if one is shown.
    #[must_use]
    pub fn bitmap(&self) -> Option<Arc<Bitmap>> {
        match &self.core.borrow().content {
            Some(Layer::Image(bitmap)) => Some(Arc::clone(bitmap)),
            _ => None,
        }
    }

    /// The in-flight task, if any.
    #[must_use]
    pub fn pending_task(&self) -> Option<Arc<LoadTask>> {
        self.core.borrow().task.clone()
    }

    /// True between [`ImageView::on_attached`] and [`ImageView::on_detached`].
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.core.borrow().attached
    }

    /// Measured size, once known.
    #[must_use]
    pub fn size(&self) -> Option<TargetSize> {
        self.core.borrow().size
    }

    /// Sets the listener told about every load.
    pub fn set_listener(&self, listener: impl FnMut(&ImageKey, &LoadOutcome) -> bool + 'static) {
        self.core.borrow_mut().listener = Some(Box::new(listener));
    }

    /// Sets the listener that may rewrite the key once the size is known.
    pub fn set_size_listener(
        &self,
        listener: impl FnMut(&ImageKey, TargetSize) -> Option<ImageKey> + 'static,
    ) {
        self.core.borrow_mut().size_listener = Some(Box::new(listener));
    }

    /// Shows `key`, or clears the view for `None` or an empty key.
    ///
    /// Setting the key already shown is a no-op, as is setting the key
    /// already being loaded.
    pub fn set_key(&self, key: Option<ImageKey>) {
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            self.clear();
            return;
        };

        {
            let mut core = self.core.borrow_mut();
            if core.key.as_ref() == Some(&key) {
                match core.state {
                    ViewState::Loaded => return,
                    ViewState::Loading if core.task.is_some() => {
                        trace!(view = %core.id, key = %key, "Load already in flight");
                        return;
                    }
                    _ => {}
                }
            }

            core.detach_task();
            core.hide();
            core.key = Some(key);
            core.state = ViewState::Idle;
        }
        self.try_load();
    }

    /// Shorthand for `set_key(Some(key))`.
    pub fn load(&self, key: impl Into<ImageKey>) {
        self.set_key(Some(key.into()));
    }

    /// Forgets the key and content; a running load is cancelled and its
    /// result ignored.
    pub fn clear(&self) {
        let mut core = self.core.borrow_mut();
        core.detach_task();
        core.hide();
        core.key = None;
        core.state = ViewState::Idle;
    }

    /// The view became visible.
    pub fn on_attached(&self) {
        self.core.borrow_mut().attached = true;
        self.try_load();
    }

    /// The view left the screen. Running loads continue.
    pub fn on_detached(&self) {
        self.core.borrow_mut().attached = false;
    }

    /// The view was measured. Zero sizes are not usable and are ignored.
    pub fn on_size_changed(&self, width: u32, height: u32) {
        match TargetSize::new(width, height) {
            Ok(size) => {
                self.core.borrow_mut().size = Some(size);
                self.try_load();
            }
            Err(e) => trace!(view = %self.id(), error = %e, "Ignoring unusable size"),
        }
    }

    /// What to draw at `now`.
    #[must_use]
    pub fn frame(&self, now: Instant) -> Frame {
        let core = self.core.borrow();
        let opacity = if core.content.is_some() {
            core.fade.progress(now)
        } else {
            0.0
        };
        Frame {
            placeholder: core
                .options
                .placeholder
                .clone()
                .filter(|_| opacity < 1.0),
            top: core.content.clone(),
            opacity,
            animating: core.content.is_some() && core.fade.is_running(now),
        }
    }

    fn pending_load(&self) -> Option<(ImageKey, TargetSize)> {
        let core = self.core.borrow();
        if core.state != ViewState::Idle || !core.attached {
            return None;
        }
        core.key.clone().zip(core.size)
    }

    fn try_load(&self) {
        let Some((key, size)) = self.pending_load() else {
            return;
        };

        let Some(resolved) = resolve_key(&self.core, &key, size) else {
            debug!(view = %self.id(), key = %key, "Load abandoned by size listener");
            return;
        };

        // The size listener may have touched the view.
        if self.pending_load() != Some((key.clone(), size)) {
            return;
        }

        let mut core = self.core.borrow_mut();
        let cache = if core.options.use_memory_cache {
            self.host.cache.clone()
        } else {
            None
        };

        if let Some(bitmap) = cache.as_ref().and_then(|c| c.get(&resolved)) {
            trace!(view = %core.id, key = %key, "Cache hit");
            core.show(Layer::Image(Arc::clone(&bitmap)), true);
            core.displayed_key = Some(key.clone());
            core.state = ViewState::Loaded;
            drop(core);
            notify(&self.core, &key, &LoadOutcome::Loaded(bitmap));
            return;
        }

        let request = LoadRequest {
            key: resolved,
            target: size,
        };
        let task = self.host.dispatch(core.id, request, cache);
        core.task = Some(task);
        core.state = ViewState::Loading;
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.host.forget(self.id);
    }
}

impl std::fmt::Debug for ImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("ImageView")
            .field("id", &core.id)
            .field("key", &core.key)
            .field("state", &core.state)
            .field("attached", &core.attached)
            .field("size", &core.size)
            .finish_non_exhaustive()
    }
}

/// Applies a finished load to the view that dispatched it. Results of
/// superseded or cancelled tasks are dropped.
pub(crate) fn complete(core: &Rc<RefCell<ViewCore>>, event: ImageLoadedEvent) {
    let (key, outcome) = {
        let mut view = core.borrow_mut();
        if !view.is_current(&event.task) || event.task.is_cancelled() {
            trace!(view = %view.id, task = event.task.id(), "Ignoring stale result");
            return;
        }
        view.task = None;
        let Some(key) = view.key.clone() else {
            return;
        };

        match event.result {
            Ok(bitmap) => {
                let immediate = !view.options.fading;
                view.show(Layer::Image(Arc::clone(&bitmap)), immediate);
                view.displayed_key = Some(key.clone());
                view.state = ViewState::Loaded;
                (key, LoadOutcome::Loaded(bitmap))
            }
            Err(error) => {
                debug!(view = %view.id, key = %key, error = %error, "Showing load failure");
                view.state = ViewState::Error;
                (key, LoadOutcome::Failed(error))
            }
        }
    };

    let handled = notify(core, &key, &outcome);
    if outcome.is_success() || handled {
        return;
    }

    let mut view = core.borrow_mut();
    if view.state == ViewState::Error
        && view.key.as_ref() == Some(&key)
        && let Some(error_image) = view.options.error_image.clone()
    {
        view.show(Layer::ErrorImage(error_image), false);
    }
}

/// Runs the size listener, if any, without holding the view borrowed.
fn resolve_key(core: &Rc<RefCell<ViewCore>>, key: &ImageKey, size: TargetSize) -> Option<ImageKey> {
    let Some(mut listener) = core.borrow_mut().size_listener.take() else {
        return Some(key.clone());
    };
    let resolved = listener(key, size).filter(|k| !k.is_empty());
    let mut view = core.borrow_mut();
    if view.size_listener.is_none() {
        view.size_listener = Some(listener);
    }
    resolved
}

/// Calls the listener without holding the view borrowed, so it may touch
/// the view again.
fn notify(core: &Rc<RefCell<ViewCore>>, key: &ImageKey, outcome: &LoadOutcome) -> bool {
    let Some(mut listener) = core.borrow_mut().listener.take() else {
        return false;
    };
    let handled = listener(key, outcome);
    let mut view = core.borrow_mut();
    if view.listener.is_none() {
        view.listener = Some(listener);
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn bitmap() -> Arc<Bitmap> {
        Arc::new(Bitmap::new(RgbaImage::new(2, 2)))
    }

    #[test]
    fn test_options_from_view_config() {
        let options = ImageViewOptions::from(&ViewConfig {
            fading: false,
            use_memory_cache: false,
        });
        assert!(!options.fading);
        assert!(!options.use_memory_cache);
        assert!(options.placeholder.is_none());
    }

    #[test]
    fn test_layer_bitmap() {
        let image = bitmap();
        assert!(Arc::ptr_eq(Layer::ErrorImage(Arc::clone(&image)).bitmap(), &image));
    }

    #[test]
    fn test_outcome_success() {
        assert!(LoadOutcome::Loaded(bitmap()).is_success());
        assert!(!LoadOutcome::Failed(LoadError::transport("HTTP 500")).is_success());
    }
}
