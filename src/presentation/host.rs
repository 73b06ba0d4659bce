//! Main-context owner of image views.
//!
//! The host creates views, receives loader completions and routes each one to
//! the view that dispatched it. Views are tracked weakly and unregister
//! themselves when dropped; a result for a dropped view is discarded.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::domain::entities::{LoadRequest, MemoryPressure, ViewId};
use crate::domain::ports::ImageCachePort;
use crate::infrastructure::image::{ImageLoadedEvent, ImageLoader, LoadTask};
use crate::presentation::widgets::image_view::{self, ImageView, ImageViewOptions, ViewCore};

pub(crate) struct HostShared {
    loader: ImageLoader,
    pub(crate) cache: Option<Arc<dyn ImageCachePort>>,
    views: RefCell<HashMap<ViewId, Weak<RefCell<ViewCore>>>>,
    next_view: Cell<u64>,
    in_flight: Cell<usize>,
    defaults: RefCell<ImageViewOptions>,
}

impl HostShared {
    pub(crate) fn dispatch(
        &self,
        view: ViewId,
        request: LoadRequest,
        cache: Option<Arc<dyn ImageCachePort>>,
    ) -> Arc<LoadTask> {
        self.in_flight.set(self.in_flight.get() + 1);
        self.loader.dispatch(view, request, cache)
    }

    pub(crate) fn forget(&self, view: ViewId) {
        self.views.borrow_mut().remove(&view);
    }
}

/// Owns the completion channel and every view created from it.
pub struct ImageViewHost {
    shared: Rc<HostShared>,
    events: mpsc::UnboundedReceiver<ImageLoadedEvent>,
}

impl ImageViewHost {
    /// Creates a host. `events` must be the receiving end of the channel the
    /// loader reports to.
    #[must_use]
    pub fn new(
        loader: ImageLoader,
        events: mpsc::UnboundedReceiver<ImageLoadedEvent>,
        cache: Option<Arc<dyn ImageCachePort>>,
    ) -> Self {
        Self {
            shared: Rc::new(HostShared {
                loader,
                cache,
                views: RefCell::new(HashMap::new()),
                next_view: Cell::new(1),
                in_flight: Cell::new(0),
                defaults: RefCell::new(ImageViewOptions::default()),
            }),
            events,
        }
    }

    /// Options given to views created by [`ImageViewHost::create_view`].
    pub fn set_default_options(&self, options: ImageViewOptions) {
        *self.shared.defaults.borrow_mut() = options;
    }

    /// Creates a detached, unmeasured view with the default options.
    #[must_use]
    pub fn create_view(&self) -> ImageView {
        let options = self.shared.defaults.borrow().clone();
        self.create_view_with(options)
    }

    /// Creates a detached, unmeasured view.
    #[must_use]
    pub fn create_view_with(&self, options: ImageViewOptions) -> ImageView {
        let id = ViewId(self.shared.next_view.get());
        self.shared.next_view.set(id.0 + 1);

        let view = ImageView::new(id, options, Rc::clone(&self.shared));
        self.shared
            .views
            .borrow_mut()
            .insert(id, Rc::downgrade(view.core()));
        trace!(view = %id, "Created image view");
        view
    }

    /// Routes one completion to its view.
    pub fn deliver(&self, event: ImageLoadedEvent) {
        self.shared
            .in_flight
            .set(self.shared.in_flight.get().saturating_sub(1));

        let target = self.shared.views.borrow().get(&event.view).and_then(Weak::upgrade);
        match target {
            Some(core) => image_view::complete(&core, event),
            None => trace!(view = %event.view, "View gone, dropping result"),
        }
    }

    /// Delivers every completion already received. Returns how many.
    pub fn poll_events(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.events.try_recv() {
            self.deliver(event);
            delivered += 1;
        }
        delivered
    }

    /// Waits for one completion and delivers it. Returns false if the
    /// channel is closed.
    pub async fn next_event(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.deliver(event);
                true
            }
            None => false,
        }
    }

    /// Delivers completions until every dispatched load has reported.
    pub async fn run_until_idle(&mut self) {
        while self.in_flight() > 0 {
            if !self.next_event().await {
                break;
            }
        }
        debug!("All image loads settled");
    }

    /// Loads dispatched and not yet reported.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.get()
    }

    /// Number of live views.
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.shared.views.borrow().len()
    }

    /// Forwards memory pressure to the cache.
    pub fn on_memory_pressure(&self, level: MemoryPressure) {
        if let Some(cache) = &self.shared.cache {
            info!(?level, cached = cache.len(), "Memory pressure");
            cache.on_memory_pressure(level);
        }
    }

    /// The shared cache, if any.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<dyn ImageCachePort>> {
        self.shared.cache.as_ref()
    }
}

impl std::fmt::Debug for ImageViewHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageViewHost")
            .field("views", &self.shared.views.borrow().len())
            .field("in_flight", &self.shared.in_flight.get())
            .finish_non_exhaustive()
    }
}
