//! In-process surface with no rendering.
//!
//! Environment and view creation complete on short-lived background threads,
//! like a real engine would, and every view's state is recorded so callers can
//! inspect it. Used when no native surface is linked, and by tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::debug;

use super::{Bounds, Ready, Surface, SurfaceError, View, WindowId};

const SURFACE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::surface");
const BLANK_TITLE: &str = "about:blank";

/// Recorded state of one headless view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRecord {
    /// Window the view is parented to.
    pub parent: WindowId,
    /// Last applied bounds.
    pub bounds: Bounds,
    /// Whether the view is shown.
    pub visible: bool,
    /// Last navigated URL.
    pub url: Option<String>,
    /// Whether the view has been closed.
    pub closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    views: BTreeMap<u64, ViewRecord>,
    focused: Option<WindowId>,
    environment_failure: Option<String>,
    creation_failure: Option<String>,
}

type SharedState = Arc<Mutex<Shared>>;

fn lock(shared: &SharedState) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Surface that records view state instead of rendering it.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    shared: SharedState,
    next_view: Arc<AtomicU64>,
}

impl HeadlessSurface {
    /// Creates a surface with no views.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next environment preparation fail with `message`.
    pub fn fail_next_environment(&self, message: impl Into<String>) {
        lock(&self.shared).environment_failure = Some(message.into());
    }

    /// Makes the next view creation fail with `message`.
    pub fn fail_next_creation(&self, message: impl Into<String>) {
        lock(&self.shared).creation_failure = Some(message.into());
    }

    /// Snapshot of every view created so far, in creation order.
    #[must_use]
    pub fn views(&self) -> Vec<ViewRecord> {
        lock(&self.shared).views.values().cloned().collect()
    }

    /// Window most recently given focus.
    #[must_use]
    pub fn focused(&self) -> Option<WindowId> {
        lock(&self.shared).focused
    }
}

/// Environment produced by [`HeadlessSurface`].
#[derive(Debug)]
pub struct HeadlessEnvironment {
    _private: (),
}

impl Surface for HeadlessSurface {
    type Environment = HeadlessEnvironment;
    type View = HeadlessView;

    fn prepare_environment(&mut self, ready: Ready<Self::Environment>) {
        let failure = lock(&self.shared).environment_failure.take();
        thread::spawn(move || {
            let result = match failure {
                Some(message) => Err(SurfaceError::Environment(message)),
                None => Ok(HeadlessEnvironment { _private: () }),
            };
            ready(result);
        });
    }

    fn create_view(
        &mut self,
        _environment: Self::Environment,
        parent: WindowId,
        ready: Ready<Self::View>,
    ) {
        let failure = lock(&self.shared).creation_failure.take();
        let shared = Arc::clone(&self.shared);
        let id = self.next_view.fetch_add(1, Ordering::Relaxed);
        thread::spawn(move || {
            if let Some(message) = failure {
                ready(Err(SurfaceError::Creation(message)));
                return;
            }
            lock(&shared).views.insert(
                id,
                ViewRecord {
                    parent,
                    bounds: Bounds::default(),
                    visible: false,
                    url: None,
                    closed: false,
                },
            );
            debug!(target: SURFACE_TARGET, view = id, %parent, "headless view created");
            ready(Ok(HeadlessView { id, shared }));
        });
    }

    fn focus(&mut self, window: WindowId) -> Result<(), SurfaceError> {
        lock(&self.shared).focused = Some(window);
        Ok(())
    }
}

/// View produced by [`HeadlessSurface`].
#[derive(Debug)]
pub struct HeadlessView {
    id: u64,
    shared: SharedState,
}

impl HeadlessView {
    fn update(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut ViewRecord),
    ) -> Result<(), SurfaceError> {
        let mut shared = lock(&self.shared);
        match shared.views.get_mut(&self.id) {
            Some(record) if !record.closed => {
                apply(record);
                Ok(())
            }
            _ => Err(SurfaceError::Operation {
                operation,
                message: "view is closed".to_owned(),
            }),
        }
    }
}

impl View for HeadlessView {
    fn set_bounds(&mut self, bounds: Bounds) -> Result<(), SurfaceError> {
        self.update("set_bounds", |record| record.bounds = bounds)
    }

    fn set_visible(&mut self, visible: bool) -> Result<(), SurfaceError> {
        self.update("set_visible", |record| record.visible = visible)
    }

    fn set_parent(&mut self, parent: WindowId) -> Result<(), SurfaceError> {
        self.update("set_parent", |record| record.parent = parent)
    }

    fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        self.update("navigate", |record| record.url = Some(url.to_owned()))
    }

    fn title(&self) -> Result<String, SurfaceError> {
        let shared = lock(&self.shared);
        Ok(shared
            .views
            .get(&self.id)
            .and_then(|record| record.url.clone())
            .unwrap_or_else(|| BLANK_TITLE.to_owned()))
    }

    fn close(&mut self) -> Result<(), SurfaceError> {
        self.update("close", |record| {
            record.closed = true;
            record.visible = false;
        })
    }
}
