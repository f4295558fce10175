//! Collaborator interface for the embedded views the server controls.
//!
//! The server never talks to a browser engine or window system directly. It
//! drives a [`Surface`], which creates [`View`]s in two asynchronous steps
//! (environment, then view) and reports completion through callbacks that may
//! fire on any thread. Everything else is a plain call made on the host
//! context.

mod headless;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::headless::{HeadlessEnvironment, HeadlessSurface, HeadlessView, ViewRecord};

/// Native parent window identifier, passed through from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(i64);

impl WindowId {
    /// Wraps a raw native window value.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw native window value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:#x}", self.0)
    }
}

/// View rectangle in parent client coordinates, `[left, top, right, bottom]`
/// on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Bounds {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge.
    pub right: i32,
    /// Bottom edge.
    pub bottom: i32,
}

impl Bounds {
    /// Builds a rectangle from its edges.
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal extent; negative when the edges are inverted.
    #[must_use]
    pub const fn width(self) -> i64 {
        self.right as i64 - self.left as i64
    }

    /// Vertical extent; negative when the edges are inverted.
    #[must_use]
    pub const fn height(self) -> i64 {
        self.bottom as i64 - self.top as i64
    }
}

impl From<[i32; 4]> for Bounds {
    fn from([left, top, right, bottom]: [i32; 4]) -> Self {
        Self::new(left, top, right, bottom)
    }
}

impl From<Bounds> for [i32; 4] {
    fn from(bounds: Bounds) -> Self {
        [bounds.left, bounds.top, bounds.right, bounds.bottom]
    }
}

/// Failures reported by a surface or one of its views.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The engine environment could not be prepared.
    #[error("failed to prepare view environment: {0}")]
    Environment(String),
    /// The view could not be created inside the environment.
    #[error("failed to create view: {0}")]
    Creation(String),
    /// An operation on a live view failed.
    #[error("view operation '{operation}' failed: {message}")]
    Operation {
        /// Operation that failed.
        operation: &'static str,
        /// Engine diagnostic.
        message: String,
    },
}

/// Completion callback handed to the asynchronous surface steps.
pub type Ready<T> = Box<dyn FnOnce(Result<T, SurfaceError>) + Send>;

/// Factory for views. Called only on the host context.
pub trait Surface: 'static {
    /// Engine environment produced by the first creation step.
    type Environment: Send + 'static;
    /// View produced by the second creation step.
    type View: View + Send + 'static;

    /// Starts preparing an environment; `ready` fires exactly once.
    fn prepare_environment(&mut self, ready: Ready<Self::Environment>);

    /// Starts creating a view under `parent`; `ready` fires exactly once.
    fn create_view(
        &mut self,
        environment: Self::Environment,
        parent: WindowId,
        ready: Ready<Self::View>,
    );

    /// Gives keyboard focus to a native window.
    fn focus(&mut self, window: WindowId) -> Result<(), SurfaceError>;
}

/// One live embedded view.
pub trait View {
    /// Moves and resizes the view.
    fn set_bounds(&mut self, bounds: Bounds) -> Result<(), SurfaceError>;

    /// Shows or hides the view.
    fn set_visible(&mut self, visible: bool) -> Result<(), SurfaceError>;

    /// Moves the view under another native window.
    fn set_parent(&mut self, parent: WindowId) -> Result<(), SurfaceError>;

    /// Starts loading `url`.
    fn navigate(&mut self, url: &str) -> Result<(), SurfaceError>;

    /// Title of the current document.
    fn title(&self) -> Result<String, SurfaceError>;

    /// Tears the view down. The view is not used again afterwards.
    fn close(&mut self) -> Result<(), SurfaceError>;
}
