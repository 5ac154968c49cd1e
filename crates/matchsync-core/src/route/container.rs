use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use super::generation::{Generation, GenerationClock};

/// What a route's container currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Empty,
    /// Transient placeholder shown on the first visit only.
    Loading,
    Ready(Value),
    Error(String),
}

/// Lifecycle of a route's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Uninitialized,
    Loading,
    Rendered,
}

#[derive(Debug)]
struct State {
    content: Content,
    rendered: bool,
    visible: bool,
    /// Cache key backing the visible content.
    bound_key: Option<String>,
}

/// The surface a route renders into. Reused across visits, so its content
/// survives while another route is active.
///
/// Every mutation made on behalf of a navigation carries that navigation's
/// generation and is dropped once a newer navigation has started.
#[derive(Debug, Clone)]
pub struct Container {
    route: Arc<str>,
    clock: GenerationClock,
    state: Arc<Mutex<State>>,
}

impl Container {
    pub(crate) fn new(route: &str, clock: GenerationClock) -> Self {
        Self {
            route: Arc::from(route),
            clock,
            state: Arc::new(Mutex::new(State {
                content: Content::Empty,
                rendered: false,
                visible: false,
                bound_key: None,
            })),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn content(&self) -> Content {
        self.state.lock().content.clone()
    }

    pub fn is_rendered(&self) -> bool {
        self.state.lock().rendered
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    pub fn bound_key(&self) -> Option<String> {
        self.state.lock().bound_key.clone()
    }

    pub fn status(&self) -> RouteStatus {
        if self.is_rendered() {
            RouteStatus::Rendered
        } else {
            RouteStatus::Loading
        }
    }

    /// Replace the content if `generation` is still current.
    pub fn commit(&self, generation: Generation, content: Content) -> bool {
        if !self.clock.is_current(generation) {
            trace!(route = %self.route, %generation, "Discarding stale update");
            return false;
        }
        self.state.lock().content = content;
        true
    }

    /// Record which cache key backs the content, if `generation` is current.
    pub fn bind_key(&self, generation: Generation, key: impl Into<String>) -> bool {
        if !self.clock.is_current(generation) {
            return false;
        }
        self.state.lock().bound_key = Some(key.into());
        true
    }

    /// Re-render from a cache change, but only while this container is still
    /// the view for `key`.
    pub fn refresh_from(&self, key: &str, content: Content) -> bool {
        let mut state = self.state.lock();
        if state.bound_key.as_deref() != Some(key) {
            return false;
        }
        state.content = content;
        true
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        self.state.lock().visible = visible;
    }

    pub(crate) fn mark_rendered(&self, generation: Generation) -> bool {
        if !self.clock.is_current(generation) {
            return false;
        }
        self.state.lock().rendered = true;
        true
    }
}
