use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::container::{Container, Content, RouteStatus};
use super::generation::{Generation, GenerationClock};
use super::location::{Location, DEFAULT_LOCATION};

/// Everything a view needs for one render.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub container: Container,
    pub location: Location,
    pub generation: Generation,
    clock: GenerationClock,
}

impl RenderContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.location.param(name)
    }

    /// Whether this render still belongs to the latest navigation.
    pub fn is_current(&self) -> bool {
        self.clock.is_current(self.generation)
    }

    pub fn commit(&self, content: Content) -> bool {
        self.container.commit(self.generation, content)
    }

    pub fn bind_key(&self, key: impl Into<String>) -> bool {
        self.container.bind_key(self.generation, key)
    }
}

/// The data side of one route.
#[async_trait]
pub trait View: Send + Sync {
    async fn render(&self, ctx: &RenderContext) -> anyhow::Result<()>;

    /// Views that depend on ambient state (auth status and the like) render
    /// on every visit, even when the location is unchanged.
    fn always_render(&self) -> bool {
        false
    }

    /// Called instead of `render` when a visit is skipped because nothing
    /// changed.
    async fn activated(&self, _ctx: &RenderContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Admin,
}

/// Reports the session state routes are guarded on.
pub trait AuthState: Send + Sync {
    fn has_token(&self) -> bool;

    fn is_admin(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Rendered,
    /// Same location as the route's last visit; nothing re-rendered.
    Skipped,
    /// A newer navigation started before this render finished.
    Superseded,
    /// The render failed; the container shows an error.
    Failed(String),
    /// Access denied; the host should navigate here instead.
    Redirect(Location),
}

struct RouteSlot {
    view: Arc<dyn View>,
    access: Access,
    container: Option<Container>,
    last_location: Option<String>,
}

#[derive(Default)]
struct RouterState {
    routes: HashMap<String, RouteSlot>,
    active: Option<String>,
    location: Option<Location>,
}

struct Inner {
    clock: GenerationClock,
    default_location: Location,
    login_location: Location,
    auth: Option<Arc<dyn AuthState>>,
    document_visible: AtomicBool,
    state: Mutex<RouterState>,
}

/// Hash router with per-route containers.
///
/// Each location change mints a new generation. A route whose location did
/// not change since its last visit is not rendered again; its container is
/// simply shown.
#[derive(Clone)]
pub struct RouteController {
    inner: Arc<Inner>,
}

impl RouteController {
    pub fn new(clock: GenerationClock) -> Self {
        Self::with_auth(clock, None)
    }

    pub fn with_auth(clock: GenerationClock, auth: Option<Arc<dyn AuthState>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                default_location: Location::parse(DEFAULT_LOCATION),
                login_location: Location::parse("#/login"),
                auth,
                document_visible: AtomicBool::new(true),
                state: Mutex::new(RouterState::default()),
            }),
        }
    }

    pub fn register(&self, route: &str, access: Access, view: Arc<dyn View>) {
        self.inner.state.lock().routes.insert(
            route.to_string(),
            RouteSlot {
                view,
                access,
                container: None,
                last_location: None,
            },
        );
    }

    pub fn clock(&self) -> &GenerationClock {
        &self.inner.clock
    }

    pub fn current_location(&self) -> Option<Location> {
        self.inner.state.lock().location.clone()
    }

    pub fn active_route(&self) -> Option<String> {
        self.inner.state.lock().active.clone()
    }

    pub fn is_active(&self, route: &str) -> bool {
        self.inner.state.lock().active.as_deref() == Some(route)
    }

    pub fn container(&self, route: &str) -> Option<Container> {
        self.inner
            .state
            .lock()
            .routes
            .get(route)
            .and_then(|slot| slot.container.clone())
    }

    pub fn route_status(&self, route: &str) -> RouteStatus {
        self.container(route)
            .map(|c| c.status())
            .unwrap_or(RouteStatus::Uninitialized)
    }

    /// Whether the host document is shown (e.g. the browser tab is in front).
    pub fn set_document_visible(&self, visible: bool) {
        self.inner.document_visible.store(visible, Ordering::SeqCst);
    }

    pub fn is_document_visible(&self) -> bool {
        self.inner.document_visible.load(Ordering::SeqCst)
    }

    /// Render the initial location, or the default route when there is none.
    pub async fn start(&self, initial: Option<Location>) -> NavigationOutcome {
        let location = initial.unwrap_or_else(|| self.inner.default_location.clone());
        info!(location = %location, "Starting router");
        self.navigate(location).await
    }

    fn access_redirect(&self, access: Access) -> Option<Location> {
        let auth = self.inner.auth.as_ref()?;
        match access {
            Access::Public => None,
            Access::Authenticated if !auth.has_token() => Some(self.inner.login_location.clone()),
            Access::Admin if !auth.has_token() => Some(self.inner.login_location.clone()),
            Access::Admin if !auth.is_admin() => Some(self.inner.default_location.clone()),
            _ => None,
        }
    }

    /// Handle a location change.
    pub async fn navigate(&self, location: Location) -> NavigationOutcome {
        let generation = self.inner.clock.mint();

        let (route, location, view, access) = {
            let state = self.inner.state.lock();
            let (route, location) = if state.routes.contains_key(location.route()) {
                (location.route().to_string(), location)
            } else {
                debug!(location = %location, "Unknown route, using default");
                let fallback = self.inner.default_location.clone();
                (fallback.route().to_string(), fallback)
            };
            match state.routes.get(&route) {
                Some(slot) => (route, location, slot.view.clone(), slot.access),
                None => {
                    warn!(route = %route, "Default route is not registered");
                    return NavigationOutcome::Failed(format!("No view for route {}", route));
                }
            }
        };

        if let Some(target) = self.access_redirect(access) {
            debug!(route = %route, target = %target, "Access denied, redirecting");
            return NavigationOutcome::Redirect(target);
        }

        let (container, first_time, should_render) = {
            let mut state = self.inner.state.lock();
            state.active = Some(route.clone());
            state.location = Some(location.clone());

            for (name, slot) in state.routes.iter() {
                if let Some(c) = &slot.container {
                    c.set_visible(*name == route);
                }
            }

            let clock = self.inner.clock.clone();
            let Some(slot) = state.routes.get_mut(&route) else {
                return NavigationOutcome::Failed(format!("No view for route {}", route));
            };
            let container = slot
                .container
                .get_or_insert_with(|| Container::new(&route, clock))
                .clone();
            container.set_visible(true);

            let first_time = !container.is_rendered();
            let changed = slot.last_location.as_deref() != Some(location.full());
            slot.last_location = Some(location.full().to_string());
            (container, first_time, first_time || changed || view.always_render())
        };

        let ctx = RenderContext {
            container: container.clone(),
            location,
            generation,
            clock: self.inner.clock.clone(),
        };

        if !should_render {
            trace!(route = %route, %generation, "Location unchanged, skipping render");
            if let Err(e) = view.activated(&ctx).await {
                debug!(route = %route, error = %e, "Activation hook failed");
            }
            return NavigationOutcome::Skipped;
        }

        if first_time {
            container.commit(generation, Content::Loading);
        }

        debug!(route = %route, location = %ctx.location, %generation, "Rendering route");
        match view.render(&ctx).await {
            Ok(()) => {
                if container.mark_rendered(generation) {
                    NavigationOutcome::Rendered
                } else {
                    trace!(route = %route, %generation, "Render finished after a newer navigation");
                    NavigationOutcome::Superseded
                }
            }
            Err(e) => {
                warn!(route = %route, error = %e, "Render failed");
                let message = format!("Something went wrong: {}", e);
                container.commit(generation, Content::Error(message.clone()));
                NavigationOutcome::Failed(message)
            }
        }
    }
}
