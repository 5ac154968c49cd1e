//! Reload detection and scoping.
//!
//! Views refetch on a browser reload only when the reload happened on the
//! view itself. A reload on a match detail does not refresh the match list,
//! and a plain in-app navigation refreshes nothing.

use tracing::debug;

use crate::cache::{keys, DurableStore};
use crate::route::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationType {
    Navigate,
    Reload,
    BackForward,
    Prerender,
}

impl NavigationType {
    /// Parse a navigation-timing entry type. Unknown names count as a plain
    /// navigation.
    pub fn from_entry(name: &str) -> Self {
        match name {
            "reload" => NavigationType::Reload,
            "back_forward" => NavigationType::BackForward,
            "prerender" => NavigationType::Prerender,
            _ => NavigationType::Navigate,
        }
    }

    /// Parse the legacy numeric navigation type.
    pub fn from_legacy(code: u8) -> Self {
        match code {
            1 => NavigationType::Reload,
            2 => NavigationType::BackForward,
            _ => NavigationType::Navigate,
        }
    }
}

/// What the host reported about how this load started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationSignals {
    /// Primary signal: the navigation-timing entry type.
    pub entry_type: Option<String>,
    /// Fallback: the legacy numeric type.
    pub legacy_type: Option<u8>,
}

impl NavigationSignals {
    pub fn reload() -> Self {
        Self {
            entry_type: Some("reload".to_string()),
            legacy_type: None,
        }
    }

    pub fn navigate() -> Self {
        Self {
            entry_type: Some("navigate".to_string()),
            legacy_type: None,
        }
    }

    pub fn classify(&self) -> NavigationType {
        if let Some(entry) = &self.entry_type {
            return NavigationType::from_entry(entry);
        }
        self.legacy_type
            .map(NavigationType::from_legacy)
            .unwrap_or(NavigationType::Navigate)
    }
}

/// How the current app load started. Fixed once created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationContext {
    reloaded: Option<Location>,
}

impl NavigationContext {
    /// Classify this load and record (or clear) the reloaded location in
    /// session storage.
    pub fn init(signals: &NavigationSignals, current: &Location, session: &dyn DurableStore) -> Self {
        let kind = signals.classify();
        if kind != NavigationType::Reload {
            if let Err(e) = session.remove(keys::RELOAD_LOCATION) {
                debug!(error = %e, "Failed to clear reload record");
            }
            debug!(?kind, "Load is not a reload");
            return Self { reloaded: None };
        }

        if let Err(e) = session.write(keys::RELOAD_LOCATION, current.full()) {
            debug!(error = %e, "Failed to record reload location");
        }
        debug!(location = %current, "Load is a reload");
        Self {
            reloaded: Some(current.clone()),
        }
    }

    /// A context for a load that was a reload of `location`, without touching
    /// storage.
    pub fn reloaded_at(location: Location) -> Self {
        Self {
            reloaded: Some(location),
        }
    }

    pub fn is_reload(&self) -> bool {
        self.reloaded.is_some()
    }

    pub fn reloaded_location(&self) -> Option<&Location> {
        self.reloaded.as_ref()
    }

    /// True only if this load was a reload and the reloaded location
    /// satisfies `predicate`.
    pub fn is_reload_for(&self, predicate: impl FnOnce(&Location) -> bool) -> bool {
        self.reloaded.as_ref().is_some_and(predicate)
    }

    pub fn is_reload_for_route(&self, route: &str) -> bool {
        self.is_reload_for(|loc| loc.route() == route)
    }

    /// Reload on the match list itself, not on a match detail.
    pub fn is_reload_for_match_list(&self) -> bool {
        self.is_reload_for(|loc| loc.route() == "match" && loc.param("code").is_none())
    }

    pub fn is_reload_for_match_code(&self, code: &str) -> bool {
        self.is_reload_for(|loc| {
            loc.route() == "match" && !code.is_empty() && loc.param("code") == Some(code)
        })
    }

    /// Reload on an admin list view; the manage view does not count.
    pub fn is_reload_for_admin_list(&self) -> bool {
        self.is_reload_for(|loc| {
            loc.route() == "admin"
                && !loc
                    .param("view")
                    .unwrap_or("open")
                    .eq_ignore_ascii_case("manage")
        })
    }

    pub fn is_reload_for_admin_match_code(&self, code: &str) -> bool {
        self.is_reload_for(|loc| {
            loc.route() == "admin" && !code.is_empty() && loc.param("code") == Some(code)
        })
    }
}
