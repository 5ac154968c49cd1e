//! Per-view rules for trusting the cache versus going to the network.

use std::time::Duration;

use crate::cache::CacheEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Use whatever is cached; fetch only when nothing is.
    CacheFirst,
    /// Use the cache, and refresh it in the background when the browser
    /// reload happened on this view.
    ReloadRefresh,
    /// Use the cache while it is younger than the given age.
    Ttl(Duration),
    /// Always fetch (explicit refresh buttons).
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Show the cached entry; no request.
    UseCache,
    /// Show the cached entry now and replace it when the request lands.
    RevalidateInBackground,
    /// Nothing usable is cached; wait for the request.
    FetchNow,
}

impl FetchPolicy {
    /// Decide one load. `cached` should already exclude entries the view
    /// cannot use (an empty list that needs an initial fill, for example).
    pub fn decide<T>(&self, cached: Option<&CacheEntry<T>>, reload_here: bool) -> FetchDecision {
        let Some(entry) = cached else {
            return FetchDecision::FetchNow;
        };
        match self {
            FetchPolicy::CacheFirst => FetchDecision::UseCache,
            FetchPolicy::ReloadRefresh if reload_here => FetchDecision::RevalidateInBackground,
            FetchPolicy::ReloadRefresh => FetchDecision::UseCache,
            FetchPolicy::Ttl(ttl) if entry.is_fresh(*ttl) => FetchDecision::UseCache,
            FetchPolicy::Ttl(_) => FetchDecision::RevalidateInBackground,
            FetchPolicy::Always => FetchDecision::FetchNow,
        }
    }
}
