//! The data side of the app's routes.
//!
//! Views read the cache first, decide per their [`FetchPolicy`] whether to
//! go to the network, and commit [`Content`] into their route's container.
//! Markup is left to the surface consuming that content.
//!
//! [`FetchPolicy`]: crate::policy::FetchPolicy

pub mod admin;
pub mod leaderboard;
pub mod login;
pub mod matches;
pub mod players;
mod season;

pub use admin::AdminView;
pub use leaderboard::LeaderboardView;
pub use login::LoginView;
pub use matches::{refresh_match_detail, MatchView};
pub use players::{load_players, refresh_players};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::cache::PersistentCache;
use crate::route::{Container, Content};

/// Keep `container` in step with the cache entry it is bound to.
///
/// Every cache write is broadcast; when the written key is the container's
/// bound key, `render` rebuilds the content from the cache. Writes to other
/// keys, and writes that land after the container moved on to another key,
/// are ignored.
pub fn follow_cache<F>(cache: &PersistentCache, container: Container, render: F) -> JoinHandle<()>
where
    F: Fn(&str) -> Option<Content> + Send + Sync + 'static,
{
    let mut changes = cache.subscribe();
    tokio::spawn(async move {
        loop {
            let key = match changes.recv().await {
                Ok(key) => key,
                // Missed writes; the bound key may be among them.
                Err(RecvError::Lagged(skipped)) => {
                    trace!(route = %container.route(), skipped, "Cache follower lagged");
                    match container.bound_key() {
                        Some(key) => key,
                        None => continue,
                    }
                }
                Err(RecvError::Closed) => break,
            };
            if container.bound_key().as_deref() != Some(key.as_str()) {
                continue;
            }
            if let Some(content) = render(&key) {
                if container.refresh_from(&key, content) {
                    trace!(route = %container.route(), key = %key, "Re-rendered from cache");
                }
            }
        }
    })
}
