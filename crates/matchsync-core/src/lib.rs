//! matchsync-core - client-side sync and cache-coherency engine for the
//! matchsync club app.
//!
//! The engine decides, per view, whether to trust locally persisted data or
//! go to the network; cancels stale work when the user navigates away;
//! collapses identical concurrent reads; and turns background "is there
//! something newer" checks into an update prompt the user controls.
//!
//! Start with [`SyncEngine::builder`] and [`App::new`].

pub mod activity;
pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod logging;
pub mod models;
pub mod navigation;
pub mod policy;
pub mod prefetch;
pub mod route;
pub mod staleness;
pub mod views;

pub use activity::{ActivityGuard, ActivityIndicator, BusySurface, NoopSurface};
pub use api::{ApiClient, ApiError, ReadOp, RemoteDataSource, WriteOp};
pub use app::App;
pub use auth::AuthSession;
pub use cache::{CacheEntry, FileStore, MemoryStore, PersistentCache};
pub use config::Config;
pub use dedup::RequestDeduplicator;
pub use engine::{Fetched, SyncEngine, SyncEngineBuilder};
pub use logging::init_tracing;
pub use navigation::{NavigationContext, NavigationSignals, NavigationType};
pub use policy::{FetchDecision, FetchPolicy};
pub use route::{Container, Content, Location, NavigationOutcome, RouteController, View};
pub use staleness::{CheckOutcome, CheckReason, StalenessReconciler, UpdateAffordance};
