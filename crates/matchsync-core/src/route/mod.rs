//! Hash routing with generation-based cancellation.
//!
//! - `Location`: parsed `#/route?query` locations
//! - `GenerationClock`: monotonically increasing navigation tokens
//! - `Container`: per-route render target, reused across visits
//! - `RouteController`: resolves locations to views and drives rendering

pub mod container;
pub mod controller;
pub mod generation;
pub mod location;

pub use container::{Container, Content, RouteStatus};
pub use controller::{Access, AuthState, NavigationOutcome, RenderContext, RouteController, View};
pub use generation::{Generation, GenerationClock};
pub use location::{Location, DEFAULT_LOCATION};
