//! Remote API module.
//!
//! This module provides the [`RemoteDataSource`] seam the sync engine talks
//! to, the named operations of the club API, and `ApiClient`, the `reqwest`
//! implementation used in production.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod source;

pub use client::ApiClient;
pub use error::ApiError;
pub use source::{ReadOp, RemoteDataSource, WriteOp};
