//! Background "is there something newer" checks.
//!
//! A cheap fingerprint read is compared against the last fingerprint seen
//! for a scope. Drift surfaces an [`UpdateAffordance`] the user can apply,
//! follow, or dismiss; the cached listing is only replaced on apply.

pub mod reconciler;
pub mod record;

pub use reconciler::{
    CheckOutcome, CheckReason, Presence, SkipReason, StalenessReconciler, UpdateAffordance,
};
pub use record::{Listing, ReconcileScope, StalenessRecord};
