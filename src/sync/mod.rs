//! Client-side mirror of a user's packs and items.
//!
//! Local edits land in a [`LocalStore`] first and are pushed by a
//! [`SyncCoordinator`], which also pulls server changes every 30 seconds
//! while the [`AuthGate`] holds a token. Failed pushes are retried forever
//! with exponential backoff.

mod auth;
mod backoff;
mod coordinator;
mod entity;
mod repository;
mod store;

pub use auth::AuthGate;
pub use backoff::BackoffPolicy;
pub use coordinator::{SyncCoordinator, SyncReport, PULL_OVERLAP, SYNC_INTERVAL};
pub use entity::SyncEntity;
pub use repository::{HttpRepository, Repository};
pub use store::{LocalStore, MergeReport, PendingWrite, WriteOp};
