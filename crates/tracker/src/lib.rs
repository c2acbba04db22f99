//! Job tracking and recovery.
//!
//! This crate is the heart of statuswatch:
//! - `store` — the durable job registry (`jobs.json`), merge-on-save with
//!   a single serialized writer
//! - `scheduler` — live timers per job: poll/diff/apply cycles, expiry
//!   countdowns, and post-expiry grace deletion
//! - `recovery` — startup reconciliation of persisted jobs against the
//!   presentation layer
//! - `render` — the human-readable status strings applied to the sinks

pub mod recovery;
pub mod render;
pub mod scheduler;
pub mod store;

pub use recovery::{RecoveryCoordinator, RecoveryReport};
pub use scheduler::{JobScheduler, JobState};
pub use store::{JobStore, SharedJobStore, StoreError};

#[cfg(test)]
pub(crate) mod testing;
