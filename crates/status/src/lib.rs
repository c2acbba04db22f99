//! Status source client for the remote game-server status API.
//!
//! This crate provides:
//! - `StatusSource` trait so the scheduler can be driven by mocks in tests
//! - `McStatusClient` implementation over the mcsrvstat.us v3 API
//! - `StatusError` taxonomy (unreachable vs. malformed response)
//!
//! Pure request/response; retry policy belongs to the caller.

pub mod client;

pub use client::{McStatusClient, StatusError, StatusSnapshot, StatusSource};
