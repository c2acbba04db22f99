//! External mutation targets for tracked jobs.
//!
//! This crate provides:
//! - `NotificationSink` / `LabelSink` traits for applying observable changes
//!   (edit a status message, rename a channel)
//! - `Resolver` trait for checking that persisted locations still exist
//! - `DiscordClient`, a REST implementation of all three
//!
//! Gateway/command handling is out of scope; everything here is plain
//! request/response against the Discord REST API.

pub mod discord;
pub mod traits;

pub use discord::DiscordClient;
pub use traits::{LabelSink, NotificationLocation, NotificationSink, Resolver, SinkError};
