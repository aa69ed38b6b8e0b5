//! Core domain + application logic for the list-to-channel news relay.
//!
//! This crate is intentionally framework-agnostic. Discord and Twitter live
//! behind ports (traits) implemented in adapter crates.

pub mod clock;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod ports;
pub mod rate_limit;
pub mod reconcile;
pub mod state;
pub mod tasks;
pub mod updater;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
