//! Core domain + application logic for porygon, the stats summary bot.
//!
//! This crate is intentionally framework-agnostic. Discord, MySQL and the
//! Golbat API live behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod reconcile;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use errors::{Error, Result};
