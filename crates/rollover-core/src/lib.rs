//! Core types and trait definitions for the Rollover promotion engine.
//!
//! This crate is deliberately free of database and runtime dependencies.
//! The engine and every storage backend depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod class;
pub mod enrollment;
pub mod error;
pub mod progression;
pub mod store;
pub mod year;

pub use error::{Error, Result};
