//! Engine: one [`Mud`] owns the world, the players and the command set.
//!
//! Hosts feed it connection events (`connect`, `input`, `disconnect`) one at
//! a time. Each call runs to completion, scripts included, before the next
//! is accepted, so the world needs no locking.
//!
//! # Invariants
//! - Every input line is fully processed before any other event anywhere.
//! - A disconnect unlinks the player from its mob and removes the mob from
//!   the world before returning.
//! - Internal faults are logged; sessions only ever see generic messages.

pub mod config;
pub mod mud;

pub use config::EngineConfig;
pub use mud::{EngineError, Mud};
