//! Sessions: one [`Player`] per live connection.
//!
//! A player owns its transport, its current output mode and at most one
//! pending continuation. Continuations are plain data (for example the
//! [`Onboarding`] state), so the next input line is routed by matching on
//! state rather than by calling a stored closure.
//!
//! # Invariants
//! - A pending continuation is cleared before it is resumed; resuming may
//!   register the next one.
//! - Consecutive lines of one output mode are not separated; a mode change
//!   inserts exactly one blank line.
//! - The output mode resets at the start of every input line.

pub mod onboarding;
pub mod player;
pub mod transport;

pub use onboarding::{CharacterSheet, Onboarding};
pub use player::{Player, Players};
pub use transport::{MemoryTransport, Transport};
