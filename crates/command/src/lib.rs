//! Command dispatch.
//!
//! The registry holds built-in commands in a fixed order followed by user
//! commands in load order. An input line runs the first command whose
//! pattern matches; captured groups (without the whole match) become the
//! command's arguments.
//!
//! # Invariants
//! - At most one command runs per line.
//! - Patterns are case-insensitive regular expressions.
//! - User commands are never registered through the built-in path.

pub mod builtin;
pub mod command;
pub mod user;

pub use builtin::show_room;
pub use command::{Command, CommandContext, CommandError, CommandRegistry};
pub use user::UserCommand;
