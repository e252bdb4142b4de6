//! Persistence: the on-disk data directory of a world.
//!
//! Layout inside the data directory:
//! ```text
//! meta.json        - world metadata (name, version, port, greeting, MOTD)
//! persistent.json  - monotonically increasing character-id counter
//! commands/*.json  - user commands: { "pattern": <regex>, "body": <script> }
//! ```
//!
//! # Invariants
//! - Every write stages into a temporary file in the same directory and is
//!   renamed over the target; a failed save never corrupts existing files.
//! - The character-id counter is saved on every allocation and never reused.
//! - A malformed user-command file is logged and skipped; it never prevents
//!   the rest of the directory from loading.

pub mod restore;
pub mod store;

pub use restore::restore;
pub use store::{Database, Persistent, StoreError, UserCommandDef};
