//! Script sandbox: runs user-authored command bodies against the world.
//!
//! Every invocation gets a fresh Rhai engine and scope. The surface is a
//! fixed set of registered functions over the world graph plus three
//! variables: `user` (the invoking mob), `args` (captured groups) and `meta`
//! (a copy of the world metadata).
//!
//! # Invariants
//! - Scripts never see transports, persistence, the command registry or the
//!   host process. Modules and `eval` are unavailable.
//! - Every run is bounded by [`SandboxLimits`].
//! - A fault aborts only the invocation that raised it. Mutations made before
//!   the fault are kept; there is no rollback.

mod api;
pub mod sandbox;

pub use api::ScriptEntity;
pub use sandbox::{Invocation, SandboxLimits, ScriptError, ScriptMessage, ScriptOutcome, ScriptSandbox};
