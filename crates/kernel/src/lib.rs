//! World Kernel: the authoritative tile world graph.
//!
//! Maps own a dense, immutable grid of tiles. Every other entity is spawned
//! into an arena and linked by three relations: location/contents, map
//! assignment, and mob control. All relation changes go through [`World`].
//!
//! # Invariants
//! - `e ∈ p.contents` iff `e.location == p`; no duplicates in any contents.
//! - A located entity is assigned to its location's map.
//! - `e ∈ map.contents` iff `e.map == map`.
//! - A tile's location, map and coordinates never change.
//! - Mob/player control is one-to-one and linked in both directions.
//! - A denied move leaves the world untouched.

pub mod entity;
pub mod map;
pub mod policy;
pub mod savable;
pub mod world;

pub use entity::{Archetype, Entity, EntityKind, MobData};
pub use map::{MAX_TILES, Map};
pub use policy::{LocationPolicy, OpenPolicy};
pub use savable::{Savable, SavableKind};
pub use world::{World, WorldError, WorldEvent};
