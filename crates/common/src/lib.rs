//! Shared types for the tilemud engine: arena ids, compass directions,
//! output message modes and world metadata.

pub mod direction;
pub mod types;

pub use direction::Direction;
pub use types::{CharacterId, EntityId, MapId, MessageMode, PlayerId, WorldMeta};
