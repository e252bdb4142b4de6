use crate::entity::EntityKind;
use crate::world::{World, WorldError};
use glam::IVec3;
use serde::{Deserialize, Serialize};
use tilemud_common::{CharacterId, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SavableKind {
    Mappable,
    Movable,
    Mob,
    Tile,
}

/// Serializable snapshot of an entity and everything it contains.
///
/// Back-references (location entity, map) are not stored. A movable standing
/// on a tile records the tile coordinates instead so it can be put back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Savable {
    #[serde(rename = "type")]
    pub kind: SavableKind,
    pub keywords: String,
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CharacterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<IVec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<IVec3>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<Savable>,
}

impl World {
    /// Snapshot `id` and its contents, recursively.
    pub fn to_savable(&self, id: EntityId) -> Result<Savable, WorldError> {
        let entity = self.get(id).ok_or(WorldError::EntityNotFound(id))?;
        let kind = match entity.kind() {
            EntityKind::Tile { .. } => SavableKind::Tile,
            EntityKind::Mappable => SavableKind::Mappable,
            EntityKind::Movable => SavableKind::Movable,
            EntityKind::Mob(_) => SavableKind::Mob,
        };
        let location = if entity.is_movable() {
            entity
                .location()
                .and_then(|loc| self.get(loc))
                .and_then(|tile| tile.coordinates())
        } else {
            None
        };
        let contents = entity
            .contents()
            .iter()
            .map(|child| self.to_savable(*child))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Savable {
            kind,
            keywords: entity.keywords().to_string(),
            display: entity.display().to_string(),
            description: entity.description().map(str::to_string),
            id: entity.character_id(),
            coordinates: entity.coordinates(),
            location,
            contents,
        })
    }
}
