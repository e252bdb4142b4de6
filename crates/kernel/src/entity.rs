use glam::IVec3;
use tilemud_common::{CharacterId, EntityId, MapId, PlayerId};

/// Closed set of entity kinds.
///
/// `Mappable` is a plain placeable thing. `Movable` and `Mob` can be moved
/// through policy-checked movement. Only a `Mob` can be controlled by a
/// player. A `Tile` is a fixed location bound to one map coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Tile { coord: IVec3 },
    Mappable,
    Movable,
    Mob(MobData),
}

/// Identity carried by a mob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MobData {
    /// `None` for mobs that do not belong to a persisted character.
    pub character_id: Option<CharacterId>,
    pub(crate) controller: Option<PlayerId>,
}

/// Kinds that can be spawned at runtime. Tiles only come from map creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Mappable,
    Movable,
    Mob(Option<CharacterId>),
}

impl Archetype {
    pub(crate) fn into_kind(self) -> EntityKind {
        match self {
            Self::Mappable => EntityKind::Mappable,
            Self::Movable => EntityKind::Movable,
            Self::Mob(character_id) => EntityKind::Mob(MobData {
                character_id,
                controller: None,
            }),
        }
    }

    /// Parse the kind names exposed to scripts and savables.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mappable" => Some(Self::Mappable),
            "movable" => Some(Self::Movable),
            "mob" => Some(Self::Mob(None)),
            _ => None,
        }
    }
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tile { .. } => "tile",
            Self::Mappable => "mappable",
            Self::Movable => "movable",
            Self::Mob(_) => "mob",
        }
    }

    fn default_description(&self) -> Option<&'static str> {
        match self {
            Self::Tile { .. } => Some("A tile."),
            Self::Mappable => None,
            Self::Movable => Some("A movable."),
            Self::Mob(_) => Some("A mob."),
        }
    }
}

/// One node of the containment graph.
///
/// Relations (`location`, `contents`, `map`, controller) are only mutated by
/// [`crate::World`], which keeps both directions of every link consistent.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) kind: EntityKind,
    pub(crate) keywords: String,
    pub(crate) display: String,
    pub(crate) description: Option<String>,
    pub(crate) location: Option<EntityId>,
    pub(crate) map: Option<MapId>,
    pub(crate) contents: Vec<EntityId>,
}

impl Entity {
    pub(crate) fn new(kind: EntityKind) -> Self {
        Self {
            keywords: kind.name().to_string(),
            display: kind.name().to_string(),
            description: kind.default_description().map(str::to_string),
            kind,
            location: None,
            map: None,
            contents: Vec::new(),
        }
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn location(&self) -> Option<EntityId> {
        self.location
    }

    pub fn map(&self) -> Option<MapId> {
        self.map
    }

    /// Direct children, in arrival order.
    pub fn contents(&self) -> &[EntityId] {
        &self.contents
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.contents.contains(&id)
    }

    pub fn is_tile(&self) -> bool {
        matches!(self.kind, EntityKind::Tile { .. })
    }

    pub fn is_movable(&self) -> bool {
        matches!(self.kind, EntityKind::Movable | EntityKind::Mob(_))
    }

    pub fn is_mob(&self) -> bool {
        matches!(self.kind, EntityKind::Mob(_))
    }

    /// Grid coordinate, for tiles only.
    pub fn coordinates(&self) -> Option<IVec3> {
        match self.kind {
            EntityKind::Tile { coord } => Some(coord),
            _ => None,
        }
    }

    pub fn character_id(&self) -> Option<CharacterId> {
        match &self.kind {
            EntityKind::Mob(mob) => mob.character_id,
            _ => None,
        }
    }

    pub fn controller(&self) -> Option<PlayerId> {
        match &self.kind {
            EntityKind::Mob(mob) => mob.controller,
            _ => None,
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}
