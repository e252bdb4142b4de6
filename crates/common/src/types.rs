use serde::{Deserialize, Serialize};

/// Arena key of an entity in the world. Stable for the entity's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Key of a map owned by the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub u32);

/// Session-unique id of a connected player. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Persistent character identity handed out by the character-id counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub u64);

/// Semantic category of an outgoing line.
///
/// Consecutive lines of one mode form a block; a mode change opens a new
/// block separated by a single blank line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    #[default]
    Misc,
    Command,
    Chat,
    Combat,
}

/// Read-mostly metadata describing the running world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldMeta {
    pub name: String,
    pub version: String,
    pub default_port: u16,
    pub greeting: String,
    pub motd: String,
}

impl Default for WorldMeta {
    fn default() -> Self {
        Self {
            name: "tilemud".into(),
            version: "0.0.0.0".into(),
            default_port: 4000,
            greeting: "This is the greeting.".into(),
            motd: "{\r\n\tTHIS IS THE MOTD.\r\n}".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_mode_default_is_misc() {
        assert_eq!(MessageMode::default(), MessageMode::Misc);
    }

    #[test]
    fn id_display() {
        assert_eq!(EntityId(7).to_string(), "entity#7");
        assert_eq!(PlayerId(3).to_string(), "player#3");
    }

    #[test]
    fn meta_fills_missing_fields_with_defaults() {
        let meta: WorldMeta = serde_json::from_str(r#"{ "name": "elsewhere" }"#).unwrap();
        assert_eq!(meta.name, "elsewhere");
        assert_eq!(meta.default_port, WorldMeta::default().default_port);
        assert_eq!(meta.greeting, WorldMeta::default().greeting);
    }

    #[test]
    fn meta_uses_camel_case_keys() {
        let json = serde_json::to_value(WorldMeta::default()).unwrap();
        assert!(json.get("defaultPort").is_some());
    }
}
