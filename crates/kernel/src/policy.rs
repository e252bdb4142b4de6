use crate::World;
use tilemud_common::EntityId;

/// Access and notification hooks attached to a location.
///
/// Every method defaults to "permit" / "do nothing". Concrete rules (locked
/// doors, private rooms, traps) implement this trait and are attached with
/// [`World::set_policy`]. The `can_*` checks run before any mutation of a
/// move; the `on_*` notifications run after the actor has been detached
/// (exit) or attached (enter).
pub trait LocationPolicy: std::fmt::Debug + Send + Sync {
    fn can_enter(&self, _world: &World, _location: EntityId, _actor: EntityId) -> bool {
        true
    }

    fn can_exit(&self, _world: &World, _location: EntityId, _actor: EntityId) -> bool {
        true
    }

    fn on_enter(&self, _world: &mut World, _location: EntityId, _actor: EntityId) {}

    fn on_exit(&self, _world: &mut World, _location: EntityId, _actor: EntityId) {}
}

/// The default policy of every location.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPolicy;

impl LocationPolicy for OpenPolicy {}
