use crate::entity::{Archetype, Entity, EntityKind};
use crate::map::{Map, tile_count_for};
use crate::policy::{LocationPolicy, OpenPolicy};
use glam::{IVec3, UVec3};
use std::collections::BTreeMap;
use std::sync::Arc;
use tilemud_common::{Direction, EntityId, MapId, PlayerId};

/// A record produced by every relation change in the world.
///
/// The log is drained by the host after each processed input; it is the
/// observable trace of hook ordering and relinking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    MapCreated {
        map: MapId,
        dimensions: UVec3,
    },
    Spawned {
        id: EntityId,
        kind: &'static str,
    },
    Despawned {
        id: EntityId,
    },
    Relocated {
        id: EntityId,
        from: Option<EntityId>,
        to: Option<EntityId>,
    },
    Remapped {
        id: EntityId,
        from: Option<MapId>,
        to: Option<MapId>,
    },
    Exited {
        location: EntityId,
        actor: EntityId,
    },
    Entered {
        location: EntityId,
        actor: EntityId,
    },
    ControllerChanged {
        mob: EntityId,
        from: Option<PlayerId>,
        to: Option<PlayerId>,
    },
}

/// Errors from world operations.
///
/// Denied movement is not an error: it is reported as `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("{0} not found")]
    EntityNotFound(EntityId),
    #[error("map {0:?} not found")]
    MapNotFound(MapId),
    #[error("{0} is a tile; tiles never change location or map")]
    TileFixed(EntityId),
    #[error("{0} is not movable")]
    NotMovable(EntityId),
    #[error("{0} is not a mob")]
    NotAMob(EntityId),
    #[error("{0} is controlled by a player")]
    Controlled(EntityId),
    #[error("a {0} map exceeds the tile limit")]
    MapTooLarge(UVec3),
    #[error("placing {entity} inside {location} would create a containment cycle")]
    ContainmentCycle {
        entity: EntityId,
        location: EntityId,
    },
}

static OPEN: OpenPolicy = OpenPolicy;

/// The authoritative world graph.
///
/// Entities live in an arena keyed by [`EntityId`]. Location, map assignment
/// and mob control are index relations; each has exactly one relink
/// operation (`set_location`, `set_map`, `set_controller`) that updates both
/// directions of the link, so the graph invariants hold after every call:
///
/// - `e ∈ p.contents ⇔ e.location == p`
/// - a located entity shares its location's map
/// - `e ∈ map.contents ⇔ e.map == map`
/// - a mob and a player control each other or neither does
#[derive(Debug, Clone, Default)]
pub struct World {
    entities: BTreeMap<EntityId, Entity>,
    maps: BTreeMap<MapId, Map>,
    policies: BTreeMap<EntityId, Arc<dyn LocationPolicy>>,
    controllers: BTreeMap<PlayerId, EntityId>,
    next_entity: u64,
    next_map: u32,
    event_log: Vec<WorldEvent>,
}

impl World {
    /// Create an empty world with no maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities, tiles included.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// The entity `id`, or `None` once despawned.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Every live entity in id order.
    pub fn entities(&self) -> &BTreeMap<EntityId, Entity> {
        &self.entities
    }

    /// The map `id`, if it was created by this world.
    pub fn map(&self, id: MapId) -> Option<&Map> {
        self.maps.get(&id)
    }

    /// Maps in creation order.
    pub fn maps(&self) -> impl Iterator<Item = &Map> {
        self.maps.values()
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    fn entity(&self, id: EntityId) -> Result<&Entity, WorldError> {
        self.entities.get(&id).ok_or(WorldError::EntityNotFound(id))
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, WorldError> {
        self.entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))
    }

    fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        id
    }

    // --- Maps ---

    /// Create a map and its dense tile grid. Dimensions are fixed for life;
    /// a zero dimension yields a map without tiles. Grids larger than
    /// [`crate::map::MAX_TILES`] are refused.
    pub fn create_map(&mut self, width: u32, height: u32, layers: u32) -> Result<MapId, WorldError> {
        let dimensions = UVec3::new(width, height, layers);
        let count = tile_count_for(dimensions).ok_or(WorldError::MapTooLarge(dimensions))?;
        let id = MapId(self.next_map);
        self.next_map += 1;

        let mut tiles = Vec::with_capacity(count);
        for z in 0..layers {
            for y in 0..height {
                for x in 0..width {
                    let tile_id = self.allocate();
                    let mut tile = Entity::new(EntityKind::Tile {
                        coord: IVec3::new(x as i32, y as i32, z as i32),
                    });
                    tile.map = Some(id);
                    self.entities.insert(tile_id, tile);
                    tiles.push(tile_id);
                }
            }
        }

        self.maps.insert(id, Map::new(id, dimensions, tiles));
        self.event_log.push(WorldEvent::MapCreated { map: id, dimensions });
        tracing::debug!(map = id.0, width, height, layers, "map created");
        Ok(id)
    }

    /// Shortcut for `map(id)?.locate(x, y, z)`.
    pub fn locate(&self, map: MapId, x: i32, y: i32, z: i32) -> Option<EntityId> {
        self.maps.get(&map)?.locate(x, y, z)
    }

    // --- Spawning ---

    /// Create an unplaced, unmapped entity.
    pub fn spawn(&mut self, archetype: Archetype) -> EntityId {
        let id = self.allocate();
        let entity = Entity::new(archetype.into_kind());
        let kind = entity.kind.name();
        self.entities.insert(id, entity);
        self.event_log.push(WorldEvent::Spawned { id, kind });
        id
    }

    /// Destroy an entity and everything it contains.
    ///
    /// Every relation of every removed entity is unlinked first. Returns the
    /// number of entities removed. Refused while any mob in the subtree is
    /// controlled: release it or move it out first.
    pub fn despawn(&mut self, id: EntityId) -> Result<usize, WorldError> {
        if self.entity(id)?.is_tile() {
            return Err(WorldError::TileFixed(id));
        }
        if let Some(mob) = self.controlled_within(id).first() {
            return Err(WorldError::Controlled(*mob));
        }

        let mut doomed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(e) = self.entities.get(&next) {
                stack.extend(e.contents.iter().copied());
                doomed.push(next);
            }
        }

        self.set_location(id, None)?;
        for victim in doomed.iter().rev() {
            let Some(entity) = self.entities.remove(victim) else {
                continue;
            };
            if let Some(player) = entity.controller() {
                self.controllers.remove(&player);
            }
            if let Some(map) = entity.map.and_then(|m| self.maps.get_mut(&m)) {
                map.remove_from_contents(*victim);
            }
            self.policies.remove(victim);
            self.event_log.push(WorldEvent::Despawned { id: *victim });
        }
        Ok(doomed.len())
    }

    /// Controlled mobs in the subtree rooted at `id`, `id` included.
    pub fn controlled_within(&self, id: EntityId) -> Vec<EntityId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(e) = self.entities.get(&next) {
                if e.controller().is_some() {
                    found.push(next);
                }
                stack.extend(e.contents.iter().copied());
            }
        }
        found
    }

    // --- Descriptive fields ---

    /// Replace the space-separated words the entity answers to.
    pub fn set_keywords(&mut self, id: EntityId, keywords: impl Into<String>) -> Result<(), WorldError> {
        self.entity_mut(id)?.keywords = keywords.into();
        Ok(())
    }

    /// Replace the short name shown in room listings.
    pub fn set_display(&mut self, id: EntityId, display: impl Into<String>) -> Result<(), WorldError> {
        self.entity_mut(id)?.display = display.into();
        Ok(())
    }

    /// Set or clear the long description.
    pub fn set_description(&mut self, id: EntityId, description: Option<String>) -> Result<(), WorldError> {
        self.entity_mut(id)?.description = description;
        Ok(())
    }

    // --- Location relation ---

    /// Relink `id` under `location`, or detach it with `None`.
    ///
    /// Detaches from the old parent's contents, attaches to the new parent's
    /// contents, and moves the whole subtree onto the new parent's map.
    /// Detaching keeps the current map assignment. Setting the current
    /// location again is a no-op. No policy hooks run here.
    pub fn set_location(&mut self, id: EntityId, location: Option<EntityId>) -> Result<(), WorldError> {
        let entity = self.entity(id)?;
        if entity.is_tile() {
            return Err(WorldError::TileFixed(id));
        }
        if entity.location == location {
            return Ok(());
        }
        let target_map = match location {
            Some(loc) => {
                self.check_placement(id, loc)?;
                Some(self.entity(loc)?.map)
            }
            None => None,
        };

        let from = self.detach(id);
        if let (Some(loc), Some(map)) = (location, target_map) {
            self.attach(id, loc);
            self.assign_map(id, map);
        }
        self.event_log.push(WorldEvent::Relocated {
            id,
            from,
            to: location,
        });
        Ok(())
    }

    /// Relink the map assignment of `id` (and its subtree).
    ///
    /// The current location is cleared when its map differs from `map`.
    pub fn set_map(&mut self, id: EntityId, map: Option<MapId>) -> Result<(), WorldError> {
        let entity = self.entity(id)?;
        if entity.is_tile() {
            return Err(WorldError::TileFixed(id));
        }
        if let Some(m) = map {
            if !self.maps.contains_key(&m) {
                return Err(WorldError::MapNotFound(m));
            }
        }
        if entity.map == map {
            return Ok(());
        }

        let location = entity.location;
        if let Some(loc) = location {
            if self.entity(loc)?.map != map {
                self.detach(id);
                self.event_log.push(WorldEvent::Relocated {
                    id,
                    from: Some(loc),
                    to: None,
                });
            }
        }
        self.assign_map(id, map);
        Ok(())
    }

    fn check_placement(&self, id: EntityId, location: EntityId) -> Result<(), WorldError> {
        let mut cursor = Some(location);
        while let Some(current) = cursor {
            if current == id {
                return Err(WorldError::ContainmentCycle {
                    entity: id,
                    location,
                });
            }
            cursor = self.entity(current)?.location;
        }
        Ok(())
    }

    fn detach(&mut self, id: EntityId) -> Option<EntityId> {
        let old = self.entities.get_mut(&id)?.location.take()?;
        if let Some(parent) = self.entities.get_mut(&old) {
            parent.contents.retain(|c| *c != id);
        }
        Some(old)
    }

    fn attach(&mut self, id: EntityId, location: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.location = Some(location);
        }
        if let Some(parent) = self.entities.get_mut(&location) {
            if !parent.contents.contains(&id) {
                parent.contents.push(id);
            }
        }
    }

    fn assign_map(&mut self, root: EntityId, map: Option<MapId>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            if entity.map == map {
                continue;
            }
            let old = std::mem::replace(&mut entity.map, map);
            stack.extend(entity.contents.iter().copied());

            if let Some(old_map) = old.and_then(|m| self.maps.get_mut(&m)) {
                old_map.remove_from_contents(id);
            }
            if let Some(new_map) = map.and_then(|m| self.maps.get_mut(&m)) {
                new_map.add_to_contents(id);
            }
            self.event_log.push(WorldEvent::Remapped { id, from: old, to: map });
        }
    }

    // --- Policies and movement ---

    /// Attach access hooks to a location, replacing any previous ones.
    pub fn set_policy(&mut self, location: EntityId, policy: Arc<dyn LocationPolicy>) -> Result<(), WorldError> {
        self.entity(location)?;
        self.policies.insert(location, policy);
        Ok(())
    }

    fn policy(&self, location: EntityId) -> &dyn LocationPolicy {
        match self.policies.get(&location) {
            Some(policy) => policy.as_ref(),
            None => &OPEN,
        }
    }

    /// Whether the current location lets `actor` out and `target` lets it in.
    pub fn can_move(&self, actor: EntityId, target: EntityId) -> bool {
        let Some(entity) = self.entities.get(&actor) else {
            return false;
        };
        if let Some(current) = entity.location {
            if !self.policy(current).can_exit(self, current, actor) {
                return false;
            }
        }
        self.policy(target).can_enter(self, target, actor)
    }

    /// Policy-checked move of a movable entity into `target`.
    ///
    /// All-or-nothing: a denied move mutates nothing and returns `Ok(false)`.
    /// On success the order is fixed: detach, exit hook of the old location,
    /// attach, enter hook of the new location.
    pub fn move_entity(&mut self, actor: EntityId, target: EntityId) -> Result<bool, WorldError> {
        if !self.entity(actor)?.is_movable() {
            return Err(WorldError::NotMovable(actor));
        }
        self.check_placement(actor, target)?;
        if !self.can_move(actor, target) {
            tracing::debug!(%actor, %target, "move denied by policy");
            return Ok(false);
        }

        let old = self.entity(actor)?.location;
        self.set_location(actor, None)?;
        if let Some(old) = old {
            self.event_log.push(WorldEvent::Exited {
                location: old,
                actor,
            });
            if let Some(policy) = self.policies.get(&old).cloned() {
                policy.on_exit(self, old, actor);
            }
        }

        self.set_location(actor, Some(target))?;
        self.event_log.push(WorldEvent::Entered {
            location: target,
            actor,
        });
        if let Some(policy) = self.policies.get(&target).cloned() {
            policy.on_enter(self, target, actor);
        }
        Ok(true)
    }

    /// The tile one step away from the tile `id` stands on.
    pub fn neighbor(&self, id: EntityId, direction: Direction) -> Option<EntityId> {
        let location = self.entities.get(&id)?.location?;
        let tile = self.entities.get(&location)?;
        let coord = tile.coordinates()?;
        self.maps.get(&tile.map?)?.locate_coord(coord + direction.delta())
    }

    /// Move one tile in `direction`. `Ok(false)` when not standing on a tile,
    /// when the destination is off the map, or when policy denies the move.
    pub fn step(&mut self, actor: EntityId, direction: Direction) -> Result<bool, WorldError> {
        self.entity(actor)?;
        match self.neighbor(actor, direction) {
            Some(target) => self.move_entity(actor, target),
            None => Ok(false),
        }
    }

    /// Move to the tile at `coord` on the actor's current map.
    pub fn move_to(&mut self, actor: EntityId, coord: IVec3) -> Result<bool, WorldError> {
        let target = self
            .entity(actor)?
            .map
            .and_then(|m| self.maps.get(&m))
            .and_then(|m| m.locate_coord(coord));
        match target {
            Some(target) => self.move_entity(actor, target),
            None => Ok(false),
        }
    }

    // --- Control relation ---

    /// Relink the controlling player of a mob, or release it with `None`.
    ///
    /// A player controls at most one mob: binding a player that already
    /// controls another mob releases that mob first.
    pub fn set_controller(&mut self, mob: EntityId, player: Option<PlayerId>) -> Result<(), WorldError> {
        let current = match &self.entity(mob)?.kind {
            EntityKind::Mob(data) => data.controller,
            _ => return Err(WorldError::NotAMob(mob)),
        };
        if current == player {
            return Ok(());
        }

        if let Some(old) = current {
            self.controllers.remove(&old);
        }
        if let Some(new) = player {
            if let Some(previous) = self.controllers.insert(new, mob) {
                self.write_controller(previous, None);
                self.event_log.push(WorldEvent::ControllerChanged {
                    mob: previous,
                    from: Some(new),
                    to: None,
                });
            }
        }
        self.write_controller(mob, player);
        self.event_log.push(WorldEvent::ControllerChanged {
            mob,
            from: current,
            to: player,
        });
        Ok(())
    }

    fn write_controller(&mut self, mob: EntityId, player: Option<PlayerId>) {
        if let Some(Entity {
            kind: EntityKind::Mob(data),
            ..
        }) = self.entities.get_mut(&mob)
        {
            data.controller = player;
        }
    }

    /// The mob controlled by `player`, if any.
    pub fn controlled_by(&self, player: PlayerId) -> Option<EntityId> {
        self.controllers.get(&player).copied()
    }

    /// The player controlling `mob`, if any.
    pub fn controller_of(&self, mob: EntityId) -> Option<PlayerId> {
        self.entities.get(&mob)?.controller()
    }

    // --- Diagnostics ---

    /// Check every graph invariant and describe each violation found.
    pub fn audit(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (id, entity) in &self.entities {
            if let Some(loc) = entity.location {
                match self.entities.get(&loc) {
                    None => problems.push(format!("{id} located in missing {loc}")),
                    Some(parent) => {
                        if !parent.contents.contains(id) {
                            problems.push(format!("{id} located in {loc} but not in its contents"));
                        }
                        if parent.map != entity.map {
                            problems.push(format!("{id} map differs from its location {loc}"));
                        }
                    }
                }
            }
            for child in &entity.contents {
                match self.entities.get(child) {
                    Some(c) if c.location == Some(*id) => {}
                    _ => problems.push(format!("{child} in contents of {id} but located elsewhere")),
                }
            }
            if entity.contents.len() != entity.contents.iter().collect::<std::collections::BTreeSet<_>>().len() {
                problems.push(format!("{id} has duplicate contents entries"));
            }
            if let Some(map) = entity.map {
                if !self.maps.get(&map).is_some_and(|m| m.contains(*id)) {
                    problems.push(format!("{id} assigned to map {map:?} but missing from its contents"));
                }
            }
            if let Some(player) = entity.controller() {
                if self.controllers.get(&player) != Some(id) {
                    problems.push(format!("{id} controlled by {player} without a back-link"));
                }
            }
        }
        for map in self.maps.values() {
            for id in map.contents() {
                if self.entities.get(id).and_then(|e| e.map) != Some(map.id()) {
                    problems.push(format!("{id} in contents of map {:?} but assigned elsewhere", map.id()));
                }
            }
        }
        for (player, mob) in &self.controllers {
            if self.controller_of(*mob) != Some(*player) {
                problems.push(format!("{player} controls {mob} without a back-link"));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tilemud_common::CharacterId;

    #[derive(Debug)]
    struct Closed;

    impl LocationPolicy for Closed {
        fn can_enter(&self, _: &World, _: EntityId, _: EntityId) -> bool {
            false
        }
    }

    #[derive(Debug)]
    struct Sticky;

    impl LocationPolicy for Sticky {
        fn can_exit(&self, _: &World, _: EntityId, _: EntityId) -> bool {
            false
        }
    }

    #[derive(Debug, Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl LocationPolicy for Recorder {
        fn on_enter(&self, world: &mut World, location: EntityId, actor: EntityId) {
            // The actor is already attached when the enter hook runs.
            assert_eq!(world.get(actor).unwrap().location(), Some(location));
            self.0.lock().unwrap().push(format!("enter {location}"));
        }

        fn on_exit(&self, world: &mut World, location: EntityId, actor: EntityId) {
            assert_eq!(world.get(actor).unwrap().location(), None);
            self.0.lock().unwrap().push(format!("exit {location}"));
        }
    }

    fn assert_consistent(world: &World) {
        let problems = world.audit();
        assert!(problems.is_empty(), "invariants violated: {problems:#?}");
    }

    #[test]
    fn scenario_a_two_by_two_map() {
        let mut w = World::new();
        let map = w.create_map(2, 2, 1).unwrap();
        let a = w.locate(map, 0, 0, 0).unwrap();
        let b = w.locate(map, 1, 1, 0).unwrap();
        assert_ne!(a, b);
        assert!(w.locate(map, 2, 0, 0).is_none());
        assert_eq!(w.get(b).unwrap().coordinates(), Some(IVec3::new(1, 1, 0)));
        assert_eq!(w.map(map).unwrap().tile_count(), 4);
        assert_consistent(&w);
    }

    #[test]
    fn scenario_b_move_then_denied_move() {
        let mut w = World::new();
        let map = w.create_map(3, 1, 1).unwrap();
        let t = w.locate(map, 0, 0, 0).unwrap();
        let t2 = w.locate(map, 1, 0, 0).unwrap();
        let m = w.spawn(Archetype::Mob(Some(CharacterId(1))));

        assert!(w.move_entity(m, t).unwrap());
        assert_eq!(w.get(m).unwrap().location(), Some(t));
        assert!(w.get(t).unwrap().contains(m));

        w.set_policy(t2, Arc::new(Closed)).unwrap();
        w.drain_events();
        assert!(!w.move_entity(m, t2).unwrap());
        assert_eq!(w.get(m).unwrap().location(), Some(t));
        assert!(w.get(t).unwrap().contains(m));
        assert!(!w.get(t2).unwrap().contains(m));
        assert!(w.events().is_empty(), "denied move must not mutate");
        assert_consistent(&w);
    }

    #[test]
    fn exit_policy_blocks_leaving() {
        let mut w = World::new();
        let map = w.create_map(2, 1, 1).unwrap();
        let t = w.locate(map, 0, 0, 0).unwrap();
        let m = w.spawn(Archetype::Movable);
        w.set_location(m, Some(t)).unwrap();
        w.set_policy(t, Arc::new(Sticky)).unwrap();
        assert!(!w.step(m, Direction::EAST).unwrap());
        assert_eq!(w.get(m).unwrap().location(), Some(t));
    }

    #[test]
    fn move_runs_hooks_in_order() {
        let mut w = World::new();
        let map = w.create_map(2, 1, 1).unwrap();
        let a = w.locate(map, 0, 0, 0).unwrap();
        let b = w.locate(map, 1, 0, 0).unwrap();
        let recorder = Arc::new(Recorder::default());
        w.set_policy(a, recorder.clone()).unwrap();
        w.set_policy(b, recorder.clone()).unwrap();

        let m = w.spawn(Archetype::Movable);
        assert!(w.move_entity(m, a).unwrap());
        w.drain_events();
        assert!(w.move_entity(m, b).unwrap());

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![format!("enter {a}"), format!("exit {a}"), format!("enter {b}")]
        );
        assert_eq!(
            w.events(),
            &[
                WorldEvent::Relocated { id: m, from: Some(a), to: None },
                WorldEvent::Exited { location: a, actor: m },
                WorldEvent::Relocated { id: m, from: None, to: Some(b) },
                WorldEvent::Entered { location: b, actor: m },
            ]
        );
    }

    #[test]
    fn set_location_same_parent_is_noop() {
        let mut w = World::new();
        let map = w.create_map(1, 1, 1).unwrap();
        let t = w.locate(map, 0, 0, 0).unwrap();
        let m = w.spawn(Archetype::Movable);
        w.set_location(m, Some(t)).unwrap();
        w.drain_events();

        w.set_location(m, Some(t)).unwrap();
        assert!(w.events().is_empty());
        assert_eq!(w.get(t).unwrap().contents().iter().filter(|c| **c == m).count(), 1);
        assert_consistent(&w);
    }

    #[test]
    fn set_location_syncs_map_for_subtree() {
        let mut w = World::new();
        let map = w.create_map(1, 1, 1).unwrap();
        let t = w.locate(map, 0, 0, 0).unwrap();
        let bag = w.spawn(Archetype::Movable);
        let coin = w.spawn(Archetype::Mappable);
        w.set_location(coin, Some(bag)).unwrap();
        assert_eq!(w.get(coin).unwrap().map(), None);

        w.set_location(bag, Some(t)).unwrap();
        assert_eq!(w.get(bag).unwrap().map(), Some(map));
        assert_eq!(w.get(coin).unwrap().map(), Some(map));
        assert!(w.map(map).unwrap().contains(coin));
        assert_consistent(&w);

        w.set_location(bag, None).unwrap();
        assert_eq!(w.get(bag).unwrap().map(), Some(map), "detaching keeps the map");
        assert!(!w.get(t).unwrap().contains(bag));
        assert_consistent(&w);
    }

    #[test]
    fn set_map_clears_incompatible_location() {
        let mut w = World::new();
        let first = w.create_map(1, 1, 1).unwrap();
        let second = w.create_map(1, 1, 1).unwrap();
        let t = w.locate(first, 0, 0, 0).unwrap();
        let m = w.spawn(Archetype::Movable);
        w.set_location(m, Some(t)).unwrap();

        w.set_map(m, Some(second)).unwrap();
        assert_eq!(w.get(m).unwrap().location(), None);
        assert_eq!(w.get(m).unwrap().map(), Some(second));
        assert!(!w.get(t).unwrap().contains(m));
        assert!(!w.map(first).unwrap().contains(m));
        assert!(w.map(second).unwrap().contains(m));
        assert_consistent(&w);

        w.set_map(m, None).unwrap();
        assert!(!w.map(second).unwrap().contains(m));
        assert_consistent(&w);
    }

    #[test]
    fn set_map_keeps_compatible_location() {
        let mut w = World::new();
        let bag = w.spawn(Archetype::Movable);
        let coin = w.spawn(Archetype::Mappable);
        w.set_location(coin, Some(bag)).unwrap();
        w.set_map(coin, None).unwrap();
        assert_eq!(w.get(coin).unwrap().location(), Some(bag));
    }

    #[test]
    fn tiles_are_fixed() {
        let mut w = World::new();
        let map = w.create_map(2, 1, 1).unwrap();
        let a = w.locate(map, 0, 0, 0).unwrap();
        let b = w.locate(map, 1, 0, 0).unwrap();
        assert_eq!(w.set_location(a, Some(b)), Err(WorldError::TileFixed(a)));
        assert_eq!(w.set_map(a, None), Err(WorldError::TileFixed(a)));
        assert_eq!(w.despawn(a), Err(WorldError::TileFixed(a)));
    }

    #[test]
    fn containment_cycles_are_rejected() {
        let mut w = World::new();
        let outer = w.spawn(Archetype::Movable);
        let inner = w.spawn(Archetype::Movable);
        w.set_location(inner, Some(outer)).unwrap();
        assert!(matches!(
            w.set_location(outer, Some(inner)),
            Err(WorldError::ContainmentCycle { .. })
        ));
        assert!(matches!(
            w.move_entity(outer, outer),
            Err(WorldError::ContainmentCycle { .. })
        ));
        assert_consistent(&w);
    }

    #[test]
    fn only_movables_move() {
        let mut w = World::new();
        let map = w.create_map(1, 1, 1).unwrap();
        let t = w.locate(map, 0, 0, 0).unwrap();
        let thing = w.spawn(Archetype::Mappable);
        assert_eq!(w.move_entity(thing, t), Err(WorldError::NotMovable(thing)));
        // Plain placement is still allowed.
        w.set_location(thing, Some(t)).unwrap();
        assert_consistent(&w);
    }

    #[test]
    fn step_follows_direction_deltas() {
        let mut w = World::new();
        let map = w.create_map(3, 3, 1).unwrap();
        let m = w.spawn(Archetype::Mob(None));
        assert!(!w.step(m, Direction::NORTH).unwrap(), "not on a tile");

        w.set_location(m, w.locate(map, 1, 1, 0)).unwrap();
        assert!(w.step(m, Direction::NORTHEAST).unwrap());
        assert_eq!(w.get(m).unwrap().location(), w.locate(map, 2, 0, 0));
        assert!(!w.step(m, Direction::NORTH).unwrap(), "off the map");
        assert!(!w.step(m, Direction::EAST).unwrap(), "off the map");
        assert!(w.step(m, Direction::SOUTHWEST).unwrap());
        assert_eq!(w.get(m).unwrap().location(), w.locate(map, 1, 1, 0));
        assert_consistent(&w);
    }

    #[test]
    fn step_from_inside_container_fails() {
        let mut w = World::new();
        let map = w.create_map(2, 2, 1).unwrap();
        let bag = w.spawn(Archetype::Movable);
        w.set_location(bag, w.locate(map, 0, 0, 0)).unwrap();
        let m = w.spawn(Archetype::Movable);
        w.set_location(m, Some(bag)).unwrap();
        assert!(!w.step(m, Direction::SOUTH).unwrap());
        assert_eq!(w.get(m).unwrap().location(), Some(bag));
    }

    #[test]
    fn move_to_coordinates() {
        let mut w = World::new();
        let map = w.create_map(4, 4, 2).unwrap();
        let m = w.spawn(Archetype::Movable);
        assert!(!w.move_to(m, IVec3::ZERO).unwrap(), "no map assigned");
        w.set_map(m, Some(map)).unwrap();
        assert!(w.move_to(m, IVec3::new(3, 2, 1)).unwrap());
        assert_eq!(w.get(m).unwrap().location(), w.locate(map, 3, 2, 1));
        assert!(!w.move_to(m, IVec3::new(4, 0, 0)).unwrap());
    }

    #[test]
    fn controller_link_is_one_to_one() {
        let mut w = World::new();
        let a = w.spawn(Archetype::Mob(Some(CharacterId(1))));
        let b = w.spawn(Archetype::Mob(Some(CharacterId(2))));
        let p = PlayerId(9);

        w.set_controller(a, Some(p)).unwrap();
        assert_eq!(w.controlled_by(p), Some(a));
        assert_eq!(w.controller_of(a), Some(p));

        w.set_controller(b, Some(p)).unwrap();
        assert_eq!(w.controlled_by(p), Some(b));
        assert_eq!(w.controller_of(a), None);
        assert_consistent(&w);

        w.set_controller(b, None).unwrap();
        assert_eq!(w.controlled_by(p), None);
        assert_consistent(&w);

        let thing = w.spawn(Archetype::Mappable);
        assert_eq!(w.set_controller(thing, Some(p)), Err(WorldError::NotAMob(thing)));
    }

    #[test]
    fn despawn_unlinks_everything() {
        let mut w = World::new();
        let map = w.create_map(1, 1, 1).unwrap();
        let t = w.locate(map, 0, 0, 0).unwrap();
        let mob = w.spawn(Archetype::Mob(Some(CharacterId(3))));
        let item = w.spawn(Archetype::Mappable);
        w.set_location(mob, Some(t)).unwrap();
        w.set_location(item, Some(mob)).unwrap();
        w.set_controller(mob, Some(PlayerId(1))).unwrap();
        assert_eq!(w.despawn(mob), Err(WorldError::Controlled(mob)));
        w.set_controller(mob, None).unwrap();

        assert_eq!(w.despawn(mob).unwrap(), 2);
        assert!(w.get(mob).is_none());
        assert!(w.get(item).is_none());
        assert!(w.get(t).unwrap().contents().is_empty());
        assert!(!w.map(map).unwrap().contains(mob));
        assert_eq!(w.controlled_by(PlayerId(1)), None);
        assert_consistent(&w);
    }

    #[test]
    fn despawn_refuses_subtrees_holding_a_controlled_mob() {
        let mut w = World::new();
        let map = w.create_map(1, 1, 1).unwrap();
        let t = w.locate(map, 0, 0, 0).unwrap();
        let chest = w.spawn(Archetype::Movable);
        let mob = w.spawn(Archetype::Mob(Some(CharacterId(4))));
        w.set_location(chest, Some(t)).unwrap();
        w.set_location(mob, Some(chest)).unwrap();
        w.set_controller(mob, Some(PlayerId(2))).unwrap();

        assert_eq!(w.controlled_within(chest), vec![mob]);
        assert_eq!(w.despawn(chest), Err(WorldError::Controlled(mob)));
        assert_eq!(w.controlled_by(PlayerId(2)), Some(mob));
        assert_eq!(w.get(mob).unwrap().location(), Some(chest));
        assert_consistent(&w);

        w.set_location(mob, Some(t)).unwrap();
        assert_eq!(w.despawn(chest).unwrap(), 1);
        assert!(w.controlled_within(t).contains(&mob));
        assert_consistent(&w);
    }

    #[test]
    fn oversized_maps_are_refused() {
        let mut w = World::new();
        assert_eq!(
            w.create_map(u32::MAX, u32::MAX, 2),
            Err(WorldError::MapTooLarge(UVec3::new(u32::MAX, u32::MAX, 2)))
        );
        assert_eq!(w.maps().count(), 0);
        assert_eq!(w.entity_count(), 0);
    }

    #[test]
    fn invariants_hold_through_random_relinking() {
        let mut w = World::new();
        let maps = [w.create_map(3, 3, 1).unwrap(), w.create_map(2, 2, 2).unwrap()];
        let mut things = Vec::new();
        for i in 0..12 {
            things.push(w.spawn(if i % 3 == 0 { Archetype::Mappable } else { Archetype::Movable }));
        }
        // Deterministic pseudo-random walk over relink operations.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = |n: usize| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % n as u64) as usize
        };
        for _ in 0..500 {
            let id = things[next(things.len())];
            match next(4) {
                0 => {
                    let map = maps[next(2)];
                    let tiles: Vec<_> = w.map(map).unwrap().tiles().collect();
                    let _ = w.set_location(id, Some(tiles[next(tiles.len())]));
                }
                1 => {
                    let _ = w.set_location(id, Some(things[next(things.len())]));
                }
                2 => {
                    let _ = w.set_location(id, None);
                }
                _ => {
                    let map = if next(3) == 0 { None } else { Some(maps[next(2)]) };
                    w.set_map(id, map).unwrap();
                }
            }
            assert_consistent(&w);
        }
    }
}
