use crate::store::StoreError;
use tilemud_common::{EntityId, MapId};
use tilemud_kernel::{Archetype, Savable, SavableKind, World};

/// Rebuild an entity tree from a savable.
///
/// The root is placed on the tile named by its recorded coordinates when a
/// map is given; otherwise it is only assigned to `map`. Contents are
/// restored recursively and placed inside their parent.
pub fn restore(world: &mut World, savable: &Savable, map: Option<MapId>) -> Result<EntityId, StoreError> {
    let root = build(world, savable)?;

    match (map, savable.location) {
        (Some(map), Some(at)) => {
            let tile = world
                .locate(map, at.x, at.y, at.z)
                .ok_or(StoreError::MissingTile {
                    x: at.x,
                    y: at.y,
                    z: at.z,
                })?;
            world.set_location(root, Some(tile))?;
        }
        (Some(map), None) => world.set_map(root, Some(map))?,
        (None, _) => {}
    }
    Ok(root)
}

fn build(world: &mut World, savable: &Savable) -> Result<EntityId, StoreError> {
    let archetype = match savable.kind {
        SavableKind::Mappable => Archetype::Mappable,
        SavableKind::Movable => Archetype::Movable,
        SavableKind::Mob => Archetype::Mob(savable.id),
        SavableKind::Tile => return Err(StoreError::TileNotRestorable),
    };
    let id = world.spawn(archetype);
    world.set_keywords(id, savable.keywords.as_str())?;
    world.set_display(id, savable.display.as_str())?;
    world.set_description(id, savable.description.clone())?;

    for child in &savable.contents {
        let child_id = build(world, child)?;
        world.set_location(child_id, Some(id))?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilemud_common::CharacterId;

    fn sample(world: &mut World) -> (MapId, EntityId) {
        let map = world.create_map(4, 4, 1).unwrap();
        let mob = world.spawn(Archetype::Mob(Some(CharacterId(12))));
        world.set_display(mob, "Brannoc").unwrap();
        world.set_description(mob, None).unwrap();
        let sack = world.spawn(Archetype::Movable);
        world.set_display(sack, "a burlap sack").unwrap();
        let apple = world.spawn(Archetype::Mappable);
        world.set_keywords(apple, "apple red").unwrap();
        world.set_description(apple, Some("Crisp.".into())).unwrap();
        world.set_location(mob, world.locate(map, 3, 1, 0)).unwrap();
        world.set_location(sack, Some(mob)).unwrap();
        world.set_location(apple, Some(sack)).unwrap();
        (map, mob)
    }

    #[test]
    fn savable_reconstructs_containment_and_text() {
        let mut world = World::new();
        let (map, mob) = sample(&mut world);
        let saved = world.to_savable(mob).unwrap();

        let mut fresh = World::new();
        let fresh_map = fresh.create_map(4, 4, 1).unwrap();
        assert_eq!(fresh_map, map);
        let restored = restore(&mut fresh, &saved, Some(fresh_map)).unwrap();

        assert_eq!(fresh.to_savable(restored).unwrap(), saved);
        let tile = fresh.get(restored).unwrap().location().unwrap();
        assert_eq!(Some(tile), fresh.locate(fresh_map, 3, 1, 0));
        assert!(fresh.audit().is_empty());
    }

    #[test]
    fn restore_without_map_leaves_root_unplaced() {
        let mut world = World::new();
        let (_, mob) = sample(&mut world);
        let saved = world.to_savable(mob).unwrap();

        let mut fresh = World::new();
        let restored = restore(&mut fresh, &saved, None).unwrap();
        let root = fresh.get(restored).unwrap();
        assert_eq!(root.location(), None);
        assert_eq!(root.map(), None);
        assert_eq!(root.contents().len(), 1);
    }

    #[test]
    fn restore_rejects_tiles_and_missing_coordinates() {
        let mut world = World::new();
        let map = world.create_map(1, 1, 1).unwrap();
        let tile = world.locate(map, 0, 0, 0).unwrap();
        let saved_tile = world.to_savable(tile).unwrap();
        assert!(matches!(
            restore(&mut world, &saved_tile, Some(map)),
            Err(StoreError::TileNotRestorable)
        ));

        let (_, mob) = {
            let mut other = World::new();
            let pair = sample(&mut other);
            (pair.0, other.to_savable(pair.1).unwrap())
        };
        assert!(matches!(
            restore(&mut world, &mob, Some(map)),
            Err(StoreError::MissingTile { x: 3, y: 1, z: 0 })
        ));
    }
}
