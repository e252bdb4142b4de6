use glam::{IVec3, UVec3};
use std::collections::BTreeSet;
use tilemud_common::{EntityId, MapId};

/// Largest tile grid a single map may hold.
pub const MAX_TILES: usize = 1 << 24;

/// Number of tiles in a grid of `dimensions`, or `None` when it exceeds
/// [`MAX_TILES`].
pub fn tile_count_for(dimensions: UVec3) -> Option<usize> {
    (dimensions.x as usize)
        .checked_mul(dimensions.y as usize)?
        .checked_mul(dimensions.z as usize)
        .filter(|count| *count <= MAX_TILES)
}

/// Fixed-size 3-D grid of tiles.
///
/// The tile grid is dense and created once; its dimensions never change.
/// `contents` holds every entity whose map assignment is this map, tiles
/// included.
#[derive(Debug, Clone)]
pub struct Map {
    id: MapId,
    dimensions: UVec3,
    tiles: Vec<EntityId>,
    contents: BTreeSet<EntityId>,
}

impl Map {
    pub(crate) fn new(id: MapId, dimensions: UVec3, tiles: Vec<EntityId>) -> Self {
        debug_assert_eq!(Some(tiles.len()), tile_count_for(dimensions));
        let contents = tiles.iter().copied().collect();
        Self {
            id,
            dimensions,
            tiles,
            contents,
        }
    }

    pub fn id(&self) -> MapId {
        self.id
    }

    /// (width, height, layers).
    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// The tile at (x, y, z), or `None` when any coordinate is out of range.
    pub fn locate(&self, x: i32, y: i32, z: i32) -> Option<EntityId> {
        self.locate_coord(IVec3::new(x, y, z))
    }

    pub fn locate_coord(&self, coord: IVec3) -> Option<EntityId> {
        self.index_of(coord).map(|i| self.tiles[i])
    }

    fn index_of(&self, coord: IVec3) -> Option<usize> {
        if coord.cmplt(IVec3::ZERO).any() {
            return None;
        }
        let c = coord.as_uvec3();
        if c.cmpge(self.dimensions).any() {
            return None;
        }
        let (x, y, z) = (c.x as usize, c.y as usize, c.z as usize);
        let (w, h) = (self.dimensions.x as usize, self.dimensions.y as usize);
        Some((z * h + y) * w + x)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.contents.contains(&id)
    }

    pub fn contents(&self) -> &BTreeSet<EntityId> {
        &self.contents
    }

    pub(crate) fn add_to_contents(&mut self, id: EntityId) -> bool {
        self.contents.insert(id)
    }

    pub(crate) fn remove_from_contents(&mut self, id: EntityId) -> bool {
        self.contents.remove(&id)
    }

    /// Iterate tile ids in storage order (x fastest, then y, then z).
    pub fn tiles(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.tiles.iter().copied()
    }
}
