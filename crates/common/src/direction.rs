use glam::IVec3;
use serde::{Deserialize, Serialize};

/// A compass direction encoded as a bitmask.
///
/// North/south occupy one bit pair and east/west the other. A compound
/// direction is the union of one bit from each pair. Masks that set both bits
/// of a pair, set no bits, or set bits outside the two pairs are rejected at
/// construction, so every `Direction` value resolves to a non-zero delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Direction(u8);

const NORTH_BIT: u8 = 1;
const SOUTH_BIT: u8 = 2;
const EAST_BIT: u8 = 4;
const WEST_BIT: u8 = 8;

impl Direction {
    pub const NORTH: Self = Self(NORTH_BIT);
    pub const SOUTH: Self = Self(SOUTH_BIT);
    pub const EAST: Self = Self(EAST_BIT);
    pub const WEST: Self = Self(WEST_BIT);
    pub const NORTHEAST: Self = Self(NORTH_BIT | EAST_BIT);
    pub const NORTHWEST: Self = Self(NORTH_BIT | WEST_BIT);
    pub const SOUTHEAST: Self = Self(SOUTH_BIT | EAST_BIT);
    pub const SOUTHWEST: Self = Self(SOUTH_BIT | WEST_BIT);

    pub const ALL: [Self; 8] = [
        Self::NORTH,
        Self::SOUTH,
        Self::EAST,
        Self::WEST,
        Self::NORTHEAST,
        Self::NORTHWEST,
        Self::SOUTHEAST,
        Self::SOUTHWEST,
    ];

    /// Validate a raw bitmask.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits == 0 || bits & !(NORTH_BIT | SOUTH_BIT | EAST_BIT | WEST_BIT) != 0 {
            return None;
        }
        if bits & (NORTH_BIT | SOUTH_BIT) == (NORTH_BIT | SOUTH_BIT) {
            return None;
        }
        if bits & (EAST_BIT | WEST_BIT) == (EAST_BIT | WEST_BIT) {
            return None;
        }
        Some(Self(bits))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Union of two directions, rejected when it would set both bits of a pair.
    pub const fn combine(self, other: Self) -> Option<Self> {
        Self::from_bits(self.0 | other.0)
    }

    /// Coordinate delta of one step. North decreases y, east increases x.
    pub fn delta(self) -> IVec3 {
        let mut d = IVec3::ZERO;
        if self.0 & NORTH_BIT != 0 {
            d.y -= 1;
        } else if self.0 & SOUTH_BIT != 0 {
            d.y += 1;
        }
        if self.0 & EAST_BIT != 0 {
            d.x += 1;
        } else if self.0 & WEST_BIT != 0 {
            d.x -= 1;
        }
        d
    }

    pub fn long_name(self) -> &'static str {
        match self.0 {
            NORTH_BIT => "north",
            SOUTH_BIT => "south",
            EAST_BIT => "east",
            WEST_BIT => "west",
            b if b == NORTH_BIT | EAST_BIT => "northeast",
            b if b == NORTH_BIT | WEST_BIT => "northwest",
            b if b == SOUTH_BIT | EAST_BIT => "southeast",
            _ => "southwest",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self.0 {
            NORTH_BIT => "n",
            SOUTH_BIT => "s",
            EAST_BIT => "e",
            WEST_BIT => "w",
            b if b == NORTH_BIT | EAST_BIT => "ne",
            b if b == NORTH_BIT | WEST_BIT => "nw",
            b if b == SOUTH_BIT | EAST_BIT => "se",
            _ => "sw",
        }
    }

    /// Look up a direction by its long or short name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|d| {
            d.long_name().eq_ignore_ascii_case(name) || d.short_name().eq_ignore_ascii_case(name)
        })
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits).ok_or_else(|| format!("invalid direction mask {bits:#06b}"))
    }
}

impl From<Direction> for u8 {
    fn from(d: Direction) -> Self {
        d.0
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.long_name())
    }
}
