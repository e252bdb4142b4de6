use glam::{IVec3, UVec3};
use tilemud_script::SandboxLimits;

/// Startup parameters of a [`crate::Mud`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Width, height and layer count of the world map.
    pub dimensions: UVec3,
    /// Tile new characters are placed on.
    pub spawn: IVec3,
    pub limits: SandboxLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimensions: UVec3::new(255, 255, 1),
            spawn: IVec3::ZERO,
            limits: SandboxLimits::default(),
        }
    }
}
