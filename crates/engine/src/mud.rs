use crate::config::EngineConfig;
use tilemud_command::{CommandContext, CommandError, CommandRegistry, UserCommand, show_room};
use tilemud_common::{EntityId, MapId, MessageMode, PlayerId};
use tilemud_kernel::{Archetype, World, WorldError};
use tilemud_persist::{Database, StoreError};
use tilemud_script::ScriptSandbox;
use tilemud_session::{CharacterSheet, Onboarding, Players, Transport};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("command error: {0}")]
    Command(#[from] CommandError),
    #[error("world error: {0}")]
    World(#[from] WorldError),
    #[error("spawn point {0} is outside the map")]
    SpawnOutOfRange(glam::IVec3),
}

/// The running world.
pub struct Mud {
    db: Database,
    world: World,
    map: MapId,
    spawn: EntityId,
    players: Players<Onboarding>,
    registry: CommandRegistry,
    sandbox: ScriptSandbox,
    logouts: Vec<PlayerId>,
}

impl std::fmt::Debug for Mud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mud")
            .field("name", &self.db.meta().name)
            .field("map", &self.map)
            .field("players", &self.players.len())
            .field("commands", &self.registry.len())
            .finish()
    }
}

impl Mud {
    /// Build the world map and command set.
    ///
    /// User commands that fail to compile are logged and left out.
    pub fn boot(db: Database, config: EngineConfig) -> Result<Self, EngineError> {
        let mut world = World::new();
        let d = config.dimensions;
        let map = world.create_map(d.x, d.y, d.z)?;
        let spawn = world
            .map(map)
            .and_then(|m| m.locate_coord(config.spawn))
            .ok_or(EngineError::SpawnOutOfRange(config.spawn))?;
        tracing::info!(target: "tilemud::boot", width = d.x, height = d.y, layers = d.z, "map created");

        let sandbox = ScriptSandbox::new(config.limits);
        let mut registry = CommandRegistry::with_builtins()?;
        for def in db.user_commands() {
            match UserCommand::compile(def, &sandbox) {
                Ok(command) => registry.register_user(command),
                Err(e) => tracing::error!("failed to load user command '{}' ({e})", def.name),
            }
        }
        world.drain_events();

        tracing::info!(
            target: "tilemud::boot",
            name = %db.meta().name,
            version = %db.meta().version,
            commands = registry.len(),
            "world ready"
        );
        Ok(Self {
            db,
            world,
            map,
            spawn,
            players: Players::new(),
            registry,
            sandbox,
            logouts: Vec::new(),
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn map(&self) -> MapId {
        self.map
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn players(&self) -> &Players<Onboarding> {
        &self.players
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn is_connected(&self, id: PlayerId) -> bool {
        self.players.get(id).is_some()
    }

    /// Accept a connection: greet it and start onboarding.
    pub fn connect(&mut self, transport: Box<dyn Transport>) -> PlayerId {
        let id = self.players.connect(transport);
        let meta = self.db.meta();
        if let Some(player) = self.players.get_mut(id) {
            tracing::info!("connecting player: {player}");
            player.send_line(&meta.greeting, MessageMode::Misc);
            Onboarding::Name.ask(player, meta);
        }
        id
    }

    /// Process one complete input line from `id`.
    pub fn input(&mut self, id: PlayerId, line: &str) {
        let Some(player) = self.players.get_mut(id) else {
            tracing::warn!(player = %id, "input from unknown player");
            return;
        };
        let pending = player.begin_input();
        if pending.as_ref().is_some_and(Onboarding::is_secret) {
            tracing::info!(player = %id, "<hidden>");
        } else {
            tracing::info!(player = %id, "'{line}'");
        }

        match pending {
            Some(state) => {
                if let Some(sheet) = state.advance(player, line, self.db.meta()) {
                    if let Err(e) = self.enter_world(id, sheet) {
                        tracing::error!(player = %id, "failed to enter the world: {e}");
                    }
                }
            }
            None => self.dispatch(id, line),
        }

        for player in std::mem::take(&mut self.logouts) {
            self.disconnect(player);
        }
        for event in self.world.drain_events() {
            tracing::trace!(?event, "world");
        }
    }

    fn dispatch(&mut self, id: PlayerId, line: &str) {
        let ran = match self.world.controlled_by(id) {
            Some(actor) => {
                let mut ctx = CommandContext {
                    world: &mut self.world,
                    players: &mut self.players,
                    meta: self.db.meta(),
                    map: self.map,
                    sandbox: &self.sandbox,
                    logouts: &mut self.logouts,
                };
                self.registry.process(&mut ctx, actor, line).is_some()
            }
            None => false,
        };
        if !ran {
            self.players.send_line(id, "Do what now?", MessageMode::Command);
        }
    }

    fn enter_world(&mut self, id: PlayerId, sheet: CharacterSheet) -> Result<(), EngineError> {
        let character = self.db.next_character_id();
        let mob = self.world.spawn(Archetype::Mob(Some(character)));
        self.world.set_keywords(mob, sheet.name.as_str())?;
        self.world.set_display(mob, sheet.name.as_str())?;
        self.world.set_description(mob, None)?;
        self.world.set_location(mob, Some(self.spawn))?;
        self.world.set_controller(mob, Some(id))?;
        tracing::info!(
            player = %id,
            character = character.0,
            name = %sheet.name,
            race = %sheet.race,
            class = %sheet.class,
            "entered the world"
        );

        let mut ctx = CommandContext {
            world: &mut self.world,
            players: &mut self.players,
            meta: self.db.meta(),
            map: self.map,
            sandbox: &self.sandbox,
            logouts: &mut self.logouts,
        };
        show_room(&mut ctx, mob);
        Ok(())
    }

    /// Drop a connection, releasing and removing its mob.
    pub fn disconnect(&mut self, id: PlayerId) {
        let Some(mut player) = self.players.remove(id) else {
            return;
        };
        tracing::info!("disconnecting player: {player}");
        player.close();

        if let Some(mob) = self.world.controlled_by(id) {
            if let Err(e) = self.release(mob) {
                tracing::error!(player = %id, "failed to release {mob}: {e}");
            }
        }
        self.world.drain_events();
    }

    /// Unlink `mob` from its player and remove it. Mobs other players
    /// control are first moved out to where `mob` stood.
    fn release(&mut self, mob: EntityId) -> Result<(), WorldError> {
        self.world.set_controller(mob, None)?;
        let refuge = self
            .world
            .get(mob)
            .and_then(|e| e.location())
            .unwrap_or(self.spawn);
        for other in self.world.controlled_within(mob) {
            self.world.set_location(other, Some(refuge))?;
        }
        self.world.despawn(mob)?;
        Ok(())
    }

    /// Save metadata and counters, then close every connection.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        let ids: Vec<_> = self.players.ids().collect();
        for id in ids {
            self.disconnect(id);
        }
        self.db.save()?;
        tracing::info!(target: "tilemud::boot", "world saved");
        Ok(())
    }
}
