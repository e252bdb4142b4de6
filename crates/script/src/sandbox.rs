use crate::api::{self, SandboxState, ScriptEntity, Shared};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Array, Dynamic, Engine, Scope};
use std::cell::RefCell;
use std::rc::Rc;
use tilemud_common::{Direction, EntityId, MapId, PlayerId, WorldMeta};
use tilemud_kernel::World;

/// Resource bounds applied to every script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Step budget; a run exceeding it is aborted.
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 50_000,
            max_call_levels: 16,
            max_string_size: 4096,
            max_array_size: 1024,
            max_map_size: 256,
        }
    }
}

/// Output a script asked for, delivered by the host after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptMessage {
    /// A line for every connected player.
    Broadcast(String),
    /// A line for the player controlling a mob.
    Tell { player: PlayerId, text: String },
    /// A controlled mob moved and should see its new surroundings.
    ShowRoom(EntityId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("compile error: {0}")]
    Compile(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result of one invocation. Messages queued before a fault are kept.
#[derive(Debug, Default)]
pub struct ScriptOutcome {
    pub messages: Vec<ScriptMessage>,
    pub fault: Option<ScriptError>,
}

/// Per-invocation bindings.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Pattern source of the command, used to label logs.
    pub label: &'a str,
    pub actor: EntityId,
    pub args: &'a [String],
    pub meta: &'a WorldMeta,
    /// Map that `locate` and `attach_map` refer to.
    pub map: Option<MapId>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptSandbox {
    limits: SandboxLimits,
}

impl ScriptSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    fn engine(&self, label: &str) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);
        engine.set_max_map_size(self.limits.max_map_size);
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        let print_label = label.to_string();
        engine.on_print(move |text| {
            tracing::info!(target: "tilemud::script", command = %print_label, "{text}");
        });
        let debug_label = label.to_string();
        engine.on_debug(move |text, _source, pos| {
            tracing::debug!(target: "tilemud::script", command = %debug_label, %pos, "{text}");
        });
        engine
    }

    /// Parse `body` without running it.
    pub fn check(&self, body: &str) -> Result<(), ScriptError> {
        self.engine("check")
            .compile(body)
            .map(|_| ())
            .map_err(|e| ScriptError::Compile(e.to_string()))
    }

    /// Run `body` against `world`.
    ///
    /// Never fails: a fault is logged with the invocation label and returned
    /// in the outcome. The world is left as the script left it.
    pub fn run(&self, world: &mut World, invocation: Invocation<'_>, body: &str) -> ScriptOutcome {
        let state: Shared = Rc::new(RefCell::new(SandboxState {
            world: std::mem::take(world),
            map: invocation.map,
            messages: Vec::new(),
        }));

        let result = self.execute(&state, &invocation, body);

        let mut state = state.borrow_mut();
        *world = std::mem::take(&mut state.world);
        let messages = std::mem::take(&mut state.messages);

        if let Err(err) = &result {
            tracing::error!("failed to run user command '{}' ({err})", invocation.label);
        }
        ScriptOutcome {
            messages,
            fault: result.err(),
        }
    }

    fn execute(&self, state: &Shared, invocation: &Invocation<'_>, body: &str) -> Result<(), ScriptError> {
        let mut engine = self.engine(invocation.label);
        api::register(&mut engine, state);
        let ast = engine
            .compile(body)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        let mut scope = Scope::new();
        scope.push("user", ScriptEntity::new(invocation.actor, state.clone()));
        scope.push(
            "args",
            invocation
                .args
                .iter()
                .map(|a| Dynamic::from(a.clone()))
                .collect::<Array>(),
        );
        scope.push("meta", meta_map(invocation.meta));
        for dir in Direction::ALL {
            scope.push_constant(dir.long_name().to_ascii_uppercase(), dir.bits() as i64);
        }

        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| ScriptError::Runtime(e.to_string()))
    }
}

/// Scripts get a detached copy: edits never reach the real metadata.
fn meta_map(meta: &WorldMeta) -> rhai::Map {
    let mut map = rhai::Map::new();
    map.insert("name".into(), Dynamic::from(meta.name.clone()));
    map.insert("version".into(), Dynamic::from(meta.version.clone()));
    map.insert("defaultPort".into(), Dynamic::from(meta.default_port as i64));
    map.insert("greeting".into(), Dynamic::from(meta.greeting.clone()));
    map.insert("motd".into(), Dynamic::from(meta.motd.clone()));
    map
}
