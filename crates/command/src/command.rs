use crate::builtin;
use crate::user::UserCommand;
use regex::{Regex, RegexBuilder};
use tilemud_common::{EntityId, MapId, MessageMode, PlayerId, WorldMeta};
use tilemud_kernel::World;
use tilemud_script::{ScriptError, ScriptSandbox};
use tilemud_session::{Onboarding, Players};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("script for '{pattern}' does not compile: {source}")]
    Script {
        pattern: String,
        #[source]
        source: ScriptError,
    },
}

/// Compile `source` as a case-insensitive pattern.
pub fn pattern(source: &str) -> Result<Regex, CommandError> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|source_err| CommandError::InvalidPattern {
            pattern: source.to_string(),
            source: source_err,
        })
}

/// Everything a command may touch while it runs.
pub struct CommandContext<'a> {
    pub world: &'a mut World,
    pub players: &'a mut Players<Onboarding>,
    pub meta: &'a WorldMeta,
    pub map: MapId,
    pub sandbox: &'a ScriptSandbox,
    /// Players to disconnect once the current line is finished.
    pub logouts: &'a mut Vec<PlayerId>,
}

impl CommandContext<'_> {
    /// Send a line to whoever controls `actor`. Uncontrolled actors hear nothing.
    pub fn tell(&mut self, actor: EntityId, text: &str, mode: MessageMode) {
        if let Some(player) = self.world.controller_of(actor) {
            self.players.send_line(player, text, mode);
        }
    }
}

/// A pattern plus a handler.
pub trait Command {
    fn name(&self) -> &str;

    fn pattern(&self) -> &Regex;

    /// Whether this command may be registered as a built-in.
    fn eligible(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, actor: EntityId, args: &[String]);
}

/// Ordered command set.
#[derive(Default)]
pub struct CommandRegistry {
    builtins: Vec<Box<dyn Command>>,
    user: Vec<UserCommand>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.commands().map(|c| c.name())).finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard built-in commands.
    pub fn with_builtins() -> Result<Self, CommandError> {
        let mut registry = Self::new();
        for command in builtin::standard()? {
            registry.register(command);
        }
        Ok(registry)
    }

    /// Append a built-in. Ineligible commands are skipped; returns whether
    /// the command was added.
    pub fn register(&mut self, command: Box<dyn Command>) -> bool {
        if !command.eligible() {
            tracing::debug!(command = command.name(), "skipping ineligible command");
            return false;
        }
        tracing::info!(target: "tilemud::boot", command = command.name(), "loaded command");
        self.builtins.push(command);
        true
    }

    /// Append a user command after every built-in.
    pub fn register_user(&mut self, command: UserCommand) {
        tracing::info!(target: "tilemud::boot", command = command.name(), "loaded user command");
        self.user.push(command);
    }

    /// All commands in match order.
    pub fn commands(&self) -> impl Iterator<Item = &dyn Command> {
        self.builtins
            .iter()
            .map(|c| c.as_ref() as &dyn Command)
            .chain(self.user.iter().map(|c| c as &dyn Command))
    }

    pub fn len(&self) -> usize {
        self.builtins.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the first command matching `line` for `actor`.
    ///
    /// Returns the command that ran, or `None` when nothing matched.
    pub fn process(&self, ctx: &mut CommandContext<'_>, actor: EntityId, line: &str) -> Option<&dyn Command> {
        for command in self.commands() {
            let Some(captures) = command.pattern().captures(line) else {
                continue;
            };
            let args: Vec<String> = captures
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect();
            tracing::debug!(command = command.name(), ?args, "dispatch");
            command.execute(ctx, actor, &args);
            return Some(command);
        }
        None
    }
}
