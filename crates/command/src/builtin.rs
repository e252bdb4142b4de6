use crate::command::{Command, CommandContext, CommandError, pattern};
use regex::Regex;
use tilemud_common::{Direction, EntityId, MessageMode};

/// Describe the actor's surroundings to its controller.
///
/// Shows the location's display and description, then one line per other
/// occupant.
pub fn show_room(ctx: &mut CommandContext<'_>, actor: EntityId) {
    let Some(location) = ctx
        .world
        .get(actor)
        .and_then(|e| e.location())
        .and_then(|loc| ctx.world.get(loc))
    else {
        ctx.tell(actor, "You aren't anywhere!", MessageMode::Misc);
        return;
    };

    let mut text = format!(
        "{}\r\n {}",
        location.display(),
        location.description().unwrap_or_default()
    );
    for other in location.contents().iter().filter(|id| **id != actor) {
        if let Some(entity) = ctx.world.get(*other) {
            text.push_str(&format!("\r\n {} is here.", entity.display()));
        }
    }
    ctx.tell(actor, &text, MessageMode::Command);
}

/// The built-in commands in registration order.
pub fn standard() -> Result<Vec<Box<dyn Command>>, CommandError> {
    let mut commands: Vec<Box<dyn Command>> = vec![Box::new(Look::new()?)];
    for direction in Direction::ALL {
        commands.push(Box::new(Movement::new(direction)?));
    }
    commands.push(Box::new(Ooc::new()?));
    commands.push(Box::new(Quit::new()?));
    commands.push(Box::new(Save::new()?));
    Ok(commands)
}

pub struct Look {
    pattern: Regex,
}

impl Look {
    pub fn new() -> Result<Self, CommandError> {
        Ok(Self {
            pattern: pattern("^look$")?,
        })
    }
}

impl Command for Look {
    fn name(&self) -> &str {
        "look"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, actor: EntityId, _args: &[String]) {
        show_room(ctx, actor);
    }
}

/// One step in a fixed direction, then a look around.
pub struct Movement {
    direction: Direction,
    pattern: Regex,
}

impl Movement {
    pub fn new(direction: Direction) -> Result<Self, CommandError> {
        Ok(Self {
            direction,
            pattern: pattern(&movement_pattern(direction))?,
        })
    }
}

/// Prefix abbreviations for cardinal names (`n`, `no`, ... `north`); short
/// name or full name for diagonals.
fn movement_pattern(direction: Direction) -> String {
    let long = direction.long_name();
    let short = direction.short_name();
    if short.len() == 1 {
        let mut chars = long.chars();
        let first = chars.next().map(String::from).unwrap_or_default();
        let tail = chars.rev().fold(String::new(), |inner, c| format!("({c}{inner})?"));
        format!("^{first}{tail}$")
    } else {
        format!("^({short}|{long})$")
    }
}

impl Command for Movement {
    fn name(&self) -> &str {
        self.direction.long_name()
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, actor: EntityId, _args: &[String]) {
        match ctx.world.step(actor, self.direction) {
            Ok(true) => show_room(ctx, actor),
            Ok(false) => ctx.tell(actor, "You cannot go that way.", MessageMode::Command),
            Err(e) => {
                tracing::debug!(%actor, "step failed: {e}");
                ctx.tell(actor, "You cannot go that way.", MessageMode::Command);
            }
        }
    }
}

/// Out-of-character chat to every other player.
pub struct Ooc {
    pattern: Regex,
}

impl Ooc {
    pub fn new() -> Result<Self, CommandError> {
        Ok(Self {
            pattern: pattern("^ooc (.+)")?,
        })
    }
}

impl Command for Ooc {
    fn name(&self) -> &str {
        "ooc"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, actor: EntityId, args: &[String]) {
        let message = args.first().map(String::as_str).unwrap_or_default();
        let speaker = ctx
            .world
            .get(actor)
            .map(|e| e.display().to_string())
            .unwrap_or_default();
        let sender = ctx.world.controller_of(actor);
        ctx.players.broadcast(
            &format!("{speaker} OOCs '{message}'"),
            MessageMode::Chat,
            sender,
        );
        ctx.tell(actor, &format!("You OOC '{message}'"), MessageMode::Command);
    }
}

pub struct Quit {
    pattern: Regex,
}

impl Quit {
    pub fn new() -> Result<Self, CommandError> {
        Ok(Self {
            pattern: pattern("^quit$")?,
        })
    }
}

impl Command for Quit {
    fn name(&self) -> &str {
        "quit"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, actor: EntityId, _args: &[String]) {
        match ctx.world.controller_of(actor) {
            Some(player) => ctx.logouts.push(player),
            None => tracing::debug!(%actor, "quit from an uncontrolled mob"),
        }
    }
}

/// Show the actor's savable form.
pub struct Save {
    pattern: Regex,
}

impl Save {
    pub fn new() -> Result<Self, CommandError> {
        Ok(Self {
            pattern: pattern("^save$")?,
        })
    }
}

impl Command for Save {
    fn name(&self) -> &str {
        "save"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, actor: EntityId, _args: &[String]) {
        let json = ctx
            .world
            .to_savable(actor)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::to_string_pretty(&s).map_err(|e| e.to_string()));
        match json {
            Ok(json) => ctx.tell(actor, &json.replace('\n', "\r\n"), MessageMode::Command),
            Err(e) => tracing::error!(%actor, "failed to serialize savable: {e}"),
        }
    }
}
