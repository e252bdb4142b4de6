use crate::builtin::show_room;
use crate::command::{Command, CommandContext, CommandError, pattern};
use regex::Regex;
use tilemud_common::{EntityId, MessageMode};
use tilemud_persist::UserCommandDef;
use tilemud_script::{Invocation, ScriptMessage, ScriptSandbox};

/// A persisted (pattern, script body) pair.
///
/// The body is parsed once at load time to reject broken commands early, but
/// every execution compiles and runs it in a fresh sandbox.
#[derive(Debug, Clone)]
pub struct UserCommand {
    file: String,
    source: String,
    pattern: Regex,
    body: String,
}

impl UserCommand {
    pub fn compile(def: &UserCommandDef, sandbox: &ScriptSandbox) -> Result<Self, CommandError> {
        let regex = pattern(&def.pattern)?;
        sandbox.check(&def.body).map_err(|source| CommandError::Script {
            pattern: def.pattern.clone(),
            source,
        })?;
        Ok(Self {
            file: def.name.clone(),
            source: def.pattern.clone(),
            pattern: regex,
            body: def.body.clone(),
        })
    }

    /// Name of the file the command was loaded from.
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl Command for UserCommand {
    /// User commands are identified by their pattern source.
    fn name(&self) -> &str {
        &self.source
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn eligible(&self) -> bool {
        false
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, actor: EntityId, args: &[String]) {
        let invocation = Invocation {
            label: &self.source,
            actor,
            args,
            meta: ctx.meta,
            map: Some(ctx.map),
        };
        let outcome = ctx.sandbox.run(ctx.world, invocation, &self.body);
        for message in outcome.messages {
            match message {
                ScriptMessage::Broadcast(text) => ctx.players.broadcast(&text, MessageMode::Misc, None),
                ScriptMessage::Tell { player, text } => ctx.players.send_line(player, &text, MessageMode::Misc),
                ScriptMessage::ShowRoom(mob) => show_room(ctx, mob),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandRegistry;
    use crate::command::tests::Harness;
    use tilemud_session::MemoryTransport;

    fn def(pattern: &str, body: &str) -> UserCommandDef {
        UserCommandDef {
            name: "test".into(),
            pattern: pattern.into(),
            body: body.into(),
        }
    }

    #[test]
    fn broken_definitions_are_rejected() {
        let sandbox = ScriptSandbox::default();
        assert!(matches!(
            UserCommand::compile(&def("^(unclosed", ""), &sandbox),
            Err(CommandError::InvalidPattern { .. })
        ));
        assert!(matches!(
            UserCommand::compile(&def("^ok$", "let = ;"), &sandbox),
            Err(CommandError::Script { .. })
        ));
    }

    #[test]
    fn script_broadcast_reaches_everyone() {
        let mut h = Harness::new();
        let other = MemoryTransport::new();
        h.players.connect(Box::new(other.clone()));

        let mut registry = CommandRegistry::new();
        let command = UserCommand::compile(&def("^shout (.+)$", "broadcast(args[0]);"), &h.sandbox).unwrap();
        assert_eq!(command.file(), "test");
        registry.register_user(command);

        h.input(&registry, "shout HELLO");
        assert_eq!(h.out.output(), "HELLO\r\n");
        assert_eq!(other.output(), "HELLO\r\n");
    }

    #[test]
    fn scripted_moves_show_the_new_room() {
        let mut h = Harness::new();
        let mut registry = CommandRegistry::new();
        let dash = def("^dash$", r#"tell(user, "You dash."); step(user, EAST);"#);
        registry.register_user(UserCommand::compile(&dash, &h.sandbox).unwrap());

        h.input(&registry, "dash");
        assert_eq!(h.world.get(h.mob).unwrap().location(), h.world.locate(h.map, 1, 0, 0));
        assert_eq!(h.out.output(), "You dash.\r\n\r\ntile\r\n A tile.\r\n");
    }

    #[test]
    fn faulting_script_keeps_earlier_changes_and_isolates_fault() {
        let mut h = Harness::new();
        let mut registry = CommandRegistry::new();
        let body = r#"
            user.display = "Changed";
            tell(user, "first");
            throw "boom";
        "#;
        registry.register_user(UserCommand::compile(&def("^fail$", body), &h.sandbox).unwrap());

        assert_eq!(h.input(&registry, "fail").as_deref(), Some("^fail$"));
        assert_eq!(h.world.get(h.mob).unwrap().display(), "Changed");
        assert_eq!(h.out.output(), "first\r\n");
        assert!(!h.out.output().contains("boom"));
        assert!(h.world.audit().is_empty());
    }
}
