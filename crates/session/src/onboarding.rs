use crate::player::Player;
use tilemud_common::{MessageMode, WorldMeta};

/// Names must be strictly longer than this many characters.
pub const NAME_MIN_EXCLUSIVE: usize = 3;
/// Names must be strictly shorter than this many characters.
pub const NAME_MAX_EXCLUSIVE: usize = 12;

/// Choices collected while a new connection creates its character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSheet {
    pub name: String,
    pub race: String,
    pub class: String,
}

/// What the next input line of a connecting player answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Onboarding {
    Name,
    Password { name: String },
    Race { name: String },
    Class { name: String, race: String },
    Motd(CharacterSheet),
}

impl Onboarding {
    /// The question asked when entering this state.
    pub fn prompt<'a>(&self, meta: &'a WorldMeta) -> &'a str {
        match self {
            Self::Name => "What's your name?",
            Self::Password { .. } => "Please enter a password:",
            Self::Race { .. } => "Enter a race:",
            Self::Class { .. } => "Enter a class:",
            Self::Motd(_) => &meta.motd,
        }
    }

    /// Whether the answer to this state may be written to logs.
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Password { .. })
    }

    /// Announce and ask for this state, registering it as the continuation.
    pub fn ask<K: From<Onboarding>>(self, player: &mut Player<K>, meta: &WorldMeta) {
        if let Self::Motd(sheet) = &self {
            player.send_line(
                &format!("Your choices: {}, {}, {}", sheet.name, sheet.race, sheet.class),
                MessageMode::Misc,
            );
        }
        let prompt = self.prompt(meta).to_string();
        player.request(&prompt, K::from(self));
    }

    /// Consume one answer.
    ///
    /// Either asks the next question (or the same one again after a
    /// validation failure) and returns `None`, or returns the finished sheet
    /// once the message of the day has been acknowledged.
    pub fn advance<K: From<Onboarding>>(
        self,
        player: &mut Player<K>,
        line: &str,
        meta: &WorldMeta,
    ) -> Option<CharacterSheet> {
        let next = match self {
            Self::Name => match validate_name(line) {
                Ok(()) => Self::Password { name: line.to_string() },
                Err(reason) => {
                    player.send_line(reason, MessageMode::Misc);
                    Self::Name
                }
            },
            Self::Password { name } => Self::Race { name },
            Self::Race { name } => Self::Class {
                name,
                race: line.to_string(),
            },
            Self::Class { name, race } => Self::Motd(CharacterSheet {
                name,
                race,
                class: line.to_string(),
            }),
            Self::Motd(sheet) => return Some(sheet),
        };
        next.ask(player, meta);
        None
    }
}

fn validate_name(name: &str) -> Result<(), &'static str> {
    let len = name.chars().count();
    if len <= NAME_MIN_EXCLUSIVE {
        Err("Name must be more than 3 characters.")
    } else if len >= NAME_MAX_EXCLUSIVE {
        Err("Name must be less than 12 characters.")
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use tilemud_common::PlayerId;

    fn connect() -> (Player<Onboarding>, MemoryTransport, WorldMeta) {
        let out = MemoryTransport::new();
        let player = Player::new(PlayerId(0), Box::new(out.clone()));
        (player, out, WorldMeta::default())
    }

    fn answer(player: &mut Player<Onboarding>, line: &str, meta: &WorldMeta) -> Option<CharacterSheet> {
        let state = player.begin_input().expect("a question is pending");
        state.advance(player, line, meta)
    }

    #[test]
    fn name_length_bounds_are_exclusive() {
        assert!(validate_name("abc").is_err());
        assert!(validate_name("abcd").is_ok());
        assert!(validate_name("abcdefghijk").is_ok());
        assert!(validate_name("abcdefghijkl").is_err());
        assert!(validate_name("").is_err());
        // Length counts characters, not bytes.
        assert!(validate_name("éééé").is_ok());
    }

    #[test]
    fn short_name_reprompts() {
        let (mut p, out, meta) = connect();
        Onboarding::Name.ask(&mut p, &meta);
        assert_eq!(answer(&mut p, "Al", &meta), None);
        assert_eq!(p.pending(), Some(&Onboarding::Name));
        assert_eq!(
            out.output(),
            "What's your name? Name must be more than 3 characters.\r\nWhat's your name? "
        );
    }

    #[test]
    fn full_flow_produces_sheet() {
        let (mut p, out, meta) = connect();
        Onboarding::Name.ask(&mut p, &meta);
        assert_eq!(answer(&mut p, "Aria", &meta), None);
        assert!(p.pending().is_some_and(Onboarding::is_secret));
        assert_eq!(answer(&mut p, "hunter2", &meta), None);
        assert_eq!(answer(&mut p, "elf", &meta), None);
        assert_eq!(answer(&mut p, "bard", &meta), None);
        assert!(matches!(p.pending(), Some(Onboarding::Motd(_))));

        let sheet = answer(&mut p, "", &meta).unwrap();
        assert_eq!(
            sheet,
            CharacterSheet {
                name: "Aria".into(),
                race: "elf".into(),
                class: "bard".into(),
            }
        );
        assert_eq!(p.pending(), None);

        let transcript = out.output();
        assert!(transcript.contains("Your choices: Aria, elf, bard\r\n"));
        assert!(transcript.ends_with(&format!("{} ", meta.motd)));
        assert!(!transcript.contains("hunter2"));
    }
}
