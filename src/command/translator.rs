//! Command record -> timed input actions

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::util::time::centis_to_millis;

use super::types::{CommandAction, CommandRecord, Direction};

/// Pause between consecutive shots
pub const SHOT_INTERVAL_MS: u32 = 100;

/// Weapon slots selectable by number key
pub const WEAPON_SLOTS: std::ops::RangeInclusive<i32> = 1..=7;

/// Key name as understood by the input sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub String);

impl KeyCode {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction and action key table; overridable from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub forward: KeyCode,
    pub back: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    #[serde(rename = "use")]
    pub use_key: KeyCode,
    /// Keys for weapon slots 1..=7, in order
    pub weapons: Vec<KeyCode>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: KeyCode::new("w"),
            back: KeyCode::new("s"),
            left: KeyCode::new("a"),
            right: KeyCode::new("d"),
            use_key: KeyCode::new("space"),
            weapons: WEAPON_SLOTS.map(|n| KeyCode::new(n.to_string())).collect(),
        }
    }
}

impl KeyBindings {
    pub fn direction_key(&self, direction: Direction) -> Option<&KeyCode> {
        match direction {
            Direction::Forward => Some(&self.forward),
            Direction::Back => Some(&self.back),
            Direction::Left => Some(&self.left),
            Direction::Right => Some(&self.right),
            Direction::None => None,
        }
    }

    /// Key for weapon slot `slot` (1-based)
    pub fn weapon_key(&self, slot: i32) -> Option<&KeyCode> {
        if !WEAPON_SLOTS.contains(&slot) {
            return None;
        }
        self.weapons.get(usize::try_from(slot - 1).ok()?)
    }
}

/// What an action does when it reaches the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    /// Down then up
    KeyPress(KeyCode),
    PointerMove { dx: i32, dy: i32 },
    PointerClick,
    /// Executor-side pause for `hold_millis`
    Wait,
}

/// One timed input primitive, owned by the scheduler queue until executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    /// Pause after dispatch (or the wait itself); 0 if none
    pub hold_millis: u32,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            hold_millis: 0,
        }
    }

    pub fn wait(millis: u32) -> Self {
        Self {
            kind: ActionKind::Wait,
            hold_millis: millis,
        }
    }

    pub fn key_down(key: KeyCode) -> Self {
        Self::new(ActionKind::KeyDown(key))
    }

    pub fn key_up(key: KeyCode) -> Self {
        Self::new(ActionKind::KeyUp(key))
    }

    pub fn key_press(key: KeyCode) -> Self {
        Self::new(ActionKind::KeyPress(key))
    }

    pub fn pointer_move(dx: i32, dy: i32) -> Self {
        Self::new(ActionKind::PointerMove { dx, dy })
    }

    pub fn pointer_click() -> Self {
        Self::new(ActionKind::PointerClick)
    }
}

/// Translation failures; the command produces no actions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("{action} value {value} out of range")]
    InvalidValue { action: CommandAction, value: i32 },

    #[error("{action} cannot use direction {direction}")]
    InvalidDirection {
        action: CommandAction,
        direction: Direction,
    },
}

/// Maps commands to actions using configured keys and turn sensitivity
#[derive(Debug, Clone)]
pub struct Translator {
    bindings: KeyBindings,
    /// Pointer pixels per degree of turn
    turn_sensitivity: f32,
}

impl Translator {
    pub fn new(bindings: KeyBindings, turn_sensitivity: f32) -> Self {
        Self {
            bindings,
            turn_sensitivity,
        }
    }

    pub fn translate(&self, cmd: &CommandRecord) -> Result<Vec<Action>, TranslateError> {
        let invalid_value = || TranslateError::InvalidValue {
            action: cmd.action,
            value: cmd.value,
        };
        let invalid_direction = || TranslateError::InvalidDirection {
            action: cmd.action,
            direction: cmd.direction,
        };

        match cmd.action {
            CommandAction::Move => {
                let centis = u32::try_from(cmd.value).map_err(|_| invalid_value())?;
                let key = self
                    .bindings
                    .direction_key(cmd.direction)
                    .ok_or_else(invalid_direction)?;
                Ok(vec![
                    Action::key_down(key.clone()),
                    Action::wait(centis_to_millis(centis)),
                    Action::key_up(key.clone()),
                ])
            }
            CommandAction::Turn => {
                let sign = match cmd.direction {
                    Direction::Right => 1.0,
                    Direction::Left => -1.0,
                    _ => return Err(invalid_direction()),
                };
                let dx = (cmd.value as f32 * self.turn_sensitivity * sign).round() as i32;
                Ok(vec![Action::pointer_move(dx, 0)])
            }
            CommandAction::Shoot => {
                let shots = usize::try_from(cmd.value).map_err(|_| invalid_value())?;
                Ok((0..shots)
                    .flat_map(|_| [Action::pointer_click(), Action::wait(SHOT_INTERVAL_MS)])
                    .collect())
            }
            CommandAction::Use => Ok(vec![Action::key_press(self.bindings.use_key.clone())]),
            CommandAction::Weapon => {
                let key = self
                    .bindings
                    .weapon_key(cmd.value)
                    .ok_or_else(invalid_value)?;
                Ok(vec![Action::key_press(key.clone())])
            }
            CommandAction::Wait => {
                let centis = u32::try_from(cmd.value).map_err(|_| invalid_value())?;
                Ok(vec![Action::wait(centis_to_millis(centis))])
            }
            CommandAction::Unknown => {
                warn!(reason = %cmd.reason, "Dropping command with unknown action");
                Ok(Vec::new())
            }
        }
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(KeyBindings::default(), 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::codec::Record;
    use crate::records::{Encoding, RecordCodec};

    fn cmd(action: CommandAction, direction: Direction, value: i32) -> CommandRecord {
        CommandRecord::new(action, direction, value)
    }

    #[test]
    fn move_forward_holds_for_value_centiseconds() {
        let actions = Translator::default()
            .translate(&cmd(CommandAction::Move, Direction::Forward, 20))
            .expect("translates");
        assert_eq!(
            actions,
            vec![
                Action::key_down(KeyCode::new("w")),
                Action::wait(200),
                Action::key_up(KeyCode::new("w")),
            ]
        );
    }

    #[test]
    fn reference_record_becomes_forward_hold_in_centiseconds() {
        let line = format!("{:<80}", "COMMAND MOVE    FORWARD 00201ENEMY APPROACHING");
        let Ok(Record::Command(command)) = RecordCodec::new(Encoding::Ascii).decode(line.as_bytes())
        else {
            panic!("expected a command record");
        };
        assert_eq!(command.value, 20);
        assert_eq!(command.priority, 1);
        assert_eq!(command.reason, "ENEMY APPROACHING");

        // value 20 is centiseconds: a 200 ms hold
        let actions = Translator::default().translate(&command).expect("translates");
        let held: u32 = actions
            .iter()
            .filter(|a| a.kind == ActionKind::Wait)
            .map(|a| a.hold_millis)
            .sum();
        assert_eq!(held, 200);
        assert_eq!(actions.first(), Some(&Action::key_down(KeyCode::new("w"))));
        assert_eq!(actions.last(), Some(&Action::key_up(KeyCode::new("w"))));
    }

    #[test]
    fn turn_scales_by_sensitivity_and_direction() {
        let translator = Translator::new(KeyBindings::default(), 2.5);
        assert_eq!(
            translator.translate(&cmd(CommandAction::Turn, Direction::Left, 90)),
            Ok(vec![Action::pointer_move(-225, 0)])
        );
        assert_eq!(
            translator.translate(&cmd(CommandAction::Turn, Direction::Right, 15)),
            Ok(vec![Action::pointer_move(38, 0)])
        );
        assert!(matches!(
            translator.translate(&cmd(CommandAction::Turn, Direction::Forward, 15)),
            Err(TranslateError::InvalidDirection { .. })
        ));
    }

    #[test]
    fn shoot_repeats_click_and_pause() {
        let actions = Translator::default()
            .translate(&cmd(CommandAction::Shoot, Direction::None, 3))
            .expect("translates");
        assert_eq!(actions.len(), 6);
        assert!(actions
            .chunks(2)
            .all(|pair| pair == [Action::pointer_click(), Action::wait(SHOT_INTERVAL_MS)]));
    }

    #[test]
    fn weapon_out_of_range_is_rejected() {
        let translator = Translator::default();
        assert_eq!(
            translator.translate(&cmd(CommandAction::Weapon, Direction::None, 9)),
            Err(TranslateError::InvalidValue {
                action: CommandAction::Weapon,
                value: 9
            })
        );
        assert_eq!(
            translator.translate(&cmd(CommandAction::Weapon, Direction::None, 3)),
            Ok(vec![Action::key_press(KeyCode::new("3"))])
        );
    }

    #[test]
    fn use_wait_and_unknown() {
        let translator = Translator::default();
        assert_eq!(
            translator.translate(&cmd(CommandAction::Use, Direction::None, 0)),
            Ok(vec![Action::key_press(KeyCode::new("space"))])
        );
        assert_eq!(
            translator.translate(&cmd(CommandAction::Wait, Direction::None, 50)),
            Ok(vec![Action::wait(500)])
        );
        assert_eq!(
            translator.translate(&cmd(CommandAction::Unknown, Direction::Forward, 5)),
            Ok(Vec::new())
        );
    }

    #[test]
    fn negative_durations_and_missing_direction_are_rejected() {
        let translator = Translator::default();
        assert!(matches!(
            translator.translate(&cmd(CommandAction::Move, Direction::Back, -1)),
            Err(TranslateError::InvalidValue { .. })
        ));
        assert!(matches!(
            translator.translate(&cmd(CommandAction::Move, Direction::None, 10)),
            Err(TranslateError::InvalidDirection { .. })
        ));
        assert!(matches!(
            translator.translate(&cmd(CommandAction::Wait, Direction::None, -3)),
            Err(TranslateError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bindings_deserialize_with_defaults() {
        let bindings: KeyBindings =
            serde_json::from_str(r#"{"forward":"up","use":"e"}"#).expect("parses");
        assert_eq!(bindings.forward, KeyCode::new("up"));
        assert_eq!(bindings.use_key, KeyCode::new("e"));
        assert_eq!(bindings.back, KeyCode::new("s"));
        assert_eq!(bindings.weapons.len(), 7);
    }
}
