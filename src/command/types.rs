//! Command record model, decoded once at the record boundary

use std::fmt;

/// Longest reason text a COMMAND record carries
pub const REASON_LEN: usize = 20;

/// What the peer asks the player to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandAction {
    Move,
    Turn,
    Shoot,
    Use,
    Weapon,
    Wait,
    Unknown,
}

impl CommandAction {
    /// Parse the record's action token; anything unrecognized is `Unknown`
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "MOVE" => Self::Move,
            "TURN" => Self::Turn,
            "SHOOT" => Self::Shoot,
            "USE" => Self::Use,
            "WEAPON" => Self::Weapon,
            "WAIT" => Self::Wait,
            _ => Self::Unknown,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Move => "MOVE",
            Self::Turn => "TURN",
            Self::Shoot => "SHOOT",
            Self::Use => "USE",
            Self::Weapon => "WEAPON",
            Self::Wait => "WAIT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
    #[default]
    None,
}

impl Direction {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "FORWARD" => Self::Forward,
            "BACK" | "BACKWARD" => Self::Back,
            "LEFT" => Self::Left,
            "RIGHT" => Self::Right,
            _ => Self::None,
        }
    }

    /// Record token; blank for `None`
    pub fn token(self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Back => "BACK",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::None => "",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("NONE"),
            other => f.write_str(other.token()),
        }
    }
}

/// One decoded COMMAND record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub action: CommandAction,
    pub direction: Direction,
    /// Centiseconds (MOVE, WAIT), degrees (TURN), repeat count (SHOOT),
    /// weapon slot (WEAPON)
    pub value: i32,
    /// 0..=9; carried through but not used for ordering
    pub priority: u8,
    /// Advisory, for logs only
    pub reason: String,
}

#[cfg(test)]
impl CommandRecord {
    pub fn new(action: CommandAction, direction: Direction, value: i32) -> Self {
        Self {
            action,
            direction,
            value,
            priority: 0,
            reason: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(9);
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.chars().take(REASON_LEN).collect();
        self
    }
}
