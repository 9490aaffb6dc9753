//! Peer commands and their translation into input actions

pub mod translator;
pub mod types;

pub use translator::{Action, ActionKind, KeyCode, Translator};
pub use types::CommandAction;
