//! Input injection capability

use tracing::info;

use crate::command::KeyCode;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("input sink rejected {primitive}: {message}")]
    Rejected {
        primitive: &'static str,
        message: String,
    },
}

/// Physical input primitives the scheduler drives.
///
/// Implementations live outside the bridge (OS injection, remote desktop,
/// test recorders). Calls are made from the single executor task only.
pub trait InputSink: Send {
    fn key_down(&mut self, key: &KeyCode) -> Result<(), SinkError>;
    fn key_up(&mut self, key: &KeyCode) -> Result<(), SinkError>;
    fn pointer_move(&mut self, dx: i32, dy: i32) -> Result<(), SinkError>;
    fn pointer_click(&mut self) -> Result<(), SinkError>;
}

/// Dry-run sink: logs every primitive instead of injecting it.
///
/// Blank key names (possible through `KEY_MAP`) are rejected, as an
/// injecting sink would.
#[derive(Debug, Default)]
pub struct LoggingSink;

fn require_key(primitive: &'static str, key: &KeyCode) -> Result<(), SinkError> {
    if key.0.trim().is_empty() {
        return Err(SinkError::Rejected {
            primitive,
            message: "blank key name".to_string(),
        });
    }
    Ok(())
}

impl InputSink for LoggingSink {
    fn key_down(&mut self, key: &KeyCode) -> Result<(), SinkError> {
        require_key("key_down", key)?;
        info!(key = %key, "key down");
        Ok(())
    }

    fn key_up(&mut self, key: &KeyCode) -> Result<(), SinkError> {
        require_key("key_up", key)?;
        info!(key = %key, "key up");
        Ok(())
    }

    fn pointer_move(&mut self, dx: i32, dy: i32) -> Result<(), SinkError> {
        info!(dx, dy, "pointer move");
        Ok(())
    }

    fn pointer_click(&mut self) -> Result<(), SinkError> {
        info!("pointer click");
        Ok(())
    }
}
