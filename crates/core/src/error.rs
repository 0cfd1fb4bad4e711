//! Error types shared by every machine crate.

use thiserror::Error;

use crate::savestate::SaveStateError;

/// Errors raised by the simulation core.
///
/// Recoverable conditions (save/load failures, bad configuration from the UI)
/// are reported back to the caller; anything else that escapes a frame is
/// handed to the scheduler's fatal handler.
#[derive(Debug, Error)]
pub enum EmuError {
    /// Clock or emulation configuration is unusable (zero rates, bad file).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Memory access outside of what the device decodes.
    #[error("unsupported address {addr:#06X} on {device}")]
    UnsupportedAddress { device: &'static str, addr: u16 },

    /// I/O port access outside of what the machine decodes.
    #[error("unsupported port {port:#04X} on {device}")]
    UnsupportedPort { device: &'static str, port: u8 },

    /// Cartridge header names a mapper that is not emulated.
    #[error("unimplemented mapper type {0:#04X}")]
    UnimplementedMapper(u8),

    #[error(transparent)]
    SaveState(#[from] SaveStateError),

    /// State map is missing a field or holds a value of the wrong shape.
    #[error("state error: {0}")]
    State(String),

    /// Machine-specific failure (mounting, header parsing).
    #[error(transparent)]
    Machine(Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmuError {
    /// Save/load failures never stop the scheduler.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EmuError::SaveState(_) | EmuError::State(_))
    }
}
