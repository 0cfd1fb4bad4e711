//! Nintendo Game Boy and Game Boy Color.
//!
//! # Architecture
//!
//! - **CPU**: Sharp LR35902 @ 4.194304 MHz, supplied by the caller through
//!   [`emu_core::Cpu`]
//! - **PPU**: mode-driven LCD controller, 456 cycles per line, 154 lines
//! - **RAM**: 8 KiB work RAM (32 KiB in eight banks on the Color), 127 bytes
//!   of high RAM
//! - **VRAM**: 8 KiB (two banks on the Color)
//! - **Cartridge**: one of the [`mappers`] boards, picked from the header
//!
//! The audio unit is not simulated; frames carry silence so audio sinks keep
//! their pace.

pub mod bus;
pub mod header;
pub mod joypad;
pub mod mappers;
pub mod ppu;
mod serial;
mod system;
mod timer;

pub use bus::GbBus;
pub use header::{CartridgeHeader, CgbSupport};
pub use joypad::buttons;
pub use mappers::{GbMapper, GbMapperKind};
pub use system::{GbMachine, CARTRIDGE_MOUNT, SAVE_RAM_MOUNT};

use emu_core::EmuError;
use thiserror::Error;

/// Bits of IF (0xFF0F) and IE (0xFFFF).
pub mod interrupts {
    pub const VBLANK: u8 = 0x01;
    pub const STAT: u8 = 0x02;
    pub const TIMER: u8 = 0x04;
    pub const SERIAL: u8 = 0x08;
    pub const JOYPAD: u8 = 0x10;
}

#[derive(Debug, Error)]
pub enum GbError {
    #[error("invalid mount point `{0}`")]
    InvalidMountPoint(String),

    #[error("ROM image too small for a cartridge header ({0} bytes)")]
    RomTooSmall(usize),

    #[error("no cartridge inserted")]
    NoCartridge,

    #[error("save state is for `{found}`, this machine runs as `{expected}`")]
    ModelMismatch {
        expected: &'static str,
        found: String,
    },
}

impl From<GbError> for EmuError {
    fn from(err: GbError) -> Self {
        EmuError::Machine(Box::new(err))
    }
}
