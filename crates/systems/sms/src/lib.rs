//! Sega 8-bit consoles: SG-1000, Master System and Game Gear.
//!
//! # Architecture
//!
//! - **CPU**: Zilog Z80A @ 3.58 MHz (NTSC) / 3.55 MHz (PAL), supplied by
//!   the caller through [`emu_core::Cpu`]
//! - **VDP**: TMS9918A (SG-1000), 315-5246 (SMS 2), 315-5378 (Game Gear)
//! - **PSG**: SN76489 family, Game Gear variant with stereo routing
//! - **RAM**: 8 KiB main RAM (1 KiB on the SG-1000)
//! - **VRAM**: 16 KiB video RAM
//! - **Cartridge**: one of the [`mappers`] boards

pub mod bus;
pub mod mappers;
mod system;
pub mod vdp;

pub use bus::{buttons, SmsBus, SmsModel};
pub use mappers::{SmsMapper, SmsMapperKind};
pub use system::{SmsMachine, CARTRIDGE_MOUNT, SAVE_RAM_MOUNT};

use emu_core::EmuError;
use thiserror::Error;

/// Errors specific to the Sega machines.
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("invalid mount point `{0}`")]
    InvalidMountPoint(String),

    #[error("ROM image is empty")]
    EmptyRom,

    #[error("no cartridge inserted")]
    NoCartridge,

    #[error("save state is for a {found} console, this is a {expected}")]
    ModelMismatch {
        expected: &'static str,
        found: String,
    },
}

impl From<SmsError> for EmuError {
    fn from(err: SmsError) -> Self {
        EmuError::Machine(Box::new(err))
    }
}
