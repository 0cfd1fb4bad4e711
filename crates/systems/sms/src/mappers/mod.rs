//! Sega-family cartridge boards.
//!
//! Every board decodes CPU addresses 0x0000-0xBFFF plus the paging
//! registers at 0xFFFC-0xFFFF, which the bus forwards alongside its own RAM
//! write. ROM-area writes that hit no register are ignored.

mod codemasters;
mod janggun;
mod korean;
mod sega;
mod static_rom;

pub use codemasters::Codemasters;
pub use janggun::Janggun;
pub use korean::{Korean, KoreanMsx8k};
pub use sega::Sega;
pub use static_rom::StaticRom;

use emu_core::cartridge::Cartridge;
use emu_core::{EmuError, StateMap, Stateful};
use serde::{Deserialize, Serialize};

/// Board type, chosen explicitly or by [`SmsMapperKind::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsMapperKind {
    StaticRom,
    StaticRomWithRam,
    Sega,
    Codemasters,
    Korean,
    KoreanMsx8k,
    Janggun,
}

impl SmsMapperKind {
    pub const ALL: [SmsMapperKind; 7] = [
        SmsMapperKind::StaticRom,
        SmsMapperKind::StaticRomWithRam,
        SmsMapperKind::Sega,
        SmsMapperKind::Codemasters,
        SmsMapperKind::Korean,
        SmsMapperKind::KoreanMsx8k,
        SmsMapperKind::Janggun,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SmsMapperKind::StaticRom => "static_rom",
            SmsMapperKind::StaticRomWithRam => "static_rom_with_ram",
            SmsMapperKind::Sega => "sega",
            SmsMapperKind::Codemasters => "codemasters",
            SmsMapperKind::Korean => "korean",
            SmsMapperKind::KoreanMsx8k => "korean_msx8k",
            SmsMapperKind::Janggun => "janggun",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Guess the board from the image: up to 32 KiB is a plain ROM with
    /// RAM behind 0x8000-0xBFFF, up to 48 KiB fills the unpaged window, a
    /// valid Codemasters header selects that board, and everything else is
    /// assumed to use the Sega mapper.
    pub fn detect(rom: &[u8]) -> Self {
        if rom.len() <= 0x8000 {
            SmsMapperKind::StaticRomWithRam
        } else if rom.len() <= 0xC000 {
            SmsMapperKind::StaticRom
        } else if has_codemasters_header(rom) {
            SmsMapperKind::Codemasters
        } else {
            SmsMapperKind::Sega
        }
    }
}

/// Codemasters images carry a checksum at 0x7FE6 and its complement at
/// 0x7FE8.
fn has_codemasters_header(rom: &[u8]) -> bool {
    if rom.len() < 0x7FEA {
        return false;
    }
    let word = |at: usize| u16::from_le_bytes([rom[at], rom[at + 1]]);
    let checksum = word(0x7FE6);
    let inverse = word(0x7FE8);
    checksum != 0 && checksum.wrapping_add(inverse) == 0
}

/// Shared write decoding: ROM window and paging registers are accepted,
/// everything else belongs to somebody else.
pub(crate) fn check_write(device: &'static str, addr: u16) -> Result<(), EmuError> {
    match addr {
        0x0000..=0xBFFF | 0xFFFC..=0xFFFF => Ok(()),
        _ => Err(EmuError::UnsupportedAddress { device, addr }),
    }
}

pub(crate) fn check_read(device: &'static str, addr: u16) -> Result<(), EmuError> {
    if addr < 0xC000 {
        Ok(())
    } else {
        Err(EmuError::UnsupportedAddress { device, addr })
    }
}

/// Closed set of boards behind the [`Cartridge`] contract.
pub enum SmsMapper {
    StaticRom(StaticRom),
    Sega(Sega),
    Codemasters(Codemasters),
    Korean(Korean),
    KoreanMsx8k(KoreanMsx8k),
    Janggun(Janggun),
}

impl SmsMapper {
    pub fn new(kind: SmsMapperKind, rom: Vec<u8>) -> Self {
        match kind {
            SmsMapperKind::StaticRom => SmsMapper::StaticRom(StaticRom::new(rom, false)),
            SmsMapperKind::StaticRomWithRam => SmsMapper::StaticRom(StaticRom::new(rom, true)),
            SmsMapperKind::Sega => SmsMapper::Sega(Sega::new(rom)),
            SmsMapperKind::Codemasters => SmsMapper::Codemasters(Codemasters::new(rom)),
            SmsMapperKind::Korean => SmsMapper::Korean(Korean::new(rom)),
            SmsMapperKind::KoreanMsx8k => SmsMapper::KoreanMsx8k(KoreanMsx8k::new(rom)),
            SmsMapperKind::Janggun => SmsMapper::Janggun(Janggun::new(rom)),
        }
    }

    pub fn detect(rom: Vec<u8>) -> Self {
        let kind = SmsMapperKind::detect(&rom);
        Self::new(kind, rom)
    }

    pub fn kind(&self) -> SmsMapperKind {
        match self {
            SmsMapper::StaticRom(m) if m.has_ram() => SmsMapperKind::StaticRomWithRam,
            SmsMapper::StaticRom(_) => SmsMapperKind::StaticRom,
            SmsMapper::Sega(_) => SmsMapperKind::Sega,
            SmsMapper::Codemasters(_) => SmsMapperKind::Codemasters,
            SmsMapper::Korean(_) => SmsMapperKind::Korean,
            SmsMapper::KoreanMsx8k(_) => SmsMapperKind::KoreanMsx8k,
            SmsMapper::Janggun(_) => SmsMapperKind::Janggun,
        }
    }

    fn board(&self) -> &dyn Cartridge {
        match self {
            SmsMapper::StaticRom(m) => m,
            SmsMapper::Sega(m) => m,
            SmsMapper::Codemasters(m) => m,
            SmsMapper::Korean(m) => m,
            SmsMapper::KoreanMsx8k(m) => m,
            SmsMapper::Janggun(m) => m,
        }
    }

    fn board_mut(&mut self) -> &mut dyn Cartridge {
        match self {
            SmsMapper::StaticRom(m) => m,
            SmsMapper::Sega(m) => m,
            SmsMapper::Codemasters(m) => m,
            SmsMapper::Korean(m) => m,
            SmsMapper::KoreanMsx8k(m) => m,
            SmsMapper::Janggun(m) => m,
        }
    }
}

impl Stateful for SmsMapper {
    fn capture_state(&self) -> StateMap {
        let mut state = self.board().capture_state();
        state.put("kind", self.kind().name());
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let kind: String = state.get("kind")?;
        if kind != self.kind().name() {
            return Err(EmuError::State(format!(
                "cartridge state is for a {kind} board, inserted board is {}",
                self.kind().name()
            )));
        }
        self.board_mut().restore_state(state)
    }
}

impl Cartridge for SmsMapper {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        self.board().read(addr)
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        self.board_mut().write(addr, val)
    }

    fn load_rom(&mut self, data: &[u8]) {
        self.board_mut().load_rom(data);
    }

    fn load_ram(&mut self, data: &[u8]) {
        self.board_mut().load_ram(data);
    }

    fn rom_data(&self) -> &[u8] {
        self.board().rom_data()
    }

    fn ram_data(&self) -> &[u8] {
        self.board().ram_data()
    }

    fn is_ram_save_needed(&self) -> bool {
        self.board().is_ram_save_needed()
    }
}
