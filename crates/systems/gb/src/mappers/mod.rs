//! Game Boy memory bank controllers.
//!
//! Every board decodes ROM at 0x0000-0x7FFF (writes there hit its registers)
//! and external RAM at 0xA000-0xBFFF. Bank numbers are masked with the
//! power-of-two bank mask of the image before indexing.

mod camera;
mod huc1;
mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;
mod no_mapper;
mod rtc;

pub use camera::{Camera, SENSOR_HEIGHT, SENSOR_WIDTH};
pub use huc1::Huc1;
pub use mbc1::Mbc1;
pub use mbc2::Mbc2;
pub use mbc3::Mbc3;
pub use mbc5::Mbc5;
pub use no_mapper::NoMapper;
pub use rtc::{Rtc, RTC_BLOCK_LEN};

use emu_core::cartridge::{bank_mask, copy_clamped, mirrored_read, mirrored_write, Cartridge};
use emu_core::{EmuError, StateMap, Stateful};
use serde::{Deserialize, Serialize};

use crate::header::CartridgeHeader;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GbMapperKind {
    NoMapper,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
    Huc1,
    Camera,
}

impl GbMapperKind {
    pub fn name(self) -> &'static str {
        match self {
            GbMapperKind::NoMapper => "ROM only",
            GbMapperKind::Mbc1 => "MBC1",
            GbMapperKind::Mbc2 => "MBC2",
            GbMapperKind::Mbc3 => "MBC3",
            GbMapperKind::Mbc5 => "MBC5",
            GbMapperKind::Huc1 => "HuC1",
            GbMapperKind::Camera => "Pocket Camera",
        }
    }
}

/// ROM and RAM of a board plus the bookkeeping every controller shares.
pub(crate) struct BankedMemory {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub rom_mask: usize,
    pub ram_mask: usize,
    pub battery: bool,
    pub ram_touched: bool,
}

impl BankedMemory {
    pub fn new(rom: Vec<u8>, ram_size: usize, battery: bool) -> Self {
        let rom_mask = bank_mask(rom.len(), 14);
        let ram_mask = bank_mask(ram_size, 13);
        Self {
            rom,
            ram: vec![0; ram_size],
            rom_mask,
            ram_mask,
            battery,
            ram_touched: false,
        }
    }

    pub fn rom_byte(&self, bank: usize, addr: u16) -> u8 {
        let bank = bank & self.rom_mask;
        mirrored_read(&self.rom, bank * ROM_BANK_SIZE + usize::from(addr & 0x3FFF))
    }

    pub fn ram_byte(&self, bank: usize, addr: u16) -> u8 {
        let bank = bank & self.ram_mask;
        mirrored_read(&self.ram, bank * RAM_BANK_SIZE + usize::from(addr & 0x1FFF))
    }

    pub fn set_ram_byte(&mut self, bank: usize, addr: u16, val: u8) {
        let bank = bank & self.ram_mask;
        mirrored_write(
            &mut self.ram,
            bank * RAM_BANK_SIZE + usize::from(addr & 0x1FFF),
            val,
        );
    }

    pub fn enable_ram(&mut self, val: u8) -> bool {
        let enabled = val & 0x0F == 0x0A;
        if enabled {
            self.ram_touched = true;
        }
        enabled
    }

    pub fn load_rom(&mut self, data: &[u8]) {
        copy_clamped(&mut self.rom, data);
    }

    pub fn load_ram(&mut self, data: &[u8]) {
        copy_clamped(&mut self.ram, data);
    }

    pub fn save_needed(&self) -> bool {
        self.battery && self.ram_touched && !self.ram.is_empty()
    }

    /// RAM is part of the state; it changes every frame on most boards.
    pub fn capture(&self, state: &mut StateMap) {
        state.put("ram", &self.ram[..]);
        state.put("ram_touched", self.ram_touched);
    }

    pub fn restore(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("ram", &mut self.ram)?;
        self.ram_touched = state.get("ram_touched")?;
        Ok(())
    }
}

pub(crate) fn unsupported(device: &'static str, addr: u16) -> EmuError {
    EmuError::UnsupportedAddress { device, addr }
}

pub(crate) fn is_cart_address(addr: u16) -> bool {
    matches!(addr, 0x0000..=0x7FFF | 0xA000..=0xBFFF)
}

/// Closed set of boards behind one [`Cartridge`] face.
pub enum GbMapper {
    NoMapper(NoMapper),
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
    Huc1(Huc1),
    Camera(Camera),
}

impl GbMapper {
    pub fn new(header: &CartridgeHeader, rom: Vec<u8>) -> Self {
        let ram = header.ram_size;
        let battery = header.battery;
        match header.kind {
            GbMapperKind::NoMapper => GbMapper::NoMapper(NoMapper::new(rom, battery)),
            GbMapperKind::Mbc1 => GbMapper::Mbc1(Mbc1::new(rom, ram, battery)),
            GbMapperKind::Mbc2 => GbMapper::Mbc2(Mbc2::new(rom, battery)),
            GbMapperKind::Mbc3 => GbMapper::Mbc3(Mbc3::new(rom, ram, battery, header.timer)),
            GbMapperKind::Mbc5 => GbMapper::Mbc5(Mbc5::new(rom, ram, battery, header.rumble)),
            GbMapperKind::Huc1 => GbMapper::Huc1(Huc1::new(rom, ram, battery)),
            GbMapperKind::Camera => GbMapper::Camera(Camera::new(rom)),
        }
    }

    pub fn kind(&self) -> GbMapperKind {
        match self {
            GbMapper::NoMapper(_) => GbMapperKind::NoMapper,
            GbMapper::Mbc1(_) => GbMapperKind::Mbc1,
            GbMapper::Mbc2(_) => GbMapperKind::Mbc2,
            GbMapper::Mbc3(_) => GbMapperKind::Mbc3,
            GbMapper::Mbc5(_) => GbMapperKind::Mbc5,
            GbMapper::Huc1(_) => GbMapperKind::Huc1,
            GbMapper::Camera(_) => GbMapperKind::Camera,
        }
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        match self {
            GbMapper::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    fn board(&self) -> &dyn Cartridge {
        match self {
            GbMapper::NoMapper(m) => m,
            GbMapper::Mbc1(m) => m,
            GbMapper::Mbc2(m) => m,
            GbMapper::Mbc3(m) => m,
            GbMapper::Mbc5(m) => m,
            GbMapper::Huc1(m) => m,
            GbMapper::Camera(m) => m,
        }
    }

    fn board_mut(&mut self) -> &mut dyn Cartridge {
        match self {
            GbMapper::NoMapper(m) => m,
            GbMapper::Mbc1(m) => m,
            GbMapper::Mbc2(m) => m,
            GbMapper::Mbc3(m) => m,
            GbMapper::Mbc5(m) => m,
            GbMapper::Huc1(m) => m,
            GbMapper::Camera(m) => m,
        }
    }
}

impl Cartridge for GbMapper {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        self.board().read(addr)
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        self.board_mut().write(addr, val)
    }

    fn load_rom(&mut self, data: &[u8]) {
        self.board_mut().load_rom(data)
    }

    fn load_ram(&mut self, data: &[u8]) {
        self.board_mut().load_ram(data)
    }

    fn rom_data(&self) -> &[u8] {
        self.board().rom_data()
    }

    fn ram_data(&self) -> &[u8] {
        self.board().ram_data()
    }

    fn save_data(&self) -> Vec<u8> {
        self.board().save_data()
    }

    fn is_ram_save_needed(&self) -> bool {
        self.board().is_ram_save_needed()
    }

    fn step(&mut self, cycles: u32) {
        self.board_mut().step(cycles)
    }
}

impl Stateful for GbMapper {
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
