//! MBC1: up to 2 MiB ROM and 32 KiB RAM.
//!
//! - 0x0000-0x1FFF: RAM enable (0x0A in the low nibble)
//! - 0x2000-0x3FFF: ROM bank, low 5 bits (0 reads as 1)
//! - 0x4000-0x5FFF: RAM bank or ROM bank bits 5-6
//! - 0x6000-0x7FFF: banking mode; mode 1 applies the upper bits to
//!   0x0000-0x3FFF and to RAM as well

use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{unsupported, BankedMemory};

pub struct Mbc1 {
    mem: BankedMemory,
    ram_enabled: bool,
    rom_bank: u8,
    upper: u8,
    mode: u8,
}

impl Mbc1 {
    pub fn new(rom: Vec<u8>, ram_size: usize, battery: bool) -> Self {
        Self {
            mem: BankedMemory::new(rom, ram_size, battery),
            ram_enabled: false,
            rom_bank: 1,
            upper: 0,
            mode: 0,
        }
    }

    fn lower_bank(&self) -> usize {
        if self.mode == 1 {
            usize::from(self.upper) << 5
        } else {
            0
        }
    }

    fn upper_bank(&self) -> usize {
        let low = if self.rom_bank == 0 { 1 } else { self.rom_bank };
        usize::from(low) | (usize::from(self.upper) << 5)
    }

    fn ram_bank(&self) -> usize {
        if self.mode == 1 {
            usize::from(self.upper)
        } else {
            0
        }
    }
}

impl Cartridge for Mbc1 {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        match addr {
            0x0000..=0x3FFF => Ok(self.mem.rom_byte(self.lower_bank(), addr)),
            0x4000..=0x7FFF => Ok(self.mem.rom_byte(self.upper_bank(), addr)),
            0xA000..=0xBFFF if self.ram_enabled => Ok(self.mem.ram_byte(self.ram_bank(), addr)),
            0xA000..=0xBFFF => Ok(0xFF),
            _ => Err(unsupported("mbc1", addr)),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = self.mem.enable_ram(val),
            0x2000..=0x3FFF => {
                self.rom_bank = val & 0x1F;
                log(LogCategory::Cartridge, LogLevel::Trace, || {
                    format!("MBC1: ROM bank {:02X}", self.upper_bank())
                });
            }
            0x4000..=0x5FFF => self.upper = val & 0x03,
            0x6000..=0x7FFF => self.mode = val & 0x01,
            0xA000..=0xBFFF => {
                if self.ram_enabled {
                    self.mem.set_ram_byte(self.ram_bank(), addr, val);
                }
            }
            _ => return Err(unsupported("mbc1", addr)),
        }
        Ok(())
    }

    fn load_rom(&mut self, data: &[u8]) {
        self.mem.load_rom(data);
    }

    fn load_ram(&mut self, data: &[u8]) {
        self.mem.load_ram(data);
    }

    fn rom_data(&self) -> &[u8] {
        &self.mem.rom
    }

    fn ram_data(&self) -> &[u8] {
        &self.mem.ram
    }

    fn is_ram_save_needed(&self) -> bool {
        self.mem.save_needed()
    }
}

impl Stateful for Mbc1 {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        self.mem.capture(&mut state);
        state.put("ram_enabled", self.ram_enabled);
        state.put("rom_bank", self.rom_bank);
        state.put("upper", self.upper);
        state.put("mode", self.mode);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.mem.restore(state)?;
        self.ram_enabled = state.get("ram_enabled")?;
        self.rom_bank = state.get("rom_bank")?;
        self.upper = state.get("upper")?;
        self.mode = state.get("mode")?;
        Ok(())
    }
}
