//! MBC2: up to 256 KiB ROM and 512 four-bit cells of built-in RAM.
//!
//! Writes to 0x0000-0x3FFF hit RAM enable when address bit 8 is clear and
//! the ROM bank register when it is set. RAM mirrors every 0x200 bytes
//! across 0xA000-0xBFFF and reads back with the upper nibble set.

use emu_core::cartridge::Cartridge;
use emu_core::{EmuError, StateMap, Stateful};

use super::{unsupported, BankedMemory};

const RAM_CELLS: usize = 512;

pub struct Mbc2 {
    mem: BankedMemory,
    ram_enabled: bool,
    rom_bank: u8,
}

impl Mbc2 {
    pub fn new(rom: Vec<u8>, battery: bool) -> Self {
        Self {
            mem: BankedMemory::new(rom, RAM_CELLS, battery),
            ram_enabled: false,
            rom_bank: 1,
        }
    }

    fn cell(addr: u16) -> usize {
        usize::from(addr) & (RAM_CELLS - 1)
    }
}

impl Cartridge for Mbc2 {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        match addr {
            0x0000..=0x3FFF => Ok(self.mem.rom_byte(0, addr)),
            0x4000..=0x7FFF => Ok(self.mem.rom_byte(usize::from(self.rom_bank), addr)),
            0xA000..=0xBFFF if self.ram_enabled => Ok(self.mem.ram[Self::cell(addr)] | 0xF0),
            0xA000..=0xBFFF => Ok(0xFF),
            _ => Err(unsupported("mbc2", addr)),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x3FFF if addr & 0x0100 == 0 => self.ram_enabled = self.mem.enable_ram(val),
            0x0000..=0x3FFF => {
                let bank = val & 0x0F;
                self.rom_bank = if bank == 0 { 1 } else { bank };
            }
            0x4000..=0x7FFF => {}
            0xA000..=0xBFFF => {
                if self.ram_enabled {
                    self.mem.ram[Self::cell(addr)] = val & 0x0F;
                }
            }
            _ => return Err(unsupported("mbc2", addr)),
        }
        Ok(())
    }

    fn load_rom(&mut self, data: &[u8]) {
        self.mem.load_rom(data);
    }

    fn load_ram(&mut self, data: &[u8]) {
        self.mem.load_ram(data);
        for cell in &mut self.mem.ram {
            *cell &= 0x0F;
        }
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

impl Stateful for Mbc2 {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        self.mem.capture(&mut state);
        state.put("ram_enabled", self.ram_enabled);
        state.put("rom_bank", self.rom_bank);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.mem.restore(state)?;
        self.ram_enabled = state.get("ram_enabled")?;
        self.rom_bank = state.get("rom_bank")?;
        Ok(())
    }
}
