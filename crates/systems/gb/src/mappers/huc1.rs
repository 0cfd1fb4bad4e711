//! Hudson HuC1: MBC1-like banking plus an infrared port.
//!
//! Writing 0x0E to 0x0000-0x1FFF maps the IR port at 0xA000 instead of RAM.
//! No peer is ever present, so the receiver always reports darkness.

use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{unsupported, BankedMemory};

const IR_SELECT: u8 = 0x0E;
const IR_NO_LIGHT: u8 = 0xC0;

pub struct Huc1 {
    mem: BankedMemory,
    ram_enabled: bool,
    ir_mode: bool,
    rom_bank: u8,
    ram_bank: u8,
}

impl Huc1 {
    pub fn new(rom: Vec<u8>, ram_size: usize, battery: bool) -> Self {
        Self {
            mem: BankedMemory::new(rom, ram_size, battery),
            ram_enabled: false,
            ir_mode: false,
            rom_bank: 1,
            ram_bank: 0,
        }
    }
}

impl Cartridge for Huc1 {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        match addr {
            0x0000..=0x3FFF => Ok(self.mem.rom_byte(0, addr)),
            0x4000..=0x7FFF => Ok(self.mem.rom_byte(usize::from(self.rom_bank), addr)),
            0xA000..=0xBFFF if self.ir_mode => Ok(IR_NO_LIGHT),
            0xA000..=0xBFFF if self.ram_enabled => {
                Ok(self.mem.ram_byte(usize::from(self.ram_bank), addr))
            }
            0xA000..=0xBFFF => Ok(0xFF),
            _ => Err(unsupported("huc1", addr)),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x1FFF => {
                self.ir_mode = val & 0x0F == IR_SELECT;
                self.ram_enabled = self.mem.enable_ram(val);
            }
            0x2000..=0x3FFF => {
                let bank = val & 0x3F;
                self.rom_bank = if bank == 0 { 1 } else { bank };
            }
            0x4000..=0x5FFF => self.ram_bank = val & 0x03,
            0x6000..=0x7FFF => {}
            0xA000..=0xBFFF if self.ir_mode => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("HuC1: IR transmitter {}", if val & 1 != 0 { "on" } else { "off" })
                });
            }
            0xA000..=0xBFFF => {
                if self.ram_enabled {
                    self.mem.set_ram_byte(usize::from(self.ram_bank), addr, val);
                }
            }
            _ => return Err(unsupported("huc1", addr)),
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

impl Stateful for Huc1 {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        self.mem.capture(&mut state);
        state.put("ram_enabled", self.ram_enabled);
        state.put("ir_mode", self.ir_mode);
        state.put("rom_bank", self.rom_bank);
        state.put("ram_bank", self.ram_bank);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.mem.restore(state)?;
        self.ram_enabled = state.get("ram_enabled")?;
        self.ir_mode = state.get("ir_mode")?;
        self.rom_bank = state.get("rom_bank")?;
        self.ram_bank = state.get("ram_bank")?;
        Ok(())
    }
}
