//! MBC5: up to 8 MiB ROM and 128 KiB RAM.
//!
//! - 0x0000-0x1FFF: RAM enable
//! - 0x2000-0x2FFF: ROM bank, low 8 bits (bank 0 is selectable)
//! - 0x3000-0x3FFF: ROM bank bit 8
//! - 0x4000-0x5FFF: RAM bank, 4 bits; bit 3 drives the motor on rumble boards

use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{unsupported, BankedMemory};

pub struct Mbc5 {
    mem: BankedMemory,
    rumble: bool,
    ram_enabled: bool,
    rom_bank: u16,
    ram_bank: u8,
    motor: bool,
}

impl Mbc5 {
    pub fn new(rom: Vec<u8>, ram_size: usize, battery: bool, rumble: bool) -> Self {
        Self {
            mem: BankedMemory::new(rom, ram_size, battery),
            rumble,
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
            motor: false,
        }
    }

    /// Rumble motor state, always off on boards without one.
    pub fn motor_on(&self) -> bool {
        self.motor
    }
}

impl Cartridge for Mbc5 {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        match addr {
            0x0000..=0x3FFF => Ok(self.mem.rom_byte(0, addr)),
            0x4000..=0x7FFF => Ok(self.mem.rom_byte(usize::from(self.rom_bank), addr)),
            0xA000..=0xBFFF if self.ram_enabled => {
                Ok(self.mem.ram_byte(usize::from(self.ram_bank), addr))
            }
            0xA000..=0xBFFF => Ok(0xFF),
            _ => Err(unsupported("mbc5", addr)),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = self.mem.enable_ram(val),
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | u16::from(val),
            0x3000..=0x3FFF => {
                self.rom_bank = (self.rom_bank & 0x0FF) | (u16::from(val & 0x01) << 8)
            }
            0x4000..=0x5FFF => {
                if self.rumble {
                    let motor = val & 0x08 != 0;
                    if motor != self.motor {
                        log(LogCategory::Cartridge, LogLevel::Trace, || {
                            format!("MBC5: rumble {}", if motor { "on" } else { "off" })
                        });
                    }
                    self.motor = motor;
                    self.ram_bank = val & 0x07;
                } else {
                    self.ram_bank = val & 0x0F;
                }
            }
            // No register decodes here.
            0x6000..=0x7FFF => {}
            0xA000..=0xBFFF => {
                if self.ram_enabled {
                    self.mem.set_ram_byte(usize::from(self.ram_bank), addr, val);
                }
            }
            _ => return Err(unsupported("mbc5", addr)),
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

impl Stateful for Mbc5 {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        self.mem.capture(&mut state);
        state.put("ram_enabled", self.ram_enabled);
        state.put("rom_bank", self.rom_bank);
        state.put("ram_bank", self.ram_bank);
        state.put("motor", self.motor);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.mem.restore(state)?;
        self.ram_enabled = state.get("ram_enabled")?;
        self.rom_bank = state.get("rom_bank")?;
        self.ram_bank = state.get("ram_bank")?;
        self.motor = state.get("motor")?;
        Ok(())
    }
}
