use emu_core::cartridge::{bank_mask, copy_clamped, mirrored_read, Cartridge};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{check_read, check_write};

const BANK_SIZE: usize = 0x4000;
const RAM_SIZE: usize = 0x8000;

/// Standard Sega paging: three 16 KiB slots selected through 0xFFFD-0xFFFF,
/// the first 1 KiB always fixed to bank 0, and up to two 16 KiB RAM banks
/// that can replace slot 2 (control register 0xFFFC, bits 3 and 2).
pub struct Sega {
    rom: Vec<u8>,
    ram: Vec<u8>,
    // FFFC control, FFFD..FFFF slot banks.
    registers: [u8; 4],
    mask: usize,
    ram_used: bool,
}

impl Sega {
    pub fn new(rom: Vec<u8>) -> Self {
        let mask = bank_mask(rom.len(), 14);
        Self {
            rom,
            ram: vec![0; RAM_SIZE],
            registers: [0, 0, 1, 2],
            mask,
            ram_used: false,
        }
    }

    fn rom_byte(&self, bank: u8, addr: u16) -> u8 {
        let offset = (usize::from(bank) & self.mask) * BANK_SIZE + (usize::from(addr) & 0x3FFF);
        mirrored_read(&self.rom, offset)
    }

    fn ram_enabled(&self) -> bool {
        self.registers[0] & 0x08 != 0
    }

    fn ram_offset(&self, addr: u16) -> usize {
        let bank = usize::from((self.registers[0] >> 2) & 0x01);
        bank * BANK_SIZE + (usize::from(addr) & 0x3FFF)
    }
}

impl Cartridge for Sega {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        check_read("sega mapper", addr)?;
        Ok(match addr {
            0x0000..=0x03FF => mirrored_read(&self.rom, usize::from(addr)),
            0x0400..=0x3FFF => self.rom_byte(self.registers[1], addr),
            0x4000..=0x7FFF => self.rom_byte(self.registers[2], addr),
            _ if self.ram_enabled() => self.ram[self.ram_offset(addr)],
            _ => self.rom_byte(self.registers[3], addr),
        })
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        check_write("sega mapper", addr)?;
        match addr {
            0x8000..=0xBFFF if self.ram_enabled() => {
                let offset = self.ram_offset(addr);
                self.ram[offset] = val;
                self.ram_used = true;
            }
            0xFFFC..=0xFFFF => {
                log(LogCategory::Cartridge, LogLevel::Debug, || {
                    format!("Sega mapper: {addr:04X} <- {val:02X}")
                });
                self.registers[usize::from(addr - 0xFFFC)] = val;
                if addr == 0xFFFC && self.ram_enabled() {
                    self.ram_used = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn load_rom(&mut self, data: &[u8]) {
        copy_clamped(&mut self.rom, data);
    }

    fn load_ram(&mut self, data: &[u8]) {
        copy_clamped(&mut self.ram, data);
    }

    fn rom_data(&self) -> &[u8] {
        &self.rom
    }

    fn ram_data(&self) -> &[u8] {
        &self.ram
    }

    fn is_ram_save_needed(&self) -> bool {
        self.ram_used
    }
}

impl Stateful for Sega {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("registers", &self.registers[..]);
        state.put("ram", self.ram.as_slice());
        state.put("ram_used", self.ram_used);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("registers", &mut self.registers)?;
        state.get_bytes_into("ram", &mut self.ram)?;
        self.ram_used = state.get("ram_used")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banked_rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0; banks * BANK_SIZE];
        for bank in 0..banks {
            rom[bank * BANK_SIZE..(bank + 1) * BANK_SIZE].fill(bank as u8);
        }
        rom
    }

    #[test]
    fn test_power_on_banks() {
        let cart = Sega::new(banked_rom(8));
        assert_eq!(cart.read(0x0500).unwrap(), 0);
        assert_eq!(cart.read(0x4000).unwrap(), 1);
        assert_eq!(cart.read(0x8000).unwrap(), 2);
    }

    #[test]
    fn test_slot_switching_keeps_first_kilobyte() {
        let mut cart = Sega::new(banked_rom(8));
        cart.write(0xFFFD, 5).unwrap();
        cart.write(0xFFFE, 6).unwrap();
        cart.write(0xFFFF, 7).unwrap();
        assert_eq!(cart.read(0x0000).unwrap(), 0);
        assert_eq!(cart.read(0x03FF).unwrap(), 0);
        assert_eq!(cart.read(0x0400).unwrap(), 5);
        assert_eq!(cart.read(0x4000).unwrap(), 6);
        assert_eq!(cart.read(0xBFFF).unwrap(), 7);
    }

    #[test]
    fn test_bank_numbers_masked() {
        let mut cart = Sega::new(banked_rom(8));
        cart.write(0xFFFF, 0x0B).unwrap();
        assert_eq!(cart.read(0x8000).unwrap(), 3);
    }

    #[test]
    fn test_cartridge_ram_banks() {
        let mut cart = Sega::new(banked_rom(8));
        cart.write(0x8000, 0x55).unwrap();
        assert_eq!(cart.read(0x8000).unwrap(), 2);
        assert!(!cart.is_ram_save_needed());

        cart.write(0xFFFC, 0x08).unwrap();
        cart.write(0x8000, 0x55).unwrap();
        assert_eq!(cart.read(0x8000).unwrap(), 0x55);

        cart.write(0xFFFC, 0x0C).unwrap();
        assert_eq!(cart.read(0x8000).unwrap(), 0x00);
        cart.write(0x8000, 0x66).unwrap();
        assert_eq!(cart.ram_data()[BANK_SIZE], 0x66);
        assert!(cart.is_ram_save_needed());
    }

    #[test]
    fn test_enabling_ram_marks_it_for_saving() {
        let mut cart = Sega::new(banked_rom(8));
        cart.write(0xFFFC, 0x04).unwrap();
        assert!(!cart.is_ram_save_needed());
        cart.write(0xFFFC, 0x08).unwrap();
        assert!(cart.is_ram_save_needed());
        cart.write(0xFFFC, 0x00).unwrap();
        assert!(cart.is_ram_save_needed());
    }

    #[test]
    fn test_state_roundtrip() {
        let mut cart = Sega::new(banked_rom(8));
        cart.write(0xFFFE, 4).unwrap();
        cart.write(0xFFFC, 0x08).unwrap();
        cart.write(0x9000, 0xAA).unwrap();
        let state = cart.capture_state();

        let mut other = Sega::new(banked_rom(8));
        other.restore_state(&state).unwrap();
        assert_eq!(other.read(0x4000).unwrap(), 4);
        assert_eq!(other.read(0x9000).unwrap(), 0xAA);
    }
}
