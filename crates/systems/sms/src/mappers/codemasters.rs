use emu_core::cartridge::{bank_mask, copy_clamped, mirrored_read, Cartridge};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{check_read, check_write};

const BANK_SIZE: usize = 0x4000;
const RAM_SIZE: usize = 0x2000;

/// Codemasters board: one bank register at the start of each slot. Bit 7
/// of the slot 1 register maps 8 KiB of RAM over 0xA000-0xBFFF.
pub struct Codemasters {
    rom: Vec<u8>,
    ram: Vec<u8>,
    banks: [u8; 3],
    mask: usize,
    ram_used: bool,
}

impl Codemasters {
    pub fn new(rom: Vec<u8>) -> Self {
        let mask = bank_mask(rom.len(), 14);
        Self {
            rom,
            ram: vec![0; RAM_SIZE],
            banks: [0, 1, 0],
            mask,
            ram_used: false,
        }
    }

    fn ram_enabled(&self) -> bool {
        self.banks[1] & 0x80 != 0
    }
}

impl Cartridge for Codemasters {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        check_read("codemasters mapper", addr)?;
        if addr >= 0xA000 && self.ram_enabled() {
            return Ok(self.ram[usize::from(addr) & (RAM_SIZE - 1)]);
        }
        let slot = usize::from(addr >> 14);
        let bank = usize::from(self.banks[slot] & 0x7F) & self.mask;
        Ok(mirrored_read(
            &self.rom,
            bank * BANK_SIZE + (usize::from(addr) & 0x3FFF),
        ))
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        check_write("codemasters mapper", addr)?;
        match addr {
            0x0000 | 0x4000 | 0x8000 => {
                log(LogCategory::Cartridge, LogLevel::Debug, || {
                    format!("Codemasters mapper: {addr:04X} <- {val:02X}")
                });
                self.banks[usize::from(addr >> 14)] = val;
                if self.ram_enabled() {
                    self.ram_used = true;
                }
            }
            0xA000..=0xBFFF if self.ram_enabled() => {
                self.ram[usize::from(addr) & (RAM_SIZE - 1)] = val;
                self.ram_used = true;
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

impl Stateful for Codemasters {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("banks", &self.banks[..]);
        state.put("ram", self.ram.as_slice());
        state.put("ram_used", self.ram_used);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("banks", &mut self.banks)?;
        state.get_bytes_into("ram", &mut self.ram)?;
        self.ram_used = state.get("ram_used")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banked_rom(banks: usize) -> Vec<u8> {
        (0..banks * BANK_SIZE).map(|i| (i / BANK_SIZE) as u8).collect()
    }

    #[test]
    fn test_slot_registers() {
        let mut cart = Codemasters::new(banked_rom(16));
        assert_eq!(cart.read(0x4000).unwrap(), 1);
        cart.write(0x0000, 3).unwrap();
        cart.write(0x4000, 4).unwrap();
        cart.write(0x8000, 5).unwrap();
        assert_eq!(cart.read(0x0000).unwrap(), 3);
        assert_eq!(cart.read(0x4000).unwrap(), 4);
        assert_eq!(cart.read(0xBFFF).unwrap(), 5);
        // Writes elsewhere in ROM space do nothing.
        cart.write(0x8001, 9).unwrap();
        assert_eq!(cart.read(0x8000).unwrap(), 5);
    }

    #[test]
    fn test_ram_window() {
        let mut cart = Codemasters::new(banked_rom(16));
        cart.write(0xA000, 0x42).unwrap();
        assert_eq!(cart.read(0xA000).unwrap(), 0);

        cart.write(0x4000, 0x81).unwrap();
        assert_eq!(cart.read(0x4000).unwrap(), 1);
        cart.write(0xA000, 0x42).unwrap();
        assert_eq!(cart.read(0xA000).unwrap(), 0x42);
        assert_eq!(cart.read(0x8000).unwrap(), 0);
        assert!(cart.is_ram_save_needed());
    }

    #[test]
    fn test_enabling_ram_marks_it_for_saving() {
        let mut cart = Codemasters::new(banked_rom(16));
        cart.write(0x4000, 0x02).unwrap();
        assert!(!cart.is_ram_save_needed());
        cart.write(0x4000, 0x82).unwrap();
        assert!(cart.is_ram_save_needed());
    }

    #[test]
    fn test_state_roundtrip() {
        let mut cart = Codemasters::new(banked_rom(16));
        cart.write(0x0000, 7).unwrap();
        cart.write(0x4000, 0x83).unwrap();
        cart.write(0x8000, 9).unwrap();
        cart.write(0xA010, 0x5C).unwrap();
        let state = cart.capture_state();

        let mut other = Codemasters::new(banked_rom(16));
        other.restore_state(&state).unwrap();
        assert_eq!(other.read(0x0000).unwrap(), 7);
        assert_eq!(other.read(0x4000).unwrap(), 3);
        assert_eq!(other.read(0x8000).unwrap(), 9);
        assert_eq!(other.read(0xA010).unwrap(), 0x5C);
        assert!(other.is_ram_save_needed());
        assert_eq!(other.capture_state(), state);
    }
}
