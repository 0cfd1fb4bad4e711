use emu_core::cartridge::{bank_mask, copy_clamped, mirrored_read, Cartridge};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{check_read, check_write};

const BANK_SIZE: usize = 0x2000;

/// Janggun board: four 8 KiB windows over 0x4000-0xBFFF. Each window is
/// set directly by a write to its first address, or in pairs by 0xFFFE
/// (0x4000-0x7FFF) and 0xFFFF (0x8000-0xBFFF). Bit 6 of the written value
/// makes the window return every byte bit-reversed.
pub struct Janggun {
    rom: Vec<u8>,
    banks: [u8; 4],
    reversed: [bool; 4],
    mask: usize,
}

impl Janggun {
    pub fn new(rom: Vec<u8>) -> Self {
        let mask = bank_mask(rom.len(), 13);
        Self {
            rom,
            banks: [2, 3, 4, 5],
            reversed: [false; 4],
            mask,
        }
    }

    fn set_window(&mut self, window: usize, bank: u8, reversed: bool) {
        self.banks[window] = bank;
        self.reversed[window] = reversed;
    }
}

impl Cartridge for Janggun {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        check_read("janggun mapper", addr)?;
        if addr < 0x4000 {
            return Ok(mirrored_read(&self.rom, usize::from(addr)));
        }
        let window = usize::from((addr - 0x4000) >> 13);
        let bank = usize::from(self.banks[window]) & self.mask;
        let byte = mirrored_read(&self.rom, bank * BANK_SIZE + (usize::from(addr) & 0x1FFF));
        Ok(if self.reversed[window] {
            byte.reverse_bits()
        } else {
            byte
        })
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        check_write("janggun mapper", addr)?;
        let bank = val & 0x3F;
        let reversed = val & 0x40 != 0;
        match addr {
            0x4000 | 0x6000 | 0x8000 | 0xA000 => {
                self.set_window(usize::from((addr - 0x4000) >> 13), bank, reversed);
            }
            0xFFFE | 0xFFFF => {
                let first = if addr == 0xFFFE { 0 } else { 2 };
                self.set_window(first, bank * 2, reversed);
                self.set_window(first + 1, bank * 2 + 1, reversed);
            }
            _ => return Ok(()),
        }
        log(LogCategory::Cartridge, LogLevel::Debug, || {
            format!("Janggun mapper: {addr:04X} <- {val:02X}")
        });
        Ok(())
    }

    fn load_rom(&mut self, data: &[u8]) {
        copy_clamped(&mut self.rom, data);
    }

    fn load_ram(&mut self, _data: &[u8]) {}

    fn rom_data(&self) -> &[u8] {
        &self.rom
    }

    fn ram_data(&self) -> &[u8] {
        &[]
    }

    fn is_ram_save_needed(&self) -> bool {
        false
    }
}

impl Stateful for Janggun {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("banks", &self.banks[..]);
        state.put("reversed", self.reversed.to_vec());
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let reversed: Vec<bool> = state.get("reversed")?;
        let reversed: [bool; 4] = reversed
            .try_into()
            .map_err(|_| EmuError::State("janggun reverse flags must have 4 entries".into()))?;
        state.get_bytes_into("banks", &mut self.banks)?;
        self.reversed = reversed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom() -> Vec<u8> {
        (0..BANK_SIZE * 32).map(|i| (i / BANK_SIZE) as u8).collect()
    }

    #[test]
    fn test_eight_kilobyte_windows() {
        let mut cart = Janggun::new(rom());
        assert_eq!(cart.read(0x4000).unwrap(), 2);
        assert_eq!(cart.read(0xA000).unwrap(), 5);
        cart.write(0x6000, 9).unwrap();
        assert_eq!(cart.read(0x6000).unwrap(), 9);
        assert_eq!(cart.read(0x7FFF).unwrap(), 9);
    }

    #[test]
    fn test_sixteen_kilobyte_pairs() {
        let mut cart = Janggun::new(rom());
        cart.write(0xFFFF, 3).unwrap();
        assert_eq!(cart.read(0x8000).unwrap(), 6);
        assert_eq!(cart.read(0xA000).unwrap(), 7);
        assert_eq!(cart.read(0x4000).unwrap(), 2);
    }

    #[test]
    fn test_bit_reversal() {
        let mut cart = Janggun::new(rom());
        // Bank 1 is filled with 0x01, which reverses to 0x80.
        cart.write(0x4000, 0x41).unwrap();
        assert_eq!(cart.read(0x4000).unwrap(), 0x80);
        cart.write(0xFFFE, 0x40).unwrap();
        assert_eq!(cart.read(0x6000).unwrap(), 0x80);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut cart = Janggun::new(rom());
        cart.write(0x8000, 0x4A).unwrap();
        let state = cart.capture_state();
        let mut other = Janggun::new(rom());
        other.restore_state(&state).unwrap();
        assert_eq!(other.read(0x8000).unwrap(), 0x0Au8.reverse_bits());
    }
}
