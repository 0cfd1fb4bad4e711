use emu_core::cartridge::Cartridge;
use emu_core::{EmuError, StateMap, Stateful};

use super::{unsupported, BankedMemory, RAM_BANK_SIZE};

/// 32 KiB of ROM and 8 KiB of RAM that is always enabled.
///
/// The RAM window is backed even when the header declares none.
pub struct NoMapper {
    mem: BankedMemory,
}

impl NoMapper {
    pub fn new(rom: Vec<u8>, battery: bool) -> Self {
        let mut mem = BankedMemory::new(rom, RAM_BANK_SIZE, battery);
        mem.ram_touched = true;
        Self { mem }
    }
}

impl Cartridge for NoMapper {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        match addr {
            0x0000..=0x7FFF => Ok(self.mem.rom_byte(usize::from(addr >> 14), addr)),
            0xA000..=0xBFFF => Ok(self.mem.ram_byte(0, addr)),
            _ => Err(unsupported("rom-only cartridge", addr)),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x7FFF => Ok(()),
            0xA000..=0xBFFF => {
                self.mem.set_ram_byte(0, addr, val);
                Ok(())
            }
            _ => Err(unsupported("rom-only cartridge", addr)),
        }
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

impl Stateful for NoMapper {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        self.mem.capture(&mut state);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.mem.restore(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_rom() {
        let mut rom = vec![0; 0x8000];
        rom[0] = 0xAA;
        rom[0x4000] = 0xBB;
        rom[0x7FFF] = 0xCC;
        let mut cart = NoMapper::new(rom, false);
        assert_eq!(cart.read(0x0000).unwrap(), 0xAA);
        assert_eq!(cart.read(0x4000).unwrap(), 0xBB);
        assert_eq!(cart.read(0x7FFF).unwrap(), 0xCC);
        cart.write(0x2000, 5).unwrap();
        cart.write(0x0000, 5).unwrap();
        assert_eq!(cart.read(0x0000).unwrap(), 0xAA);
        assert_eq!(cart.read(0x4000).unwrap(), 0xBB);

        cart.write(0xA000, 0x42).unwrap();
        assert_eq!(cart.read(0xA000).unwrap(), 0x42);
        assert_eq!(cart.ram_data().len(), 0x2000);
        assert!(!cart.is_ram_save_needed());
    }

    #[test]
    fn test_plain_ram() {
        let mut cart = NoMapper::new(vec![0; 0x8000], true);
        cart.write(0xA123, 0x42).unwrap();
        assert_eq!(cart.read(0xA123).unwrap(), 0x42);
        assert!(cart.is_ram_save_needed());
    }
}
