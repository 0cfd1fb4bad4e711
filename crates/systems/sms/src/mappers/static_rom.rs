use emu_core::cartridge::{copy_clamped, mirrored_read, Cartridge};
use emu_core::{EmuError, StateMap, Stateful};

use super::{check_read, check_write};

const RAM_SIZE: usize = 0x2000;

/// Unpaged board: up to 48 KiB of ROM, optionally 8 KiB of RAM at 0x8000.
pub struct StaticRom {
    rom: Vec<u8>,
    ram: Vec<u8>,
    ram_used: bool,
}

impl StaticRom {
    pub fn new(rom: Vec<u8>, with_ram: bool) -> Self {
        Self {
            rom,
            ram: if with_ram { vec![0; RAM_SIZE] } else { Vec::new() },
            ram_used: false,
        }
    }

    pub fn has_ram(&self) -> bool {
        !self.ram.is_empty()
    }
}

impl Cartridge for StaticRom {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        check_read("static rom", addr)?;
        if addr >= 0x8000 && self.has_ram() {
            return Ok(self.ram[usize::from(addr) & (RAM_SIZE - 1)]);
        }
        Ok(mirrored_read(&self.rom, usize::from(addr)))
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        check_write("static rom", addr)?;
        if (0x8000..0xC000).contains(&addr) && self.has_ram() {
            self.ram[usize::from(addr) & (RAM_SIZE - 1)] = val;
            self.ram_used = true;
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

impl Stateful for StaticRom {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("ram", self.ram.as_slice());
        state.put("ram_used", self.ram_used);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("ram", &mut self.ram)?;
        self.ram_used = state.get("ram_used")?;
        Ok(())
    }
}
