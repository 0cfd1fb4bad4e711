use emu_core::cartridge::{bank_mask, copy_clamped, mirrored_read, Cartridge};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{check_read, check_write};

/// Korean board: slots 0 and 1 fixed, slot 2 selected by writes to 0xA000.
pub struct Korean {
    rom: Vec<u8>,
    bank: u8,
    mask: usize,
}

impl Korean {
    pub fn new(rom: Vec<u8>) -> Self {
        let mask = bank_mask(rom.len(), 14);
        Self { rom, bank: 2, mask }
    }
}

impl Cartridge for Korean {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        check_read("korean mapper", addr)?;
        let offset = if addr < 0x8000 {
            usize::from(addr)
        } else {
            (usize::from(self.bank) & self.mask) * 0x4000 + (usize::from(addr) & 0x3FFF)
        };
        Ok(mirrored_read(&self.rom, offset))
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        check_write("korean mapper", addr)?;
        if addr == 0xA000 {
            log(LogCategory::Cartridge, LogLevel::Debug, || {
                format!("Korean mapper: bank {val:02X}")
            });
            self.bank = val;
        }
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

impl Stateful for Korean {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("bank", self.bank);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.bank = state.get("bank")?;
        Ok(())
    }
}

/// Korean MSX-style board with four 8 KiB windows. Registers 0-3 live at
/// 0x0000-0x0003 and map 0x8000, 0xA000, 0x4000 and 0x6000 in that order;
/// 0x0000-0x3FFF stays fixed.
pub struct KoreanMsx8k {
    rom: Vec<u8>,
    registers: [u8; 4],
    mask: usize,
}

impl KoreanMsx8k {
    pub fn new(rom: Vec<u8>) -> Self {
        let mask = bank_mask(rom.len(), 13);
        Self {
            rom,
            registers: [0; 4],
            mask,
        }
    }

    fn register_for(addr: u16) -> usize {
        match addr {
            0x4000..=0x5FFF => 2,
            0x6000..=0x7FFF => 3,
            0x8000..=0x9FFF => 0,
            _ => 1,
        }
    }
}

impl Cartridge for KoreanMsx8k {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        check_read("korean msx mapper", addr)?;
        let offset = if addr < 0x4000 {
            usize::from(addr)
        } else {
            let bank = usize::from(self.registers[Self::register_for(addr)]) & self.mask;
            bank * 0x2000 + (usize::from(addr) & 0x1FFF)
        };
        Ok(mirrored_read(&self.rom, offset))
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        check_write("korean msx mapper", addr)?;
        if addr <= 0x0003 {
            log(LogCategory::Cartridge, LogLevel::Debug, || {
                format!("Korean MSX mapper: R{addr} <- {val:02X}")
            });
            self.registers[usize::from(addr)] = val;
        }
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

impl Stateful for KoreanMsx8k {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("registers", &self.registers[..]);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("registers", &mut self.registers)
    }
}
