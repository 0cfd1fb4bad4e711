//! MBC3: up to 2 MiB ROM, 32 KiB RAM and an optional real-time clock.
//!
//! - 0x0000-0x1FFF: RAM and clock enable
//! - 0x2000-0x3FFF: ROM bank, 7 bits (0 reads as 1)
//! - 0x4000-0x5FFF: RAM bank 0-3, or clock register 0x08-0x0C
//! - 0x6000-0x7FFF: clock latch (0x00 then 0x01)

use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::rtc::{Rtc, RTC_BLOCK_LEN};
use super::{unsupported, BankedMemory};

pub struct Mbc3 {
    mem: BankedMemory,
    rtc: Option<Rtc>,
    enabled: bool,
    rom_bank: u8,
    select: u8,
}

impl Mbc3 {
    pub fn new(rom: Vec<u8>, ram_size: usize, battery: bool, timer: bool) -> Self {
        Self {
            mem: BankedMemory::new(rom, ram_size, battery),
            rtc: timer.then(Rtc::new),
            enabled: false,
            rom_bank: 1,
            select: 0,
        }
    }

    pub fn has_rtc(&self) -> bool {
        self.rtc.is_some()
    }
}

impl Cartridge for Mbc3 {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        match addr {
            0x0000..=0x3FFF => Ok(self.mem.rom_byte(0, addr)),
            0x4000..=0x7FFF => Ok(self.mem.rom_byte(usize::from(self.rom_bank), addr)),
            0xA000..=0xBFFF if !self.enabled => Ok(0xFF),
            0xA000..=0xBFFF => Ok(match (self.select, &self.rtc) {
                (0x00..=0x03, _) => self.mem.ram_byte(usize::from(self.select), addr),
                (0x08..=0x0C, Some(rtc)) => rtc.read(self.select),
                _ => 0xFF,
            }),
            _ => Err(unsupported("mbc3", addr)),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x1FFF => self.enabled = self.mem.enable_ram(val),
            0x2000..=0x3FFF => {
                let bank = val & 0x7F;
                self.rom_bank = if bank == 0 { 1 } else { bank };
            }
            0x4000..=0x5FFF => self.select = val & 0x0F,
            0x6000..=0x7FFF => {
                if let Some(rtc) = &mut self.rtc {
                    rtc.write_latch(val);
                }
            }
            0xA000..=0xBFFF if self.enabled => match (self.select, &mut self.rtc) {
                (0x00..=0x03, _) => self.mem.set_ram_byte(usize::from(self.select), addr, val),
                (0x08..=0x0C, Some(rtc)) => {
                    log(LogCategory::Cartridge, LogLevel::Debug, || {
                        format!("MBC3: RTC register {:02X} <- {val:02X}", self.select)
                    });
                    rtc.write(self.select, val);
                }
                _ => {}
            },
            0xA000..=0xBFFF => {}
            _ => return Err(unsupported("mbc3", addr)),
        }
        Ok(())
    }

    fn load_rom(&mut self, data: &[u8]) {
        self.mem.load_rom(data);
    }

    /// Accepts a bare RAM dump or one followed by the clock block.
    fn load_ram(&mut self, data: &[u8]) {
        self.mem.load_ram(data);
        let ram_len = self.mem.ram.len();
        if let (Some(rtc), Some(block)) = (&mut self.rtc, data.get(ram_len..)) {
            if !block.is_empty() && !rtc.load_block(block) {
                log(LogCategory::Cartridge, LogLevel::Warn, || {
                    format!("MBC3: ignoring {}-byte clock block", block.len())
                });
            }
        }
    }

    fn rom_data(&self) -> &[u8] {
        &self.mem.rom
    }

    fn ram_data(&self) -> &[u8] {
        &self.mem.ram
    }

    fn save_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.mem.ram.len() + RTC_BLOCK_LEN);
        data.extend_from_slice(&self.mem.ram);
        if let Some(rtc) = &self.rtc {
            data.extend_from_slice(&rtc.to_block());
        }
        data
    }

    fn is_ram_save_needed(&self) -> bool {
        self.mem.save_needed() || (self.rtc.is_some() && self.mem.battery)
    }

    fn step(&mut self, cycles: u32) {
        if let Some(rtc) = &mut self.rtc {
            rtc.step(cycles);
        }
    }
}

impl Stateful for Mbc3 {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        self.mem.capture(&mut state);
        state.put("enabled", self.enabled);
        state.put("rom_bank", self.rom_bank);
        state.put("select", self.select);
        if let Some(rtc) = &self.rtc {
            state.insert_scope("rtc", rtc.capture_state());
        }
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.mem.restore(state)?;
        self.enabled = state.get("enabled")?;
        self.rom_bank = state.get("rom_bank")?;
        self.select = state.get("select")?;
        if let Some(rtc) = &mut self.rtc {
            rtc.restore_state(&state.scope("rtc"))?;
        }
        Ok(())
    }
}
