//! MBC3 real-time clock, advanced by emulated cycles.
//!
//! Registers 0x08-0x0C (seconds, minutes, hours, day low, day high/flags)
//! are read through a latch copied on a 0x00 then 0x01 write sequence.
//! Persisted as the common 48-byte block: five live registers and five
//! latched registers as little-endian u32, then a u64 UNIX timestamp.

use std::time::{SystemTime, UNIX_EPOCH};

use emu_core::{EmuError, StateMap, Stateful};

pub const RTC_BLOCK_LEN: usize = 0x30;

const CYCLES_PER_SECOND: u32 = 4_194_304;

const DAY_HIGH: u8 = 0x01;
const HALT: u8 = 0x40;
const CARRY: u8 = 0x80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl Counters {
    fn registers(&self) -> [u8; 5] {
        let mut high = ((self.days >> 8) as u8) & DAY_HIGH;
        if self.halt {
            high |= HALT;
        }
        if self.carry {
            high |= CARRY;
        }
        [
            self.seconds,
            self.minutes,
            self.hours,
            self.days as u8,
            high,
        ]
    }

    fn set(&mut self, reg: u8, val: u8) {
        match reg {
            0x08 => self.seconds = val & 0x3F,
            0x09 => self.minutes = val & 0x3F,
            0x0A => self.hours = val & 0x1F,
            0x0B => self.days = (self.days & 0x100) | u16::from(val),
            0x0C => {
                self.days = (self.days & 0xFF) | (u16::from(val & DAY_HIGH) << 8);
                self.halt = val & HALT != 0;
                self.carry = val & CARRY != 0;
            }
            _ => {}
        }
    }

    fn from_registers(regs: [u8; 5]) -> Self {
        let mut counters = Counters::default();
        for (reg, val) in (0x08u8..).zip(regs) {
            counters.set(reg, val);
        }
        counters
    }

    /// Out-of-range values count up to their bit width and wrap to zero
    /// without carrying, as the real counters do.
    fn tick_second(&mut self) {
        self.seconds = (self.seconds + 1) & 0x3F;
        if self.seconds != 60 {
            return;
        }
        self.seconds = 0;
        self.minutes = (self.minutes + 1) & 0x3F;
        if self.minutes != 60 {
            return;
        }
        self.minutes = 0;
        self.hours = (self.hours + 1) & 0x1F;
        if self.hours != 24 {
            return;
        }
        self.hours = 0;
        self.days += 1;
        if self.days > 0x1FF {
            self.days = 0;
            self.carry = true;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Rtc {
    live: Counters,
    latched: Counters,
    subsecond: u32,
    latch_armed: bool,
}

impl Rtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, cycles: u32) {
        if self.live.halt {
            return;
        }
        self.subsecond += cycles;
        while self.subsecond >= CYCLES_PER_SECOND {
            self.subsecond -= CYCLES_PER_SECOND;
            self.live.tick_second();
        }
    }

    /// 0x6000-0x7FFF write.
    pub fn write_latch(&mut self, val: u8) {
        if self.latch_armed && val == 0x01 {
            self.latched = self.live;
        }
        self.latch_armed = val == 0x00;
    }

    pub fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08..=0x0C => self.latched.registers()[usize::from(reg - 0x08)],
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, val: u8) {
        if reg == 0x08 {
            self.subsecond = 0;
        }
        self.live.set(reg, val);
    }

    pub fn to_block(&self) -> [u8; RTC_BLOCK_LEN] {
        let mut block = [0u8; RTC_BLOCK_LEN];
        let words = self.live.registers().into_iter().chain(self.latched.registers());
        for (chunk, word) in block.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&u32::from(word).to_le_bytes());
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        block[40..48].copy_from_slice(&now.to_le_bytes());
        block
    }

    /// Restore from a persisted block. The timestamp is ignored: the clock
    /// only advances while the machine runs.
    pub fn load_block(&mut self, block: &[u8]) -> bool {
        if block.len() < 40 {
            return false;
        }
        // Each register sits in the low byte of its word.
        let bytes: Vec<u8> = block[..40].chunks_exact(4).map(|word| word[0]).collect();
        self.live = Counters::from_registers(std::array::from_fn(|i| bytes[i]));
        self.latched = Counters::from_registers(std::array::from_fn(|i| bytes[5 + i]));
        self.subsecond = 0;
        true
    }
}

impl Stateful for Rtc {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("live", &self.live.registers()[..]);
        state.put("latched", &self.latched.registers()[..]);
        state.put("subsecond", self.subsecond);
        state.put("latch_armed", self.latch_armed);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let mut live = [0u8; 5];
        let mut latched = [0u8; 5];
        state.get_bytes_into("live", &mut live)?;
        state.get_bytes_into("latched", &mut latched)?;
        self.live = Counters::from_registers(live);
        self.latched = Counters::from_registers(latched);
        self.subsecond = state.get("subsecond")?;
        self.latch_armed = state.get("latch_armed")?;
        Ok(())
    }
}
