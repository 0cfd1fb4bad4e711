//! Divider and programmable timer.
//!
//! # Registers
//!
//! - `$FF04 (DIV)`: upper byte of a free-running 16-bit counter; any write
//!   clears the whole counter
//! - `$FF05 (TIMA)`: counter, reloaded from TMA on overflow with an interrupt
//! - `$FF06 (TMA)`: reload value
//! - `$FF07 (TAC)`: bit 2 enables, bits 0-1 pick the divider bit to follow
//!
//! # Timing
//!
//! TIMA counts falling edges of `enable AND divider[bit]`, where bit is 9, 3,
//! 5 or 7 for TAC select 0-3 (4096, 262144, 65536 and 16384 Hz). Clearing
//! DIV or rewriting TAC while the selected bit is high is a falling edge too
//! and adds an increment. The reload happens on the overflowing cycle.

use emu_core::{EmuError, StateMap, Stateful};

const TAC_ENABLE: u8 = 0x04;

pub struct Timer {
    divider: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    interrupt: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            divider: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            interrupt: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn signal(&self) -> bool {
        if self.tac & TAC_ENABLE == 0 {
            return false;
        }
        let bit = match self.tac & 0x03 {
            0 => 9,
            1 => 3,
            2 => 5,
            _ => 7,
        };
        self.divider & (1 << bit) != 0
    }

    fn increment(&mut self) {
        let (tima, overflow) = self.tima.overflowing_add(1);
        if overflow {
            self.tima = self.tma;
            self.interrupt = true;
        } else {
            self.tima = tima;
        }
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.divider >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        let before = self.signal();
        match addr {
            0xFF04 => self.divider = 0,
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val & 0x07,
            _ => return,
        }
        if before && !self.signal() {
            self.increment();
        }
    }

    /// Advance by `cycles` clocks.
    pub fn step(&mut self, cycles: u32) {
        for _ in 0..cycles {
            let before = self.signal();
            self.divider = self.divider.wrapping_add(1);
            if before && !self.signal() {
                self.increment();
            }
        }
    }

    /// True once after TIMA overflowed.
    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for Timer {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("divider", self.divider);
        state.put("tima", self.tima);
        state.put("tma", self.tma);
        state.put("tac", self.tac);
        state.put("interrupt", self.interrupt);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.divider = state.get("divider")?;
        self.tima = state.get("tima")?;
        self.tma = state.get("tma")?;
        self.tac = state.get::<u8>("tac")? & 0x07;
        self.interrupt = state.get("interrupt")?;
        Ok(())
    }
}
