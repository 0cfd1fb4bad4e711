//! Serial port with nothing on the other end of the link cable.
//!
//! An internally clocked transfer shifts for 8 bits at 8192 Hz, then SB
//! reads 0xFF (no partner) and the serial interrupt fires. Outgoing bytes
//! are collected for the host; test ROMs print through this port.

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

const TRANSFER_CYCLES: u32 = 4096;
const START: u8 = 0x80;
const INTERNAL_CLOCK: u8 = 0x01;

pub struct Serial {
    data: u8,
    control: u8,
    remaining: u32,
    interrupt: bool,
    output: Vec<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            data: 0,
            control: 0,
            remaining: 0,
            interrupt: false,
            output: Vec::new(),
        }
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.data,
            0xFF02 => self.control | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.data = val,
            0xFF02 => {
                self.control = val & (START | INTERNAL_CLOCK);
                if val & START != 0 && val & INTERNAL_CLOCK != 0 {
                    self.output.push(self.data);
                    self.remaining = TRANSFER_CYCLES;
                    log(LogCategory::Stubs, LogLevel::Trace, || {
                        format!("Serial: sending {:02X}", self.data)
                    });
                }
            }
            _ => {}
        }
    }

    pub fn step(&mut self, cycles: u32) {
        if self.remaining == 0 {
            return;
        }
        self.remaining = self.remaining.saturating_sub(cycles);
        if self.remaining == 0 {
            self.data = 0xFF;
            self.control &= !START;
            self.interrupt = true;
        }
    }

    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt)
    }

    /// Bytes sent since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for Serial {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("data", self.data);
        state.put("control", self.control);
        state.put("remaining", self.remaining);
        state.put("interrupt", self.interrupt);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.data = state.get("data")?;
        self.control = state.get("control")?;
        self.remaining = state.get("remaining")?;
        self.interrupt = state.get("interrupt")?;
        Ok(())
    }
}
