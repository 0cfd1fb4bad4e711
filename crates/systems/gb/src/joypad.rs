//! Joypad matrix at 0xFF00.
//!
//! Bit 4 low selects the direction keys, bit 5 low the action buttons; the
//! low nibble reads the selected keys active low.

use emu_core::{EmuError, StateMap, Stateful};

/// Button bits, active high as passed to `GbMachine::set_buttons`.
pub mod buttons {
    pub const RIGHT: u8 = 0x01;
    pub const LEFT: u8 = 0x02;
    pub const UP: u8 = 0x04;
    pub const DOWN: u8 = 0x08;
    pub const A: u8 = 0x10;
    pub const B: u8 = 0x20;
    pub const SELECT: u8 = 0x40;
    pub const START: u8 = 0x80;
}

const SELECT_DIRECTIONS: u8 = 0x10;
const SELECT_ACTIONS: u8 = 0x20;

pub struct Joypad {
    select: u8,
    pressed: u8,
    interrupt: bool,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: SELECT_DIRECTIONS | SELECT_ACTIONS,
            pressed: 0,
            interrupt: false,
        }
    }

    pub fn read(&self) -> u8 {
        let mut lines = 0x0F;
        if self.select & SELECT_DIRECTIONS == 0 {
            lines &= !self.pressed & 0x0F;
        }
        if self.select & SELECT_ACTIONS == 0 {
            lines &= !(self.pressed >> 4) & 0x0F;
        }
        0xC0 | self.select | lines
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & (SELECT_DIRECTIONS | SELECT_ACTIONS);
    }

    /// Any newly pressed button requests the joypad interrupt.
    pub fn set_pressed(&mut self, pressed: u8) {
        if pressed & !self.pressed != 0 {
            self.interrupt = true;
        }
        self.pressed = pressed;
    }

    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt)
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

// Held buttons are host input and stay out of the state.
impl Stateful for Joypad {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("select", self.select);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.select = state.get::<u8>("select")? & (SELECT_DIRECTIONS | SELECT_ACTIONS);
        Ok(())
    }
}
