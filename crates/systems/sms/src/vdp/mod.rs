//! Sega/TMS Video Display Processor.
//!
//! One model covers the whole family: the TMS9918A of the SG-1000, the
//! Master System 315-5124/315-5246 with Mode 4, and the Game Gear 315-5378
//! with its 12-bit CRAM and 160×144 window.
//!
//! # Ports
//! - data port: VRAM/CRAM access through a 14-bit auto-incrementing address
//!   with a one-byte read-ahead buffer
//! - control port: two-byte latch (address low, then address high + code);
//!   reading it returns the status byte and clears the pending flags
//! - V/H counters
//!
//! # Timing
//! The chip is clocked in CPU cycles. Every completed scanline is rendered
//! (if visible), updates the interrupt state and prefetches sprites for the
//! next line. [`Vdp::step`] reports when the frame wraps around.

mod palette;
mod render;
mod timing;

pub use palette::{gg_color, sms_color, tms_color, Rgb};
pub use render::ScreenUsage;
pub use timing::{
    horizontal_phase, HorizontalPhase, ScanlineLayout, VerticalPhase, DOTS_PER_LINE,
    LEFT_BORDER_WIDTH, OUTPUT_WIDTH,
};

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::{Frame, Viewport};
use emu_core::{EmuError, Region, StateMap, Stateful};
use serde::{Deserialize, Serialize};

const VRAM_SIZE: usize = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VdpVariant {
    Tms9918a,
    Sms1,
    Sms2,
    GameGear,
}

impl VdpVariant {
    pub fn has_mode4(self) -> bool {
        self != VdpVariant::Tms9918a
    }

    /// 224 and 240 line modes.
    pub fn has_extended_heights(self) -> bool {
        matches!(self, VdpVariant::Sms2 | VdpVariant::GameGear)
    }

    fn cram_size(self) -> usize {
        match self {
            VdpVariant::Tms9918a => 0,
            VdpVariant::Sms1 | VdpVariant::Sms2 => 32,
            VdpVariant::GameGear => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    GraphicsI,
    GraphicsII,
    Multicolor,
    Text,
    Mode4,
}

pub struct Vdp {
    variant: VdpVariant,
    region: Region,
    cycles_per_line: u32,

    vram: Vec<u8>,
    cram: Vec<u8>,
    registers: [u8; 16],

    address: u16,
    code: u8,
    latch_pending: bool,
    read_buffer: u8,
    cram_latch: u8,

    frame_pending: bool,
    line_pending: bool,
    overflow: bool,
    collision: bool,
    fifth_sprite: u8,
    line_counter: u8,

    scanline: u16,
    line_cycles: u32,
    h_counter: u8,
    vscroll_latch: u8,
    layout: ScanlineLayout,
    line_sprites: Vec<u8>,
    remove_sprite_limit: bool,

    framebuffer: Frame,
    completed: Option<Frame>,
    viewport_changed: bool,
}

impl Vdp {
    pub fn new(variant: VdpVariant, region: Region, cycles_per_line: u32) -> Self {
        let layout = ScanlineLayout::new(region, 192);
        Self {
            variant,
            region,
            cycles_per_line,
            vram: vec![0; VRAM_SIZE],
            cram: vec![0; variant.cram_size()],
            registers: [0; 16],
            address: 0,
            code: 0,
            latch_pending: false,
            read_buffer: 0,
            cram_latch: 0,
            frame_pending: false,
            line_pending: false,
            overflow: false,
            collision: false,
            fifth_sprite: 0,
            line_counter: 0,
            scanline: 0,
            line_cycles: 0,
            h_counter: 0,
            vscroll_latch: 0,
            layout,
            line_sprites: Vec::with_capacity(64),
            remove_sprite_limit: false,
            framebuffer: Frame::new(OUTPUT_WIDTH, u32::from(layout.visible_lines())),
            completed: None,
            viewport_changed: true,
        }
    }

    pub fn reset(&mut self) {
        let remove_sprite_limit = self.remove_sprite_limit;
        *self = Self::new(self.variant, self.region, self.cycles_per_line);
        self.remove_sprite_limit = remove_sprite_limit;
    }

    pub fn variant(&self) -> VdpVariant {
        self.variant
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Switch video standard. Takes effect from the next frame.
    pub fn set_timing(&mut self, region: Region, cycles_per_line: u32) {
        self.region = region;
        self.cycles_per_line = cycles_per_line;
    }

    pub fn set_remove_sprite_limit(&mut self, remove: bool) {
        self.remove_sprite_limit = remove;
    }

    pub fn layout(&self) -> &ScanlineLayout {
        &self.layout
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn cram(&self) -> &[u8] {
        &self.cram
    }

    pub fn register(&self, index: usize) -> u8 {
        self.registers[index & 0x0F]
    }

    pub fn display_mode(&self) -> DisplayMode {
        if self.variant.has_mode4() && self.registers[0] & 0x04 != 0 {
            DisplayMode::Mode4
        } else if self.registers[1] & 0x10 != 0 {
            DisplayMode::Text
        } else if self.registers[1] & 0x08 != 0 {
            DisplayMode::Multicolor
        } else if self.registers[0] & 0x02 != 0 {
            DisplayMode::GraphicsII
        } else {
            DisplayMode::GraphicsI
        }
    }

    /// Active line count selected by the mode bits.
    pub fn requested_active_lines(&self) -> u16 {
        let extended = self.display_mode() == DisplayMode::Mode4
            && self.variant.has_extended_heights()
            && self.registers[0] & 0x02 != 0;
        match (extended, self.registers[1] & 0x18) {
            (true, 0x10) => 224,
            (true, 0x08) => 240,
            _ => 192,
        }
    }

    // ---- ports -------------------------------------------------------------

    pub fn write_control(&mut self, data: u8) {
        if !self.latch_pending {
            self.address = (self.address & 0x3F00) | u16::from(data);
            self.latch_pending = true;
            return;
        }
        self.latch_pending = false;
        self.address = (self.address & 0x00FF) | (u16::from(data & 0x3F) << 8);
        self.code = data >> 6;

        match self.code {
            0 => {
                self.read_buffer = self.vram[usize::from(self.address)];
                self.advance_address();
            }
            2 => self.write_register(data & 0x0F, self.address as u8),
            3 if !self.variant.has_mode4() => self.write_register(data & 0x07, self.address as u8),
            _ => {}
        }
    }

    fn write_register(&mut self, index: u8, value: u8) {
        let limit = if self.variant.has_mode4() { 11 } else { 8 };
        let index = if self.variant.has_mode4() {
            index
        } else {
            index & 0x07
        };
        if index >= limit {
            return;
        }
        log(LogCategory::Video, LogLevel::Trace, || {
            format!("VDP: R{index} <- {value:02X}")
        });
        self.registers[usize::from(index)] = value;
    }

    fn advance_address(&mut self) {
        self.address = (self.address + 1) & 0x3FFF;
    }

    pub fn write_data(&mut self, data: u8) {
        self.latch_pending = false;
        self.read_buffer = data;
        if self.code == 3 && !self.cram.is_empty() {
            self.write_cram(data);
        } else {
            self.vram[usize::from(self.address)] = data;
        }
        self.advance_address();
    }

    fn write_cram(&mut self, data: u8) {
        if self.variant == VdpVariant::GameGear {
            // Even byte latches, odd byte commits the whole word.
            let index = usize::from(self.address) & 0x3F;
            if index & 1 == 0 {
                self.cram_latch = data;
            } else {
                self.cram[index - 1] = self.cram_latch;
                self.cram[index] = data & 0x0F;
            }
        } else {
            self.cram[usize::from(self.address) & 0x1F] = data;
        }
    }

    pub fn read_data(&mut self) -> u8 {
        self.latch_pending = false;
        let value = self.read_buffer;
        self.read_buffer = self.vram[usize::from(self.address)];
        self.advance_address();
        value
    }

    /// Status byte: F (frame), 5S (overflow), C (collision), fifth sprite
    /// number. Reading clears the flags and the control latch.
    pub fn read_status(&mut self) -> u8 {
        let mut status = self.fifth_sprite & 0x1F;
        if self.frame_pending {
            status |= 0x80;
        }
        if self.overflow {
            status |= 0x40;
        }
        if self.collision {
            status |= 0x20;
        }
        self.frame_pending = false;
        self.line_pending = false;
        self.overflow = false;
        self.collision = false;
        self.latch_pending = false;
        status
    }

    pub fn v_counter(&self) -> u8 {
        self.layout.v_counter(self.scanline)
    }

    pub fn h_counter(&self) -> u8 {
        self.h_counter
    }

    /// Latch the H counter from the current beam position (TH line edge).
    pub fn latch_h_counter(&mut self) {
        let dot = timing::dot_for_cycles(self.line_cycles, self.cycles_per_line);
        self.h_counter = timing::h_counter_for_dot(dot);
    }

    pub fn frame_interrupt_pending(&self) -> bool {
        self.frame_pending
    }

    pub fn line_interrupt_pending(&self) -> bool {
        self.line_pending
    }

    pub fn irq_line(&self) -> bool {
        let frame = self.frame_pending && self.registers[1] & 0x20 != 0;
        let line =
            self.variant.has_mode4() && self.line_pending && self.registers[0] & 0x10 != 0;
        frame || line
    }

    // ---- timing ------------------------------------------------------------

    /// Advance by `cycles` CPU cycles. Returns true if a frame completed.
    pub fn step(&mut self, cycles: u32) -> bool {
        if self.cycles_per_line == 0 {
            return false;
        }
        self.line_cycles += cycles;
        let mut completed = false;
        while self.line_cycles >= self.cycles_per_line {
            self.line_cycles -= self.cycles_per_line;
            completed |= self.end_line();
        }
        completed
    }

    fn end_line(&mut self) -> bool {
        let line = self.scanline;
        if self.layout.phase(line).is_visible() {
            self.render_line(line);
        }

        let relative = self.layout.relative_line(line);
        let active = self.layout.active_lines();
        if relative + 1 == active {
            self.frame_pending = true;
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                "VDP: frame interrupt pending".to_string()
            });
        }
        if self.variant.has_mode4() {
            self.clock_line_counter(relative <= active);
        }

        let next = line + 1;
        if next >= self.layout.total() {
            self.scanline = 0;
            self.finish_frame();
            return true;
        }
        self.scanline = next;
        if self.layout.phase(next) == VerticalPhase::ActiveDisplay {
            self.select_sprites(self.layout.relative_line(next));
        }
        false
    }

    fn clock_line_counter(&mut self, counting: bool) {
        if !counting {
            self.line_counter = self.registers[10];
            return;
        }
        if self.line_counter == 0 {
            self.line_counter = self.registers[10];
            self.line_pending = true;
        } else {
            self.line_counter -= 1;
        }
    }

    fn finish_frame(&mut self) {
        let layout = ScanlineLayout::new(self.region, self.requested_active_lines());
        let fresh = if layout != self.layout {
            log(LogCategory::Video, LogLevel::Debug, || {
                format!(
                    "VDP: {} active lines, {} total",
                    layout.active_lines(),
                    layout.total()
                )
            });
            self.layout = layout;
            self.viewport_changed = true;
            Frame::new(OUTPUT_WIDTH, u32::from(layout.visible_lines()))
        } else {
            Frame::new(self.framebuffer.width, self.framebuffer.height)
        };
        self.completed = Some(std::mem::replace(&mut self.framebuffer, fresh));
        self.vscroll_latch = self.registers[9];
    }

    /// The last completed frame, handed out once.
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.completed.take()
    }

    /// Active picture rectangle inside the output buffer.
    pub fn viewport(&self) -> Viewport {
        let top = u32::from(self.layout.top_border());
        let active = u32::from(self.layout.active_lines());
        if self.variant == VdpVariant::GameGear {
            Viewport {
                x: LEFT_BORDER_WIDTH + 48,
                y: top + (active - 144) / 2,
                width: 160,
                height: 144,
            }
        } else {
            Viewport {
                x: LEFT_BORDER_WIDTH,
                y: top,
                width: 256,
                height: active,
            }
        }
    }

    /// True once after the viewport has moved or resized.
    pub fn take_viewport_change(&mut self) -> bool {
        std::mem::take(&mut self.viewport_changed)
    }

    fn cram_color(&self, index: u8) -> Rgb {
        let index = usize::from(index & 0x1F);
        match self.variant {
            VdpVariant::GameGear => {
                let word = u16::from(self.cram[index * 2]) | (u16::from(self.cram[index * 2 + 1]) << 8);
                gg_color(word)
            }
            VdpVariant::Tms9918a => tms_color(index as u8),
            _ => sms_color(self.cram[index]),
        }
    }
}

impl Stateful for Vdp {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("vram", self.vram.as_slice());
        state.put("cram", self.cram.as_slice());
        state.put("registers", &self.registers[..]);
        state.put("address", self.address);
        state.put("code", self.code);
        state.put("latch_pending", self.latch_pending);
        state.put("read_buffer", self.read_buffer);
        state.put("cram_latch", self.cram_latch);
        state.put("frame_pending", self.frame_pending);
        state.put("line_pending", self.line_pending);
        state.put("overflow", self.overflow);
        state.put("collision", self.collision);
        state.put("fifth_sprite", self.fifth_sprite);
        state.put("line_counter", self.line_counter);
        state.put("scanline", self.scanline);
        state.put("line_cycles", self.line_cycles);
        state.put("h_counter", self.h_counter);
        state.put("vscroll_latch", self.vscroll_latch);
        state.put("active_lines", self.layout.active_lines());
        state.put("line_sprites", self.line_sprites.as_slice());
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let active_lines: u16 = state.get("active_lines")?;
        let layout = ScanlineLayout::new(self.region, active_lines);
        let scanline: u16 = state.get("scanline")?;
        if scanline >= layout.total() {
            return Err(EmuError::State(format!(
                "VDP scanline {scanline} outside a {}-line frame",
                layout.total()
            )));
        }

        state.get_bytes_into("vram", &mut self.vram)?;
        state.get_bytes_into("cram", &mut self.cram)?;
        state.get_bytes_into("registers", &mut self.registers)?;
        self.address = state.get::<u16>("address")? & 0x3FFF;
        self.code = state.get("code")?;
        self.latch_pending = state.get("latch_pending")?;
        self.read_buffer = state.get("read_buffer")?;
        self.cram_latch = state.get("cram_latch")?;
        self.frame_pending = state.get("frame_pending")?;
        self.line_pending = state.get("line_pending")?;
        self.overflow = state.get("overflow")?;
        self.collision = state.get("collision")?;
        self.fifth_sprite = state.get("fifth_sprite")?;
        self.line_counter = state.get("line_counter")?;
        self.line_cycles = state.get("line_cycles")?;
        self.h_counter = state.get("h_counter")?;
        self.vscroll_latch = state.get("vscroll_latch")?;
        self.line_sprites = state.get("line_sprites")?;
        self.scanline = scanline;

        if layout != self.layout {
            self.layout = layout;
            self.viewport_changed = true;
        }
        self.framebuffer = Frame::new(OUTPUT_WIDTH, u32::from(layout.visible_lines()));
        self.completed = None;
        Ok(())
    }
}
