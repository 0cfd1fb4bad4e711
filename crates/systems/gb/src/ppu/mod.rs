//! LCD controller.
//!
//! Every visible line walks OAM search (80 cycles), pixel transfer
//! (172 cycles plus the fine scroll and sprite penalties) and H-Blank up to
//! 456 cycles. Lines 144-153 are V-Blank. A line is rendered in one go when
//! its transfer ends, so register writes land on line granularity.
//!
//! The controller collects its interrupt requests in a pending mask that the
//! bus drains into IF after every step.

mod palette;
mod render;

pub use palette::{cgb_color, dmg_shade, PaletteRam, Rgb, DMG_SHADES};

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::{Frame, Viewport};
use emu_core::{EmuError, StateMap, Stateful};

use crate::interrupts;

pub const SCREEN_WIDTH: u32 = 160;
pub const SCREEN_HEIGHT: u32 = 144;
pub const CYCLES_PER_LINE: u32 = 456;
pub const LINES_PER_FRAME: u32 = 154;
pub const CYCLES_PER_FRAME: u32 = CYCLES_PER_LINE * LINES_PER_FRAME;

const VRAM_BANK_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;
const OAM_SEARCH_CYCLES: u32 = 80;
const TRANSFER_CYCLES: u32 = 172;
const SPRITES_PER_LINE: usize = 10;

const LCDC_ENABLE: u8 = 0x80;
const STAT_LYC: u8 = 0x40;
const STAT_OAM: u8 = 0x20;
const STAT_VBLANK: u8 = 0x10;
const STAT_HBLANK: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamSearch = 2,
    LcdTransfer = 3,
}

impl Mode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamSearch,
            _ => Mode::LcdTransfer,
        }
    }
}

pub struct Ppu {
    cgb: bool,
    vram: Vec<u8>,
    vram_bank: u8,
    oam: [u8; OAM_SIZE],

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,
    bg_palettes: PaletteRam,
    obj_palettes: PaletteRam,

    mode: Mode,
    line_cycles: u32,
    transfer_cycles: u32,
    window_line: u8,
    window_triggered: bool,
    line_sprites: Vec<u8>,
    stat_line: bool,
    pending: u8,
    hblank_started: bool,
    off_cycles: u32,

    framebuffer: Frame,
    completed: Option<Frame>,
}

impl Ppu {
    pub fn new(cgb: bool) -> Self {
        let banks = if cgb { 2 } else { 1 };
        let mut ppu = Self {
            cgb,
            vram: vec![0; VRAM_BANK_SIZE * banks],
            vram_bank: 0,
            oam: [0; OAM_SIZE],
            lcdc: 0x91,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0xFC,
            obp0: 0xFF,
            obp1: 0xFF,
            wy: 0,
            wx: 0,
            bg_palettes: PaletteRam::new(),
            obj_palettes: PaletteRam::new(),
            mode: Mode::OamSearch,
            line_cycles: 0,
            transfer_cycles: TRANSFER_CYCLES,
            window_line: 0,
            window_triggered: false,
            line_sprites: Vec::with_capacity(SPRITES_PER_LINE),
            stat_line: false,
            pending: 0,
            hblank_started: false,
            off_cycles: 0,
            framebuffer: Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT),
            completed: None,
        };
        ppu.start_line();
        ppu
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.cgb);
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ENABLE != 0
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            x: 0,
            y: 0,
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
        }
    }

    // ---- memory ------------------------------------------------------------

    fn vram_blocked(&self) -> bool {
        self.lcd_enabled() && self.mode == Mode::LcdTransfer
    }

    fn oam_blocked(&self) -> bool {
        self.lcd_enabled() && matches!(self.mode, Mode::OamSearch | Mode::LcdTransfer)
    }

    fn vram_index(&self, addr: u16) -> usize {
        usize::from(self.vram_bank) * VRAM_BANK_SIZE + usize::from(addr & 0x1FFF)
    }

    /// 0x8000-0x9FFF through the selected bank. Reads 0xFF during transfer.
    pub fn read_vram(&self, addr: u16) -> u8 {
        if self.vram_blocked() {
            return 0xFF;
        }
        self.vram[self.vram_index(addr)]
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        if !self.vram_blocked() {
            self.write_vram_dma(addr, val);
        }
    }

    /// VRAM write that ignores the access window, used by HDMA.
    pub fn write_vram_dma(&mut self, addr: u16, val: u8) {
        let index = self.vram_index(addr);
        self.vram[index] = val;
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    /// 0xFE00-0xFE9F. Reads 0xFF during OAM search and transfer.
    pub fn read_oam(&self, addr: u16) -> u8 {
        if self.oam_blocked() {
            return 0xFF;
        }
        self.oam[usize::from(addr & 0xFF) % OAM_SIZE]
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        if !self.oam_blocked() {
            self.write_oam_dma(usize::from(addr & 0xFF), val);
        }
    }

    /// OAM write from the DMA unit, which owns the bus while it runs.
    pub fn write_oam_dma(&mut self, index: usize, val: u8) {
        self.oam[index % OAM_SIZE] = val;
    }

    // ---- registers ---------------------------------------------------------

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let coincidence = if self.ly == self.lyc { 0x04 } else { 0 };
                let mode = if self.lcd_enabled() { self.mode as u8 } else { 0 };
                0x80 | (self.stat & 0x78) | coincidence | mode
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            0xFF4F if self.cgb => 0xFE | self.vram_bank,
            0xFF68 if self.cgb => self.bg_palettes.read_index(),
            0xFF69 if self.cgb => self.bg_palettes.read_data(),
            0xFF6A if self.cgb => self.obj_palettes.read_index(),
            0xFF6B if self.cgb => self.obj_palettes.read_data(),
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => self.write_lcdc(val),
            0xFF41 => {
                self.stat = val & 0x78;
                self.update_stat();
            }
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            // LY is read-only.
            0xFF44 => {}
            0xFF45 => {
                self.lyc = val;
                self.update_stat();
            }
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            0xFF4F if self.cgb => self.vram_bank = val & 0x01,
            0xFF68 if self.cgb => self.bg_palettes.write_index(val),
            0xFF69 if self.cgb => self.bg_palettes.write_data(val),
            0xFF6A if self.cgb => self.obj_palettes.write_index(val),
            0xFF6B if self.cgb => self.obj_palettes.write_data(val),
            _ => {}
        }
    }

    fn write_lcdc(&mut self, val: u8) {
        let was_on = self.lcd_enabled();
        self.lcdc = val;
        match (was_on, self.lcd_enabled()) {
            (true, false) => {
                log(LogCategory::Video, LogLevel::Debug, || {
                    format!("PPU: LCD off at line {}", self.ly)
                });
                self.ly = 0;
                self.line_cycles = 0;
                self.off_cycles = 0;
                self.mode = Mode::HBlank;
                self.stat_line = false;
            }
            (false, true) => {
                log(LogCategory::Video, LogLevel::Debug, || "PPU: LCD on".to_string());
                self.ly = 0;
                self.line_cycles = 0;
                self.window_line = 0;
                self.window_triggered = false;
                self.start_line();
                self.update_stat();
            }
            _ => {}
        }
    }

    // ---- timing ------------------------------------------------------------

    /// Advance by `cycles` dot clocks. Returns true if a frame completed.
    pub fn step(&mut self, cycles: u32) -> bool {
        if !self.lcd_enabled() {
            return self.step_off(cycles);
        }
        let mut remaining = cycles;
        let mut completed = false;
        while remaining > 0 {
            let boundary = self.mode_end();
            let run = remaining.min(boundary.saturating_sub(self.line_cycles));
            self.line_cycles += run;
            remaining -= run;
            if self.line_cycles >= boundary {
                completed |= self.end_mode();
            }
        }
        completed
    }

    /// With the LCD off the screen is blank, but frames keep their pace.
    fn step_off(&mut self, cycles: u32) -> bool {
        self.off_cycles += cycles;
        if self.off_cycles < CYCLES_PER_FRAME {
            return false;
        }
        self.off_cycles %= CYCLES_PER_FRAME;
        let mut blank = Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        blank.pixels.fill(0xFF);
        self.completed = Some(blank);
        true
    }

    fn mode_end(&self) -> u32 {
        match self.mode {
            Mode::OamSearch => OAM_SEARCH_CYCLES,
            Mode::LcdTransfer => OAM_SEARCH_CYCLES + self.transfer_cycles,
            Mode::HBlank | Mode::VBlank => CYCLES_PER_LINE,
        }
    }

    fn end_mode(&mut self) -> bool {
        let mut completed = false;
        match self.mode {
            Mode::OamSearch => self.mode = Mode::LcdTransfer,
            Mode::LcdTransfer => {
                self.render_line();
                self.mode = Mode::HBlank;
                self.hblank_started = true;
            }
            Mode::HBlank | Mode::VBlank => {
                self.line_cycles = 0;
                self.ly += 1;
                if u32::from(self.ly) == SCREEN_HEIGHT {
                    self.mode = Mode::VBlank;
                    self.pending |= interrupts::VBLANK;
                    self.finish_frame();
                    completed = true;
                } else if u32::from(self.ly) == LINES_PER_FRAME {
                    self.ly = 0;
                    self.window_line = 0;
                    self.window_triggered = false;
                    self.start_line();
                } else if self.mode == Mode::HBlank {
                    self.start_line();
                }
            }
        }
        self.update_stat();
        completed
    }

    fn start_line(&mut self) {
        if self.ly == self.wy {
            self.window_triggered = true;
        }
        self.select_sprites();
        self.transfer_cycles = TRANSFER_CYCLES
            + u32::from(self.scx & 0x07)
            + 11 * self.line_sprites.len() as u32;
        self.mode = Mode::OamSearch;
    }

    fn select_sprites(&mut self) {
        let height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        let line = i16::from(self.ly);
        self.line_sprites.clear();
        for index in 0..(OAM_SIZE / 4) as u8 {
            let top = i16::from(self.oam[usize::from(index) * 4]) - 16;
            if line >= top && line < top + height {
                self.line_sprites.push(index);
                if self.line_sprites.len() == SPRITES_PER_LINE {
                    break;
                }
            }
        }
        // Monochrome hardware: lower X wins, OAM order breaks ties.
        if !self.cgb {
            let oam = &self.oam;
            self.line_sprites
                .sort_by_key(|&index| oam[usize::from(index) * 4 + 1]);
        }
    }

    fn update_stat(&mut self) {
        if !self.lcd_enabled() {
            return;
        }
        let signal = (self.stat & STAT_LYC != 0 && self.ly == self.lyc)
            || (self.stat & STAT_HBLANK != 0 && self.mode == Mode::HBlank)
            || (self.stat & STAT_VBLANK != 0 && self.mode == Mode::VBlank)
            || (self.stat & STAT_OAM != 0 && self.mode == Mode::OamSearch);
        if signal && !self.stat_line {
            self.pending |= interrupts::STAT;
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("PPU: STAT interrupt at line {}", self.ly)
            });
        }
        self.stat_line = signal;
    }

    fn finish_frame(&mut self) {
        let fresh = Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        self.completed = Some(std::mem::replace(&mut self.framebuffer, fresh));
    }

    /// Interrupt requests raised since the last call.
    pub fn take_interrupts(&mut self) -> u8 {
        std::mem::take(&mut self.pending)
    }

    /// True once per H-Blank entry.
    pub fn take_hblank(&mut self) -> bool {
        std::mem::take(&mut self.hblank_started)
    }

    /// The last completed frame, handed out once.
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.completed.take()
    }
}

impl Stateful for Ppu {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("vram", self.vram.as_slice());
        state.put("vram_bank", self.vram_bank);
        state.put("oam", &self.oam[..]);
        state.put(
            "registers",
            &[
                self.lcdc, self.stat, self.scy, self.scx, self.ly, self.lyc, self.bgp,
                self.obp0, self.obp1, self.wy, self.wx,
            ][..],
        );
        state.insert_scope("bg_palettes", self.bg_palettes.capture_state());
        state.insert_scope("obj_palettes", self.obj_palettes.capture_state());
        state.put("mode", self.mode as u8);
        state.put("line_cycles", self.line_cycles);
        state.put("transfer_cycles", self.transfer_cycles);
        state.put("window_line", self.window_line);
        state.put("window_triggered", self.window_triggered);
        state.put("line_sprites", self.line_sprites.as_slice());
        state.put("stat_line", self.stat_line);
        state.put("pending", self.pending);
        state.put("hblank_started", self.hblank_started);
        state.put("off_cycles", self.off_cycles);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let mut registers = [0u8; 11];
        state.get_bytes_into("registers", &mut registers)?;
        let [lcdc, stat, scy, scx, ly, lyc, bgp, obp0, obp1, wy, wx] = registers;
        if u32::from(ly) >= LINES_PER_FRAME {
            return Err(EmuError::State(format!("LY {ly} outside a 154-line frame")));
        }
        let line_cycles: u32 = state.get("line_cycles")?;
        if line_cycles >= CYCLES_PER_LINE {
            return Err(EmuError::State(format!(
                "PPU line position {line_cycles} past the end of the line"
            )));
        }

        state.get_bytes_into("vram", &mut self.vram)?;
        self.vram_bank = state.get::<u8>("vram_bank")? & u8::from(self.cgb);
        state.get_bytes_into("oam", &mut self.oam)?;
        (self.lcdc, self.stat, self.scy, self.scx, self.ly, self.lyc) = (lcdc, stat, scy, scx, ly, lyc);
        (self.bgp, self.obp0, self.obp1, self.wy, self.wx) = (bgp, obp0, obp1, wy, wx);
        self.bg_palettes.restore_state(&state.scope("bg_palettes"))?;
        self.obj_palettes.restore_state(&state.scope("obj_palettes"))?;
        self.mode = Mode::from_bits(state.get("mode")?);
        self.line_cycles = line_cycles;
        self.transfer_cycles = state.get("transfer_cycles")?;
        self.window_line = state.get("window_line")?;
        self.window_triggered = state.get("window_triggered")?;
        self.line_sprites = state.get("line_sprites")?;
        self.stat_line = state.get("stat_line")?;
        self.pending = state.get("pending")?;
        self.hblank_started = state.get("hblank_started")?;
        self.off_cycles = state.get("off_cycles")?;

        self.framebuffer = Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        self.completed = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_lines(ppu: &mut Ppu, lines: u32) -> bool {
        ppu.step(lines * CYCLES_PER_LINE)
    }

    #[test]
    fn test_mode_sequence_within_a_line() {
        let mut ppu = Ppu::new(false);
        assert_eq!(ppu.mode(), Mode::OamSearch);
        ppu.step(79);
        assert_eq!(ppu.mode(), Mode::OamSearch);
        ppu.step(1);
        assert_eq!(ppu.mode(), Mode::LcdTransfer);
        ppu.step(TRANSFER_CYCLES);
        assert_eq!(ppu.mode(), Mode::HBlank);
        assert!(ppu.take_hblank());
        assert!(!ppu.take_hblank());
        ppu.step(CYCLES_PER_LINE - OAM_SEARCH_CYCLES - TRANSFER_CYCLES);
        assert_eq!(ppu.ly(), 1);
        assert_eq!(ppu.mode(), Mode::OamSearch);
    }

    #[test]
    fn test_vblank_and_frame() {
        let mut ppu = Ppu::new(false);
        assert!(!run_lines(&mut ppu, 143));
        assert!(run_lines(&mut ppu, 1));
        assert_eq!(ppu.ly(), 144);
        assert_eq!(ppu.mode(), Mode::VBlank);
        assert_eq!(ppu.take_interrupts() & interrupts::VBLANK, interrupts::VBLANK);
        let frame = ppu.take_frame().unwrap();
        assert_eq!((frame.width, frame.height), (160, 144));
        assert!(!run_lines(&mut ppu, 10));
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.mode(), Mode::OamSearch);
    }

    #[test]
    fn test_one_frame_per_frame_period() {
        let mut ppu = Ppu::new(true);
        let frames = (0..10)
            .filter(|_| ppu.step(CYCLES_PER_FRAME))
            .count();
        assert_eq!(frames, 10);
    }

    #[test]
    fn test_lyc_interrupt_edge() {
        let mut ppu = Ppu::new(false);
        ppu.write_register(0xFF45, 5);
        ppu.write_register(0xFF41, STAT_LYC);
        run_lines(&mut ppu, 4);
        assert_eq!(ppu.take_interrupts() & interrupts::STAT, 0);
        run_lines(&mut ppu, 1);
        assert_eq!(ppu.take_interrupts() & interrupts::STAT, interrupts::STAT);
        assert_eq!(ppu.read_register(0xFF41) & 0x04, 0x04);
        // Staying on the line does not re-trigger.
        ppu.step(200);
        assert_eq!(ppu.take_interrupts() & interrupts::STAT, 0);
    }

    #[test]
    fn test_hblank_stat_interrupt() {
        let mut ppu = Ppu::new(false);
        ppu.write_register(0xFF41, STAT_HBLANK);
        ppu.step(OAM_SEARCH_CYCLES + TRANSFER_CYCLES);
        assert_eq!(ppu.take_interrupts(), interrupts::STAT);
    }

    #[test]
    fn test_vram_blocked_during_transfer() {
        let mut ppu = Ppu::new(false);
        ppu.write_vram(0x8000, 0x11);
        ppu.step(OAM_SEARCH_CYCLES);
        assert_eq!(ppu.read_vram(0x8000), 0xFF);
        ppu.write_vram(0x8000, 0x22);
        assert_eq!(ppu.read_oam(0xFE00), 0xFF);
        ppu.step(TRANSFER_CYCLES);
        assert_eq!(ppu.read_vram(0x8000), 0x11);
    }

    #[test]
    fn test_oam_blocked_during_search() {
        let mut ppu = Ppu::new(false);
        ppu.write_oam(0xFE00, 0x33);
        ppu.write_oam_dma(0, 0x44);
        ppu.step(OAM_SEARCH_CYCLES + TRANSFER_CYCLES);
        assert_eq!(ppu.read_oam(0xFE00), 0x44);
    }

    #[test]
    fn test_lcd_off_resets_line_and_emits_blank_frames() {
        let mut ppu = Ppu::new(false);
        run_lines(&mut ppu, 20);
        ppu.write_register(0xFF40, 0x11);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.read_register(0xFF41) & 0x03, 0);
        // VRAM is free while the LCD is off.
        ppu.write_vram(0x8000, 0x55);
        assert_eq!(ppu.read_vram(0x8000), 0x55);

        assert!(!ppu.step(CYCLES_PER_FRAME - 1));
        assert!(ppu.step(1));
        let frame = ppu.take_frame().unwrap();
        assert_eq!(frame.rgb(80, 72), (255, 255, 255));

        ppu.write_register(0xFF40, 0x91);
        assert_eq!(ppu.mode(), Mode::OamSearch);
    }

    #[test]
    fn test_cgb_only_registers() {
        let mut dmg = Ppu::new(false);
        dmg.write_register(0xFF4F, 1);
        assert_eq!(dmg.read_register(0xFF4F), 0xFF);

        let mut cgb = Ppu::new(true);
        cgb.write_register(0xFF40, 0x00);
        cgb.write_register(0xFF4F, 1);
        assert_eq!(cgb.read_register(0xFF4F), 0xFF);
        cgb.write_vram(0x8000, 0xAB);
        cgb.write_register(0xFF4F, 0);
        assert_eq!(cgb.read_register(0xFF4F), 0xFE);
        assert_eq!(cgb.read_vram(0x8000), 0x00);
        assert_eq!(cgb.vram()[0x2000], 0xAB);
    }

    #[test]
    fn test_sprite_selection_limit() {
        let mut ppu = Ppu::new(false);
        for i in 0..12 {
            ppu.write_oam_dma(i * 4, 16 + 1);
            ppu.write_oam_dma(i * 4 + 1, (100 - i) as u8);
        }
        run_lines(&mut ppu, 1);
        assert_eq!(ppu.line_sprites.len(), SPRITES_PER_LINE);
        // Sorted by X: entry 9 (X 91) comes first.
        assert_eq!(ppu.line_sprites[0], 9);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut ppu = Ppu::new(true);
        ppu.write_register(0xFF42, 0x12);
        run_lines(&mut ppu, 30);
        ppu.step(100);
        let state = ppu.capture_state();
        let mut other = Ppu::new(true);
        other.restore_state(&state).unwrap();
        assert_eq!(other.capture_state(), state);
        assert_eq!(other.ly(), 30);
    }

    #[test]
    fn test_restore_rejects_bad_line() {
        let ppu = Ppu::new(false);
        let mut state = ppu.capture_state();
        state.put("registers", &[0x91u8, 0, 0, 0, 200, 0, 0, 0, 0, 0, 0][..]);
        assert!(Ppu::new(false).restore_state(&state).is_err());
    }
}
