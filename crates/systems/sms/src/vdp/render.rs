//! Per-line rendering for every display mode.
//!
//! Sprites are drawn before the background. Each output pixel records who
//! wrote it first in a [`ScreenUsage`] slot; later layers only fill empty
//! slots, except Mode 4 background tiles flagged for priority.

use super::palette::{tms_color, Rgb};
use super::timing::{VerticalPhase, ACTIVE_WIDTH, LEFT_BORDER_WIDTH, OUTPUT_WIDTH};
use super::{DisplayMode, Vdp};

const WIDTH: usize = ACTIVE_WIDTH as usize;

/// Owner of an output pixel for the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenUsage {
    Empty,
    Background,
    Sprite,
}

struct LineBuffer {
    pixels: [Rgb; WIDTH],
    usage: [ScreenUsage; WIDTH],
    // Opaque sprite coverage, used only for collision detection.
    covered: [bool; WIDTH],
}

impl LineBuffer {
    fn new(backdrop: Rgb) -> Self {
        Self {
            pixels: [backdrop; WIDTH],
            usage: [ScreenUsage::Empty; WIDTH],
            covered: [false; WIDTH],
        }
    }

    /// Returns true when another sprite already covered `x`.
    fn put_sprite(&mut self, x: usize, color: Option<Rgb>) -> bool {
        let collided = self.covered[x];
        self.covered[x] = true;
        if let Some(rgb) = color {
            if self.usage[x] == ScreenUsage::Empty {
                self.pixels[x] = rgb;
                self.usage[x] = ScreenUsage::Sprite;
            }
        }
        collided
    }

    fn put_tms_background(&mut self, x: usize, index: u8) {
        if self.usage[x] != ScreenUsage::Empty {
            return;
        }
        if index != 0 {
            self.pixels[x] = tms_color(index);
        }
        self.usage[x] = ScreenUsage::Background;
    }
}

impl Vdp {
    fn vram_at(&self, addr: usize) -> u8 {
        self.vram[addr & 0x3FFF]
    }

    pub(super) fn backdrop(&self) -> Rgb {
        match self.display_mode() {
            DisplayMode::Mode4 => self.cram_color(16 + (self.registers[7] & 0x0F)),
            _ => tms_color(self.registers[7] & 0x0F),
        }
    }

    /// Write one visible line into the framebuffer.
    pub(super) fn render_line(&mut self, line: u16) {
        let row = u32::from(line - self.layout.visible_start());
        if row >= self.framebuffer.height {
            return;
        }
        let backdrop = self.backdrop();
        let mut out = [backdrop; OUTPUT_WIDTH as usize];

        let display_on = self.registers[1] & 0x40 != 0;
        if self.layout.phase(line) == VerticalPhase::ActiveDisplay && display_on {
            let y = self.layout.relative_line(line);
            let mut buffer = LineBuffer::new(backdrop);
            match self.display_mode() {
                DisplayMode::Mode4 => self.render_mode4(y, &mut buffer),
                DisplayMode::Text => self.render_text(y, &mut buffer),
                mode => {
                    self.render_tms_sprites(y, &mut buffer);
                    match mode {
                        DisplayMode::GraphicsII => self.render_graphics2(y, &mut buffer),
                        DisplayMode::Multicolor => self.render_multicolor(y, &mut buffer),
                        _ => self.render_graphics1(y, &mut buffer),
                    }
                }
            }
            let left = LEFT_BORDER_WIDTH as usize;
            out[left..left + WIDTH].copy_from_slice(&buffer.pixels);
        }

        for (x, rgb) in out.iter().enumerate() {
            self.framebuffer.set_rgb(x as u32, row, *rgb);
        }
    }

    /// Sprite lookahead for active line `y`: fills `line_sprites` and the
    /// overflow/fifth-sprite status bits.
    pub(super) fn select_sprites(&mut self, y: u16) {
        self.line_sprites.clear();
        match self.display_mode() {
            DisplayMode::Text => {}
            DisplayMode::Mode4 => self.select_mode4_sprites(y),
            _ => self.select_tms_sprites(y),
        }
    }

    fn sprite_height(&self) -> i32 {
        let size = if self.registers[1] & 0x02 != 0 { 16 } else { 8 };
        size * self.sprite_zoom()
    }

    fn sprite_zoom(&self) -> i32 {
        if self.registers[1] & 0x01 != 0 {
            2
        } else {
            1
        }
    }

    fn sprite_row(y: u16, y_raw: u8) -> i32 {
        (i32::from(y) - i32::from(y_raw) - 1) & 0xFF
    }

    fn select_mode4_sprites(&mut self, y: u16) {
        let sat = usize::from(self.registers[5] & 0x7E) << 7;
        let height = self.sprite_height();
        let terminates = self.layout.active_lines() == 192;
        for i in 0..64u8 {
            let y_raw = self.vram_at(sat + usize::from(i));
            if terminates && y_raw == 0xD0 {
                break;
            }
            if Self::sprite_row(y, y_raw) >= height {
                continue;
            }
            if self.line_sprites.len() == 8 {
                self.overflow = true;
                if !self.remove_sprite_limit {
                    break;
                }
            }
            self.line_sprites.push(i);
        }
    }

    fn select_tms_sprites(&mut self, y: u16) {
        let sat = usize::from(self.registers[5] & 0x7F) << 7;
        let height = self.sprite_height();
        let mut last = 31;
        for i in 0..32u8 {
            let y_raw = self.vram_at(sat + usize::from(i) * 4);
            if y_raw == 0xD0 {
                last = i;
                break;
            }
            if Self::sprite_row(y, y_raw) >= height {
                continue;
            }
            if self.line_sprites.len() == 4 {
                if !self.overflow {
                    self.overflow = true;
                    self.fifth_sprite = i;
                }
                if !self.remove_sprite_limit {
                    return;
                }
            }
            self.line_sprites.push(i);
        }
        if !self.overflow {
            self.fifth_sprite = last;
        }
    }

    fn render_mode4(&mut self, y: u16, buffer: &mut LineBuffer) {
        self.render_mode4_sprites(y, buffer);
        self.render_mode4_background(y, buffer);
        if self.registers[0] & 0x20 != 0 {
            let backdrop = self.backdrop();
            buffer.pixels[..8].fill(backdrop);
        }
    }

    fn tile_color(&self, pattern_addr: usize, column: usize) -> u8 {
        let bit = 7 - column;
        (0..4).fold(0u8, |acc, plane| {
            acc | (((self.vram_at(pattern_addr + plane) >> bit) & 1) << plane)
        })
    }

    fn render_mode4_sprites(&mut self, y: u16, buffer: &mut LineBuffer) {
        let sat = usize::from(self.registers[5] & 0x7E) << 7;
        let zoom = self.sprite_zoom();
        let tall = self.registers[1] & 0x02 != 0;
        let shift = if self.registers[0] & 0x08 != 0 { 8 } else { 0 };
        let high_tiles = if self.registers[6] & 0x04 != 0 { 0x100 } else { 0 };

        let mut collision = false;
        for &i in &self.line_sprites {
            let i = usize::from(i);
            let y_raw = self.vram_at(sat + i);
            let x0 = i32::from(self.vram_at(sat + 0x80 + i * 2)) - shift;
            let mut tile = usize::from(self.vram_at(sat + 0x81 + i * 2)) | high_tiles;
            if tall {
                tile &= !1;
            }
            let row = (Self::sprite_row(y, y_raw) / zoom) as usize;
            let pattern = tile * 32 + row * 4;

            for px in 0..8 * zoom {
                let sx = x0 + px;
                if !(0..WIDTH as i32).contains(&sx) {
                    continue;
                }
                let color = self.tile_color(pattern, (px / zoom) as usize);
                if color == 0 {
                    continue;
                }
                collision |= buffer.put_sprite(sx as usize, Some(self.cram_color(16 + color)));
            }
        }
        self.collision |= collision;
    }

    fn render_mode4_background(&self, y: u16, buffer: &mut LineBuffer) {
        let (name_base, wrap) = if self.layout.active_lines() == 192 {
            (usize::from(self.registers[2] & 0x0E) << 10, 224)
        } else {
            ((usize::from(self.registers[2] & 0x0C) << 10) | 0x0700, 256)
        };
        let hscroll = if self.registers[0] & 0x40 != 0 && y < 16 {
            0
        } else {
            self.registers[8]
        };
        let vlock = self.registers[0] & 0x80 != 0;

        for x in 0..WIDTH {
            let vscroll = if vlock && x >= 192 {
                0
            } else {
                usize::from(self.vscroll_latch)
            };
            let sy = (usize::from(y) + vscroll) % wrap;
            let sx = usize::from((x as u8).wrapping_sub(hscroll));

            let entry_addr = name_base + ((sy / 8) * 32 + sx / 8) * 2;
            let entry =
                u16::from(self.vram_at(entry_addr)) | (u16::from(self.vram_at(entry_addr + 1)) << 8);
            let tile = usize::from(entry & 0x01FF);
            let hflip = entry & 0x0200 != 0;
            let vflip = entry & 0x0400 != 0;
            let palette = if entry & 0x0800 != 0 { 16 } else { 0 };
            let priority = entry & 0x1000 != 0;

            let row = if vflip { 7 - sy % 8 } else { sy % 8 };
            let column = if hflip { 7 - sx % 8 } else { sx % 8 };
            let color = self.tile_color(tile * 32 + row * 4, column);

            match buffer.usage[x] {
                ScreenUsage::Sprite if !(priority && color != 0) => continue,
                ScreenUsage::Background => continue,
                _ => {}
            }
            buffer.pixels[x] = self.cram_color(palette + color);
            buffer.usage[x] = ScreenUsage::Background;
        }
    }

    fn render_tms_sprites(&mut self, y: u16, buffer: &mut LineBuffer) {
        let sat = usize::from(self.registers[5] & 0x7F) << 7;
        let patterns = usize::from(self.registers[6] & 0x07) << 11;
        let large = self.registers[1] & 0x02 != 0;
        let zoom = self.sprite_zoom();
        let size = if large { 16 } else { 8 };

        let mut collision = false;
        for &i in &self.line_sprites {
            let entry = sat + usize::from(i) * 4;
            let y_raw = self.vram_at(entry);
            let attr = self.vram_at(entry + 3);
            let mut x0 = i32::from(self.vram_at(entry + 1));
            if attr & 0x80 != 0 {
                x0 -= 32;
            }
            let mut name = usize::from(self.vram_at(entry + 2));
            if large {
                name &= 0xFC;
            }
            let color = attr & 0x0F;
            let row = (Self::sprite_row(y, y_raw) / zoom) as usize;
            let left = self.vram_at(patterns + name * 8 + row);
            let right = self.vram_at(patterns + name * 8 + 16 + row);

            for px in 0..size * zoom {
                let sx = x0 + px;
                if !(0..WIDTH as i32).contains(&sx) {
                    continue;
                }
                let column = (px / zoom) as usize;
                let byte = if column < 8 { left } else { right };
                if byte & (0x80 >> (column % 8)) == 0 {
                    continue;
                }
                let rgb = (color != 0).then(|| tms_color(color));
                collision |= buffer.put_sprite(sx as usize, rgb);
            }
        }
        self.collision |= collision;
    }

    fn render_graphics1(&self, y: u16, buffer: &mut LineBuffer) {
        let names = usize::from(self.registers[2] & 0x0F) << 10;
        let colors = usize::from(self.registers[3]) << 6;
        let patterns = usize::from(self.registers[4] & 0x07) << 11;
        let y = usize::from(y);

        for column in 0..32 {
            let name = usize::from(self.vram_at(names + (y / 8) * 32 + column));
            let pattern = self.vram_at(patterns + name * 8 + y % 8);
            let color = self.vram_at(colors + name / 8);
            self.put_tms_byte(buffer, column * 8, 8, pattern, color);
        }
    }

    fn render_graphics2(&self, y: u16, buffer: &mut LineBuffer) {
        let names = usize::from(self.registers[2] & 0x0F) << 10;
        let colors = usize::from(self.registers[3] & 0x80) << 6;
        let color_mask = (usize::from(self.registers[3] & 0x7F) << 3) | 0x07;
        let patterns = usize::from(self.registers[4] & 0x04) << 11;
        let pattern_mask = (usize::from(self.registers[4] & 0x03) << 8) | 0xFF;
        let y = usize::from(y);

        for column in 0..32 {
            let name = usize::from(self.vram_at(names + (y / 8) * 32 + column));
            let index = (y / 64) * 256 + name;
            let pattern = self.vram_at(patterns + (index & pattern_mask) * 8 + y % 8);
            let color = self.vram_at(colors + (index & color_mask) * 8 + y % 8);
            self.put_tms_byte(buffer, column * 8, 8, pattern, color);
        }
    }

    fn render_multicolor(&self, y: u16, buffer: &mut LineBuffer) {
        let names = usize::from(self.registers[2] & 0x0F) << 10;
        let patterns = usize::from(self.registers[4] & 0x07) << 11;
        let y = usize::from(y);

        for column in 0..32 {
            let name = usize::from(self.vram_at(names + (y / 8) * 32 + column));
            let block = self.vram_at(patterns + name * 8 + ((y / 8) & 3) * 2 + (y / 4) % 2);
            for px in 0..8 {
                let index = if px < 4 { block >> 4 } else { block & 0x0F };
                buffer.put_tms_background(column * 8 + px, index);
            }
        }
    }

    fn render_text(&self, y: u16, buffer: &mut LineBuffer) {
        let names = usize::from(self.registers[2] & 0x0F) << 10;
        let patterns = usize::from(self.registers[4] & 0x07) << 11;
        let color = self.registers[7];
        let y = usize::from(y);

        for column in 0..40 {
            let name = usize::from(self.vram_at(names + (y / 8) * 40 + column));
            let pattern = self.vram_at(patterns + name * 8 + y % 8);
            self.put_tms_byte(buffer, 8 + column * 6, 6, pattern, color);
        }
    }

    /// Draw the top `width` bits of `pattern` with foreground/background
    /// colours packed as `FFFFBBBB`.
    fn put_tms_byte(&self, buffer: &mut LineBuffer, x: usize, width: usize, pattern: u8, color: u8) {
        for bit in 0..width {
            let index = if pattern & (0x80 >> bit) != 0 {
                color >> 4
            } else {
                color & 0x0F
            };
            buffer.put_tms_background(x + bit, index);
        }
    }
}
