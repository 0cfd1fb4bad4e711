//! Line rendering: background, window, then sprites over the top.
//!
//! Background pixels keep their raw colour number and, on the Color, their
//! attribute priority so sprite masking can be decided after the fact.

use super::palette::{dmg_shade, Rgb, DMG_SHADES};
use super::{Ppu, SCREEN_WIDTH};

const WIDTH: usize = SCREEN_WIDTH as usize;

const LCDC_WINDOW_MAP: u8 = 0x40;
const LCDC_WINDOW_ENABLE: u8 = 0x20;
const LCDC_TILE_DATA: u8 = 0x10;
const LCDC_BG_MAP: u8 = 0x08;
const LCDC_OBJ_TALL: u8 = 0x04;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_BG_ENABLE: u8 = 0x01;

const ATTR_PRIORITY: u8 = 0x80;
const ATTR_FLIP_Y: u8 = 0x40;
const ATTR_FLIP_X: u8 = 0x20;
const ATTR_DMG_PALETTE: u8 = 0x10;
const ATTR_BANK: u8 = 0x08;

#[derive(Debug, Clone, Copy, Default)]
struct BgPixel {
    color: u8,
    palette: u8,
    priority: bool,
}

/// Colour number of column `col` in a 2bpp tile row.
fn tile_pixel(low: u8, high: u8, col: u8) -> u8 {
    let bit = 7 - (col & 7);
    (((high >> bit) & 1) << 1) | ((low >> bit) & 1)
}

impl Ppu {
    pub(super) fn render_line(&mut self) {
        let y = u32::from(self.ly);
        let mut line = [BgPixel::default(); WIDTH];

        // On the Color, LCDC bit 0 only strips the background of priority.
        let bg_visible = self.cgb || self.lcdc & LCDC_BG_ENABLE != 0;
        if bg_visible {
            self.draw_background(&mut line);
            self.draw_window(&mut line);
        }

        let mut pixels: [Rgb; WIDTH] = [DMG_SHADES[0]; WIDTH];
        for (x, px) in line.iter().enumerate() {
            pixels[x] = if self.cgb {
                self.bg_palettes.color(px.palette, px.color)
            } else if bg_visible {
                dmg_shade(self.bgp, px.color)
            } else {
                DMG_SHADES[0]
            };
        }

        if self.lcdc & LCDC_OBJ_ENABLE != 0 {
            self.draw_sprites(&line, &mut pixels);
        }

        for (x, rgb) in pixels.iter().enumerate() {
            self.framebuffer.set_rgb(x as u32, y, *rgb);
        }
    }

    fn tile_row_address(&self, tile: u8, row: u8) -> usize {
        let base = if self.lcdc & LCDC_TILE_DATA != 0 {
            usize::from(tile) * 16
        } else {
            // Signed index relative to 0x9000.
            (0x1000 + i32::from(tile as i8) * 16) as usize
        };
        base + usize::from(row) * 2
    }

    fn map_pixel(&self, map: usize, map_x: u8, map_y: u8) -> BgPixel {
        let entry = map + usize::from(map_y / 8) * 32 + usize::from(map_x / 8);
        let tile = self.vram[entry];
        let attrs = if self.cgb { self.vram[0x2000 + entry] } else { 0 };

        let mut row = map_y % 8;
        if attrs & ATTR_FLIP_Y != 0 {
            row = 7 - row;
        }
        let mut col = map_x % 8;
        if attrs & ATTR_FLIP_X != 0 {
            col = 7 - col;
        }
        let bank = if attrs & ATTR_BANK != 0 { 0x2000 } else { 0 };
        let addr = bank + self.tile_row_address(tile, row);
        BgPixel {
            color: tile_pixel(self.vram[addr], self.vram[addr + 1], col),
            palette: attrs & 0x07,
            priority: attrs & ATTR_PRIORITY != 0,
        }
    }

    fn draw_background(&self, line: &mut [BgPixel; WIDTH]) {
        let map = if self.lcdc & LCDC_BG_MAP != 0 { 0x1C00 } else { 0x1800 };
        let map_y = self.ly.wrapping_add(self.scy);
        for (x, px) in line.iter_mut().enumerate() {
            *px = self.map_pixel(map, (x as u8).wrapping_add(self.scx), map_y);
        }
    }

    fn draw_window(&mut self, line: &mut [BgPixel; WIDTH]) {
        if self.lcdc & LCDC_WINDOW_ENABLE == 0 || !self.window_triggered || self.wx > 166 {
            return;
        }
        let map = if self.lcdc & LCDC_WINDOW_MAP != 0 { 0x1C00 } else { 0x1800 };
        let left = i16::from(self.wx) - 7;
        for (x, px) in line.iter_mut().enumerate().skip(left.max(0) as usize) {
            let window_x = (x as i16 - left) as u8;
            *px = self.map_pixel(map, window_x, self.window_line);
        }
        self.window_line = self.window_line.wrapping_add(1);
    }

    fn draw_sprites(&self, line: &[BgPixel; WIDTH], pixels: &mut [Rgb; WIDTH]) {
        let height: u8 = if self.lcdc & LCDC_OBJ_TALL != 0 { 16 } else { 8 };
        let mut claimed = [false; WIDTH];

        for &index in &self.line_sprites {
            let entry = &self.oam[usize::from(index) * 4..usize::from(index) * 4 + 4];
            let (top, left, mut tile, attrs) = (entry[0], entry[1], entry[2], entry[3]);

            let mut row = self.ly.wrapping_sub(top.wrapping_sub(16));
            if attrs & ATTR_FLIP_Y != 0 {
                row = height - 1 - row;
            }
            if height == 16 {
                tile &= 0xFE;
            }
            let bank = if self.cgb && attrs & ATTR_BANK != 0 { 0x2000 } else { 0 };
            let addr = bank + usize::from(tile) * 16 + usize::from(row) * 2;
            let (low, high) = (self.vram[addr], self.vram[addr + 1]);

            for col in 0..8u8 {
                let x = i16::from(left) - 8 + i16::from(col);
                if !(0..WIDTH as i16).contains(&x) {
                    continue;
                }
                let x = x as usize;
                let sample = if attrs & ATTR_FLIP_X != 0 { 7 - col } else { col };
                let color = tile_pixel(low, high, sample);
                // Transparent pixels let lower-priority sprites through.
                if color == 0 || claimed[x] {
                    continue;
                }
                claimed[x] = true;
                if self.sprite_hidden(attrs, line[x]) {
                    continue;
                }
                pixels[x] = if self.cgb {
                    self.obj_palettes.color(attrs & 0x07, color)
                } else {
                    let palette = if attrs & ATTR_DMG_PALETTE != 0 {
                        self.obp1
                    } else {
                        self.obp0
                    };
                    dmg_shade(palette, color)
                };
            }
        }
    }

    fn sprite_hidden(&self, attrs: u8, bg: BgPixel) -> bool {
        if bg.color == 0 {
            return false;
        }
        if self.cgb && self.lcdc & LCDC_BG_ENABLE == 0 {
            return false;
        }
        attrs & ATTR_PRIORITY != 0 || (self.cgb && bg.priority)
    }
}
