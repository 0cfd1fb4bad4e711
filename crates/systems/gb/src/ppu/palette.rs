//! Monochrome shades and the Color palette memories.

use emu_core::{EmuError, StateMap, Stateful};

pub type Rgb = (u8, u8, u8);

/// Shades 0-3, lightest first.
pub const DMG_SHADES: [Rgb; 4] = [
    (0xFF, 0xFF, 0xFF),
    (0xAA, 0xAA, 0xAA),
    (0x55, 0x55, 0x55),
    (0x00, 0x00, 0x00),
];

/// Colour `index` (0-3) through a BGP/OBP style register.
pub fn dmg_shade(palette: u8, index: u8) -> Rgb {
    DMG_SHADES[usize::from((palette >> ((index & 3) * 2)) & 0x03)]
}

/// Little-endian RGB555 word, 5-bit channels widened to 8 bits.
pub fn cgb_color(word: u16) -> Rgb {
    let widen = |c: u16| {
        let c = (c & 0x1F) as u8;
        (c << 3) | (c >> 2)
    };
    (widen(word), widen(word >> 5), widen(word >> 10))
}

/// Eight palettes of four colours, reached through an index register
/// (BCPS/OCPS) and a data port (BCPD/OCPD).
pub struct PaletteRam {
    data: [u8; 64],
    index: u8,
    auto_increment: bool,
}

impl PaletteRam {
    pub fn new() -> Self {
        Self {
            data: [0xFF; 64],
            index: 0,
            auto_increment: false,
        }
    }

    pub fn read_index(&self) -> u8 {
        let increment = if self.auto_increment { 0x80 } else { 0x00 };
        increment | 0x40 | self.index
    }

    pub fn write_index(&mut self, val: u8) {
        self.index = val & 0x3F;
        self.auto_increment = val & 0x80 != 0;
    }

    pub fn read_data(&self) -> u8 {
        self.data[usize::from(self.index)]
    }

    pub fn write_data(&mut self, val: u8) {
        self.data[usize::from(self.index)] = val;
        if self.auto_increment {
            self.index = (self.index + 1) & 0x3F;
        }
    }

    pub fn color(&self, palette: u8, index: u8) -> Rgb {
        let offset = usize::from(palette & 0x07) * 8 + usize::from(index & 0x03) * 2;
        cgb_color(u16::from_le_bytes([self.data[offset], self.data[offset + 1]]))
    }
}

impl Default for PaletteRam {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for PaletteRam {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("data", &self.data[..]);
        state.put("index", self.index);
        state.put("auto_increment", self.auto_increment);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("data", &mut self.data)?;
        self.index = state.get::<u8>("index")? & 0x3F;
        self.auto_increment = state.get("auto_increment")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmg_shade_lookup() {
        // Identity palette 0b11_10_01_00.
        assert_eq!(dmg_shade(0xE4, 0), DMG_SHADES[0]);
        assert_eq!(dmg_shade(0xE4, 3), DMG_SHADES[3]);
        // Inverted.
        assert_eq!(dmg_shade(0x1B, 0), DMG_SHADES[3]);
    }

    #[test]
    fn test_cgb_color_widening() {
        assert_eq!(cgb_color(0x7FFF), (255, 255, 255));
        assert_eq!(cgb_color(0x001F), (255, 0, 0));
        assert_eq!(cgb_color(0x03E0), (0, 255, 0));
        assert_eq!(cgb_color(0x0010), (132, 0, 0));
    }

    #[test]
    fn test_auto_increment_wraps() {
        let mut ram = PaletteRam::new();
        ram.write_index(0x80 | 0x3F);
        ram.write_data(0x12);
        assert_eq!(ram.read_index(), 0x80 | 0x40);
        ram.write_data(0x34);
        assert_eq!(ram.read_index() & 0x3F, 1);
        ram.write_index(0x3F);
        assert_eq!(ram.read_data(), 0x12);
    }

    #[test]
    fn test_palette_color_little_endian() {
        let mut ram = PaletteRam::new();
        ram.write_index(0x80 | (3 * 8 + 2));
        ram.write_data(0x1F);
        ram.write_data(0x00);
        assert_eq!(ram.color(3, 1), (255, 0, 0));
    }
}
