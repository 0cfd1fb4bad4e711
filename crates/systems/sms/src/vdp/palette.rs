//! Colour decoding for the three palette formats.

pub type Rgb = (u8, u8, u8);

/// Fixed TMS9918A palette, index 0 is transparent and drawn as black.
pub const TMS_PALETTE: [Rgb; 16] = [
    (0x00, 0x00, 0x00),
    (0x00, 0x00, 0x00),
    (0x21, 0xC8, 0x42),
    (0x5E, 0xDC, 0x78),
    (0x54, 0x55, 0xED),
    (0x7D, 0x76, 0xFC),
    (0xD4, 0x52, 0x4D),
    (0x42, 0xEB, 0xF5),
    (0xFC, 0x55, 0x54),
    (0xFF, 0x79, 0x78),
    (0xD4, 0xC1, 0x54),
    (0xE6, 0xCE, 0x80),
    (0x21, 0xB0, 0x3B),
    (0xC9, 0x5B, 0xBA),
    (0xCC, 0xCC, 0xCC),
    (0xFF, 0xFF, 0xFF),
];

pub fn tms_color(index: u8) -> Rgb {
    TMS_PALETTE[(index & 0x0F) as usize]
}

/// Master System CRAM byte: `--BBGGRR`.
pub fn sms_color(value: u8) -> Rgb {
    let level = |bits: u8| (bits & 0x03) * 85;
    (level(value), level(value >> 2), level(value >> 4))
}

/// Game Gear CRAM word: `----BBBBGGGGRRRR`.
pub fn gg_color(value: u16) -> Rgb {
    let level = |bits: u16| ((bits & 0x0F) * 17) as u8;
    (level(value), level(value >> 4), level(value >> 8))
}
