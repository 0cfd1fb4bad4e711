//! Cartridge header at 0x0100-0x014F.

use emu_core::EmuError;
use serde::{Deserialize, Serialize};

use crate::mappers::GbMapperKind;
use crate::GbError;

pub const HEADER_END: usize = 0x150;

const TITLE: usize = 0x134;
const CGB_FLAG: usize = 0x143;
const CART_TYPE: usize = 0x147;
const ROM_SIZE: usize = 0x148;
const RAM_SIZE: usize = 0x149;
const HEADER_CHECKSUM: usize = 0x14D;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CgbSupport {
    /// Monochrome-only cartridge.
    None,
    /// Runs on both, colour enhanced (0x80).
    Enhanced,
    /// Colour hardware required (0xC0).
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub cgb: CgbSupport,
    pub cart_type: u8,
    pub kind: GbMapperKind,
    pub rom_size: usize,
    pub ram_size: usize,
    pub battery: bool,
    pub timer: bool,
    pub rumble: bool,
    pub checksum_valid: bool,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, EmuError> {
        if rom.len() < HEADER_END {
            return Err(GbError::RomTooSmall(rom.len()).into());
        }
        let cart_type = rom[CART_TYPE];
        let (kind, battery, timer, rumble) = match cart_type {
            0x00 | 0x08 => (GbMapperKind::NoMapper, false, false, false),
            0x09 => (GbMapperKind::NoMapper, true, false, false),
            0x01 | 0x02 => (GbMapperKind::Mbc1, false, false, false),
            0x03 => (GbMapperKind::Mbc1, true, false, false),
            0x05 => (GbMapperKind::Mbc2, false, false, false),
            0x06 => (GbMapperKind::Mbc2, true, false, false),
            0x0F | 0x10 => (GbMapperKind::Mbc3, true, true, false),
            0x11 | 0x12 => (GbMapperKind::Mbc3, false, false, false),
            0x13 => (GbMapperKind::Mbc3, true, false, false),
            0x19 | 0x1A => (GbMapperKind::Mbc5, false, false, false),
            0x1B => (GbMapperKind::Mbc5, true, false, false),
            0x1C | 0x1D => (GbMapperKind::Mbc5, false, false, true),
            0x1E => (GbMapperKind::Mbc5, true, false, true),
            0xFC => (GbMapperKind::Camera, true, false, false),
            0xFF => (GbMapperKind::Huc1, true, false, false),
            other => return Err(EmuError::UnimplementedMapper(other)),
        };

        let rom_size = match rom[ROM_SIZE] {
            code @ 0x00..=0x08 => 0x8000 << code,
            0x52 => 72 * 0x4000,
            0x53 => 80 * 0x4000,
            0x54 => 96 * 0x4000,
            _ => rom.len(),
        };
        let ram_size = match kind {
            GbMapperKind::Mbc2 => 512,
            GbMapperKind::Camera => 0x20000,
            _ => match rom[RAM_SIZE] {
                0x01 => 0x800,
                0x02 => 0x2000,
                0x03 => 0x8000,
                0x04 => 0x20000,
                0x05 => 0x10000,
                _ => 0,
            },
        };

        let cgb = match rom[CGB_FLAG] {
            0xC0 => CgbSupport::Required,
            0x80 => CgbSupport::Enhanced,
            _ => CgbSupport::None,
        };
        // Colour titles give up the last bytes of the title field.
        let title_end = if cgb == CgbSupport::None { 0x144 } else { 0x13F };
        let title = rom[TITLE..title_end]
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|b| b.is_ascii_graphic() || **b == b' ')
            .map(|&b| char::from(b))
            .collect::<String>()
            .trim_end()
            .to_string();

        Ok(Self {
            title,
            cgb,
            cart_type,
            kind,
            rom_size,
            ram_size,
            battery,
            timer,
            rumble,
            checksum_valid: header_checksum(rom) == rom[HEADER_CHECKSUM],
        })
    }
}

/// `x = x - byte - 1` over 0x0134-0x014C.
pub fn header_checksum(rom: &[u8]) -> u8 {
    rom[TITLE..HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

#[cfg(test)]
pub(crate) fn test_rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000 << rom_code];
    rom[TITLE..TITLE + 5].copy_from_slice(b"TESTS");
    rom[CART_TYPE] = cart_type;
    rom[ROM_SIZE] = rom_code;
    rom[RAM_SIZE] = ram_code;
    rom[HEADER_CHECKSUM] = header_checksum(&rom);
    rom
}
