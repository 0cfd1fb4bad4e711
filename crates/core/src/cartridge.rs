//! Cartridge address space contract shared by both mapper families.
//!
//! ROM is allocated once at load time and never written by the CPU. RAM is
//! battery-backed on most boards, so its raw contents (plus any extra
//! mapper-specific block) are exposed for persistence.

use crate::state::Stateful;
use crate::EmuError;

/// A cartridge board: ROM, optional RAM and the paging logic in between.
///
/// `read` and `write` take CPU addresses. Addresses the board never decodes
/// return [`EmuError::UnsupportedAddress`]; writes into ROM space with no
/// register behind them are silently ignored, as on hardware.
pub trait Cartridge: Stateful + Send {
    fn read(&self, addr: u16) -> Result<u8, EmuError>;

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError>;

    /// Copy ROM contents in, clamped to the allocated size.
    fn load_rom(&mut self, data: &[u8]);

    /// Copy saved RAM in, clamped to the allocated size.
    fn load_ram(&mut self, data: &[u8]);

    fn rom_data(&self) -> &[u8];

    fn ram_data(&self) -> &[u8];

    /// Bytes to persist. Boards with extra battery-backed state (clocks)
    /// append it after the RAM contents.
    fn save_data(&self) -> Vec<u8> {
        self.ram_data().to_vec()
    }

    /// True once the game has enabled (and so possibly modified) RAM.
    fn is_ram_save_needed(&self) -> bool;

    /// Advance on-board clocked hardware.
    fn step(&mut self, cycles: u32) {
        let _ = cycles;
    }
}

/// Mask applied to bank numbers: `(next_pow2(size) >> shift) - 1`.
pub fn bank_mask(size: usize, shift: u32) -> usize {
    (size.max(1).next_power_of_two() >> shift).max(1) - 1
}

/// Copy `src` into `dst`, clamped to the shorter of the two.
pub fn copy_clamped(dst: &mut [u8], src: &[u8]) {
    let len = dst.len().min(src.len());
    dst[..len].copy_from_slice(&src[..len]);
}

/// Read `data[offset]`, mirroring when the masked bank points past the end
/// of an image whose size is not a power of two.
pub fn mirrored_read(data: &[u8], offset: usize) -> u8 {
    if data.is_empty() {
        0xFF
    } else {
        data[offset % data.len()]
    }
}

/// Write counterpart of [`mirrored_read`].
pub fn mirrored_write(data: &mut [u8], offset: usize, val: u8) {
    if !data.is_empty() {
        let len = data.len();
        data[offset % len] = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_mask_power_of_two() {
        assert_eq!(bank_mask(0x8000, 14), 1);
        assert_eq!(bank_mask(0x40000, 14), 15);
        assert_eq!(bank_mask(0x100000, 13), 127);
    }

    #[test]
    fn test_bank_mask_rounds_up() {
        // 48 KiB rounds to 64 KiB: four 16 KiB banks.
        assert_eq!(bank_mask(0xC000, 14), 3);
        assert_eq!(bank_mask(0x50000, 14), 31);
    }

    #[test]
    fn test_bank_mask_smaller_than_bank() {
        assert_eq!(bank_mask(0x2000, 14), 0);
        assert_eq!(bank_mask(0, 14), 0);
    }

    #[test]
    fn test_copy_clamped() {
        let mut dst = [0u8; 4];
        copy_clamped(&mut dst, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(dst, [1, 2, 3, 4]);

        let mut dst = [9u8; 4];
        copy_clamped(&mut dst, &[7]);
        assert_eq!(dst, [7, 9, 9, 9]);
    }

    #[test]
    fn test_mirrored_access_stays_in_bounds() {
        let mut data = vec![0u8; 0xC000];
        data[0x0123] = 0x42;
        assert_eq!(mirrored_read(&data, 0xC123), 0x42);
        mirrored_write(&mut data, 0xC124, 0x24);
        assert_eq!(data[0x0124], 0x24);
        assert_eq!(mirrored_read(&[], 5), 0xFF);
    }
}
