//! Pocket Camera (MAC-GBD): MBC with 128 KiB RAM and an image sensor.
//!
//! Writing a RAM bank value with bit 4 set maps the sensor registers at
//! 0xA000 instead of RAM. Register 0 bit 0 starts a capture; once the
//! exposure time has elapsed the dithered picture lands in RAM bank 0 at
//! 0x0100 as 16x14 2bpp tiles.
//!
//! The sensor is a host-supplied greyscale picture, dithered through the
//! 4x4 threshold matrix in registers 0x06-0x35. Edge enhancement and the
//! analogue gain stages are not modelled.

use emu_core::cartridge::{copy_clamped, Cartridge};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{EmuError, StateMap, Stateful};

use super::{unsupported, BankedMemory};

pub const SENSOR_WIDTH: usize = 128;
pub const SENSOR_HEIGHT: usize = 112;

const RAM_SIZE: usize = 0x20000;
const REGISTER_COUNT: usize = 0x36;
const MATRIX_BASE: usize = 0x06;
const IMAGE_OFFSET: usize = 0x100;
const REGISTER_SELECT: u8 = 0x10;

pub struct Camera {
    mem: BankedMemory,
    ram_enabled: bool,
    rom_bank: u8,
    ram_bank: u8,
    registers: [u8; REGISTER_COUNT],
    busy_cycles: u32,
    sensor: Vec<u8>,
}

impl Camera {
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            mem: BankedMemory::new(rom, RAM_SIZE, true),
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
            registers: [0; REGISTER_COUNT],
            busy_cycles: 0,
            // Left-to-right gradient until the host supplies a picture.
            sensor: (0..SENSOR_WIDTH * SENSOR_HEIGHT)
                .map(|i| ((i % SENSOR_WIDTH) * 2) as u8)
                .collect(),
        }
    }

    /// Replaces the sensor picture; one byte per pixel, 0 is black.
    pub fn set_sensor_image(&mut self, pixels: &[u8]) {
        copy_clamped(&mut self.sensor, pixels);
    }

    pub fn is_capturing(&self) -> bool {
        self.busy_cycles > 0
    }

    fn register_mode(&self) -> bool {
        self.ram_bank & REGISTER_SELECT != 0
    }

    fn capture_cycles(&self) -> u32 {
        let exposure = (u32::from(self.registers[2]) << 8) | u32::from(self.registers[3]);
        let negative_offset = if self.registers[1] & 0x80 != 0 { 0 } else { 512 };
        (32446 + negative_offset + 16 * exposure) * 4
    }

    fn start_capture(&mut self) {
        self.busy_cycles = self.capture_cycles();
        log(LogCategory::Cartridge, LogLevel::Debug, || {
            format!("Camera: capture started, {} cycles", self.busy_cycles)
        });
    }

    fn finish_capture(&mut self) {
        self.registers[0] &= !0x01;
        for y in 0..SENSOR_HEIGHT {
            for x in 0..SENSOR_WIDTH {
                let shade = self.dither(x, y, self.sensor[y * SENSOR_WIDTH + x]);
                let tile = (y / 8) * (SENSOR_WIDTH / 8) + x / 8;
                let row = IMAGE_OFFSET + tile * 16 + (y % 8) * 2;
                let bit = 0x80 >> (x % 8);
                set_bit(&mut self.mem.ram[row], bit, shade & 1 != 0);
                set_bit(&mut self.mem.ram[row + 1], bit, shade & 2 != 0);
            }
        }
        self.mem.ram_touched = true;
        log(LogCategory::Cartridge, LogLevel::Debug, || {
            "Camera: capture complete".to_string()
        });
    }

    /// Maps a sensor level to a shade, 0 (white) to 3 (black).
    fn dither(&self, x: usize, y: usize, level: u8) -> u8 {
        let base = MATRIX_BASE + ((y & 3) * 4 + (x & 3)) * 3;
        let thresholds = &self.registers[base..base + 3];
        match thresholds.iter().position(|&t| level < t) {
            Some(0) => 3,
            Some(1) => 2,
            Some(_) => 1,
            None => 0,
        }
    }
}

fn set_bit(byte: &mut u8, mask: u8, on: bool) {
    if on {
        *byte |= mask;
    } else {
        *byte &= !mask;
    }
}

impl Cartridge for Camera {
    fn read(&self, addr: u16) -> Result<u8, EmuError> {
        match addr {
            0x0000..=0x3FFF => Ok(self.mem.rom_byte(0, addr)),
            0x4000..=0x7FFF => Ok(self.mem.rom_byte(usize::from(self.rom_bank), addr)),
            // Only the status register reads back.
            0xA000..=0xBFFF if self.register_mode() => Ok(if addr & 0x7F == 0 {
                self.registers[0] & 0x07
            } else {
                0x00
            }),
            0xA000..=0xBFFF => Ok(self.mem.ram_byte(usize::from(self.ram_bank), addr)),
            _ => Err(unsupported("camera", addr)),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = self.mem.enable_ram(val),
            0x2000..=0x3FFF => self.rom_bank = val & 0x3F,
            0x4000..=0x5FFF => self.ram_bank = val & 0x1F,
            0x6000..=0x7FFF => {}
            0xA000..=0xBFFF if self.register_mode() => {
                let reg = usize::from(addr & 0x7F);
                if reg == 0 {
                    self.registers[0] = val & 0x07;
                    if val & 0x01 != 0 && !self.is_capturing() {
                        self.start_capture();
                    } else if val & 0x01 == 0 {
                        self.busy_cycles = 0;
                    }
                } else if let Some(slot) = self.registers.get_mut(reg) {
                    *slot = val;
                }
            }
            0xA000..=0xBFFF => {
                if self.ram_enabled && !self.is_capturing() {
                    self.mem.set_ram_byte(usize::from(self.ram_bank), addr, val);
                }
            }
            _ => return Err(unsupported("camera", addr)),
        }
        Ok(())
    }

    fn load_rom(&mut self, data: &[u8]) {
        self.mem.load_rom(data);
    }

    fn load_ram(&mut self, data: &[u8]) {
        self.mem.load_ram(data);
    }

    fn rom_data(&self) -> &[u8] {
        &self.mem.rom
    }

    fn ram_data(&self) -> &[u8] {
        &self.mem.ram
    }

    fn is_ram_save_needed(&self) -> bool {
        self.mem.save_needed()
    }

    fn step(&mut self, cycles: u32) {
        if self.busy_cycles == 0 {
            return;
        }
        self.busy_cycles = self.busy_cycles.saturating_sub(cycles);
        if self.busy_cycles == 0 {
            self.finish_capture();
        }
    }
}

impl Stateful for Camera {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        self.mem.capture(&mut state);
        state.put("ram_enabled", self.ram_enabled);
        state.put("rom_bank", self.rom_bank);
        state.put("ram_bank", self.ram_bank);
        state.put("registers", &self.registers[..]);
        state.put("busy_cycles", self.busy_cycles);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.mem.restore(state)?;
        self.ram_enabled = state.get("ram_enabled")?;
        self.rom_bank = state.get("rom_bank")?;
        self.ram_bank = state.get("ram_bank")?;
        state.get_bytes_into("registers", &mut self.registers)?;
        self.busy_cycles = state.get("busy_cycles")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let mut cam = Camera::new(vec![0; 0x10000]);
        cam.write(0x0000, 0x0A).unwrap();
        cam
    }

    fn select_registers(cam: &mut Camera) {
        cam.write(0x4000, 0x10).unwrap();
    }

    #[test]
    fn test_register_bank_hides_ram() {
        let mut cam = camera();
        cam.write(0xA000, 0x55).unwrap();
        select_registers(&mut cam);
        assert_eq!(cam.read(0xA000).unwrap(), 0);
        cam.write(0x4000, 0x00).unwrap();
        assert_eq!(cam.read(0xA000).unwrap(), 0x55);
    }

    #[test]
    fn test_capture_timing() {
        let mut cam = camera();
        select_registers(&mut cam);
        cam.write(0xA001, 0x80).unwrap();
        cam.write(0xA002, 0x00).unwrap();
        cam.write(0xA003, 0x10).unwrap();
        cam.write(0xA000, 0x01).unwrap();
        assert_eq!(cam.read(0xA000).unwrap() & 1, 1);

        let total = (32446 + 16 * 0x10) * 4;
        cam.step(total - 1);
        assert!(cam.is_capturing());
        cam.step(1);
        assert!(!cam.is_capturing());
        assert_eq!(cam.read(0xA000).unwrap() & 1, 0);
    }

    #[test]
    fn test_dithered_picture_lands_in_ram() {
        let mut cam = camera();
        cam.set_sensor_image(&vec![0x40; SENSOR_WIDTH * SENSOR_HEIGHT]);
        select_registers(&mut cam);
        // Every matrix cell: 0x20 / 0x80 / 0xC0, so 0x40 falls between the
        // first and second threshold.
        for cell in 0..16 {
            let base = 0xA000 + (MATRIX_BASE + cell * 3) as u16;
            cam.write(base, 0x20).unwrap();
            cam.write(base + 1, 0x80).unwrap();
            cam.write(base + 2, 0xC0).unwrap();
        }
        cam.write(0xA000, 0x01).unwrap();
        cam.step(u32::MAX);

        // Shade 2: low plane clear, high plane set.
        let ram = cam.ram_data();
        assert_eq!(ram[IMAGE_OFFSET], 0x00);
        assert_eq!(ram[IMAGE_OFFSET + 1], 0xFF);
        let last = IMAGE_OFFSET + 16 * 14 * 16 - 1;
        assert_eq!(ram[last], 0xFF);
        assert_eq!(ram[IMAGE_OFFSET - 1], 0x00);
        assert!(cam.is_ram_save_needed());
    }

    #[test]
    fn test_rom_bank_zero_selectable() {
        let rom: Vec<u8> = (0..8 * 0x4000).map(|i| (i / 0x4000) as u8).collect();
        let mut cam = Camera::new(rom);
        cam.write(0x2000, 0).unwrap();
        assert_eq!(cam.read(0x4000).unwrap(), 0);
        cam.write(0x2000, 5).unwrap();
        assert_eq!(cam.read(0x4000).unwrap(), 5);
    }

    #[test]
    fn test_state_keeps_pending_capture() {
        let mut cam = camera();
        select_registers(&mut cam);
        cam.write(0xA000, 0x01).unwrap();
        cam.step(1000);
        let state = cam.capture_state();
        let mut other = Camera::new(vec![0; 0x10000]);
        other.restore_state(&state).unwrap();
        assert!(other.is_capturing());
        assert_eq!(other.busy_cycles, cam.busy_cycles);
    }
}
