//! SN76489-family Programmable Sound Generator
//!
//! Used by the SG-1000 (TI SN76489AN), the Master System (Sega's integrated
//! SN76496 clone) and the Game Gear (the same clone plus a stereo port).
//!
//! # Architecture
//! - 3 square wave tone channels with 10-bit reload values
//! - 1 noise channel driven by a linear feedback shift register
//! - 4-bit attenuation per channel, 2 dB per step, 15 = silent
//! - Every counter is clocked once per 16 master cycles
//!
//! # Variants
//! The variants differ only in data, so they are described by
//! [`NoiseConfig`] and [`OutputGate`] rather than by separate code paths:
//!
//! | Variant    | LFSR   | Taps   | Reset  | Gate     | Stereo |
//! |------------|--------|--------|--------|----------|--------|
//! | `Ti`       | 15 bit | 0x0003 | 0x4000 | unipolar | no     |
//! | `Sega`     | 16 bit | 0x0009 | 0x8000 | unipolar | no     |
//! | `GameGear` | 16 bit | 0x0009 | 0x8000 | bipolar  | yes    |

use serde::{Deserialize, Serialize};

use crate::apu::AudioChip;
use crate::clock::ClockConfiguration;
use crate::logging::{log, LogCategory, LogLevel};
use crate::state::{StateMap, Stateful};
use crate::EmuError;

/// Master cycles per internal PSG clock.
pub const CLOCK_DIVIDER: u32 = 16;

/// 8191 * 10^(-i/10), i.e. 2 dB steps with the last entry forced to silence.
pub const VOLUME_TABLE: [i16; 16] = [
    8191, 6506, 5168, 4105, 3261, 2590, 2057, 1634, 1298, 1031, 819, 651, 517, 411, 326, 0,
];

/// Noise shift register shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseConfig {
    pub width: u32,
    pub taps: u16,
    pub reset: u16,
}

/// How a channel's flip-flop is turned into an amplitude multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputGate {
    /// off = 0.0, on = 1.0
    Unipolar,
    /// off = -0.5, on = +0.5
    Bipolar,
}

impl OutputGate {
    fn level(self, on: bool) -> f32 {
        match (self, on) {
            (OutputGate::Unipolar, true) => 1.0,
            (OutputGate::Unipolar, false) => 0.0,
            (OutputGate::Bipolar, true) => 0.5,
            (OutputGate::Bipolar, false) => -0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsgVariant {
    Ti,
    Sega,
    GameGear,
}

impl PsgVariant {
    pub fn noise(self) -> NoiseConfig {
        match self {
            PsgVariant::Ti => NoiseConfig {
                width: 15,
                taps: 0x0003,
                reset: 0x4000,
            },
            PsgVariant::Sega | PsgVariant::GameGear => NoiseConfig {
                width: 16,
                taps: 0x0009,
                reset: 0x8000,
            },
        }
    }

    pub fn gate(self) -> OutputGate {
        match self {
            PsgVariant::GameGear => OutputGate::Bipolar,
            PsgVariant::Ti | PsgVariant::Sega => OutputGate::Unipolar,
        }
    }

    pub fn has_stereo(self) -> bool {
        self == PsgVariant::GameGear
    }
}

/// SN76489 PSG state
pub struct Sn76489 {
    variant: PsgVariant,
    noise_config: NoiseConfig,

    tone_registers: [u16; 3],
    noise_register: u8,
    volume_registers: [u8; 4],

    counters: [u16; 4],
    // Index 3 is the noise flip-flop, not the audible noise bit.
    outputs: [bool; 4],
    lfsr: u16,

    latched_channel: u8,
    latched_volume: bool,

    // Bits 0-3 route channels to the right, bits 4-7 to the left.
    stereo: u8,

    divider: u32,
    cycles_per_sample: f64,
    cycles_per_frame: u32,
    sample_cycles: f64,
    frame_cycles: u32,

    buffer: Vec<i16>,
    completed: Vec<Vec<i16>>,
}

impl Sn76489 {
    pub fn new(variant: PsgVariant, clock: &ClockConfiguration) -> Self {
        let noise_config = variant.noise();
        Self {
            variant,
            noise_config,
            tone_registers: [0; 3],
            noise_register: 0,
            volume_registers: [0x0F; 4],
            counters: [0; 4],
            outputs: [false; 4],
            lfsr: noise_config.reset,
            latched_channel: 0,
            latched_volume: false,
            stereo: 0xFF,
            divider: 0,
            cycles_per_sample: clock.cycles_per_sample(),
            cycles_per_frame: clock.cycles_per_frame(),
            sample_cycles: 0.0,
            frame_cycles: 0,
            buffer: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn variant(&self) -> PsgVariant {
        self.variant
    }

    /// Latch/data byte from the CPU.
    pub fn write_data(&mut self, data: u8) {
        if data & 0x80 != 0 {
            self.latched_channel = (data >> 5) & 0x03;
            self.latched_volume = data & 0x10 != 0;
            self.apply_low_bits(data & 0x0F);
        } else {
            self.apply_high_bits(data);
        }
    }

    fn apply_low_bits(&mut self, bits: u8) {
        let channel = self.latched_channel as usize;
        if self.latched_volume {
            self.volume_registers[channel] = bits;
        } else if channel == 3 {
            self.write_noise(bits);
        } else {
            self.tone_registers[channel] = (self.tone_registers[channel] & 0x3F0) | u16::from(bits);
        }
    }

    fn apply_high_bits(&mut self, data: u8) {
        let channel = self.latched_channel as usize;
        if self.latched_volume {
            self.volume_registers[channel] = data & 0x0F;
        } else if channel == 3 {
            self.write_noise(data & 0x0F);
        } else {
            self.tone_registers[channel] =
                (self.tone_registers[channel] & 0x00F) | (u16::from(data & 0x3F) << 4);
        }
    }

    fn write_noise(&mut self, bits: u8) {
        self.noise_register = bits & 0x07;
        self.lfsr = self.noise_config.reset;
    }

    /// Game Gear stereo routing byte.
    pub fn write_stereo(&mut self, val: u8) -> Result<(), EmuError> {
        if !self.variant.has_stereo() {
            return Err(EmuError::UnsupportedPort {
                device: "psg",
                port: 0x06,
            });
        }
        self.stereo = val;
        Ok(())
    }

    fn noise_reload(&self) -> u16 {
        match self.noise_register & 0x03 {
            0 => 0x10,
            1 => 0x20,
            2 => 0x40,
            _ => self.tone_registers[2],
        }
    }

    fn shift_lfsr(&mut self) {
        let feedback = if self.noise_register & 0x04 != 0 {
            (self.lfsr & self.noise_config.taps).count_ones() as u16 & 1
        } else {
            self.lfsr & 1
        };
        self.lfsr = (self.lfsr >> 1) | (feedback << (self.noise_config.width - 1));
    }

    /// One internal clock: every counter counts down and reloads on
    /// reaching zero.
    fn clock_channels(&mut self) {
        for ch in 0..3 {
            self.counters[ch] = self.counters[ch].saturating_sub(1);
            if self.counters[ch] == 0 {
                let reload = self.tone_registers[ch];
                self.counters[ch] = reload;
                // Reload values of 0 and 1 hold the output high; used for
                // sample playback.
                self.outputs[ch] = reload <= 1 || !self.outputs[ch];
            }
        }

        self.counters[3] = self.counters[3].saturating_sub(1);
        if self.counters[3] == 0 {
            self.counters[3] = self.noise_reload();
            self.outputs[3] = !self.outputs[3];
            if self.outputs[3] {
                self.shift_lfsr();
            }
        }
    }

    fn channel_on(&self, ch: usize) -> bool {
        if ch == 3 {
            self.lfsr & 1 != 0
        } else {
            self.outputs[ch]
        }
    }

    fn mix(&self) -> (i16, i16) {
        let gate = self.variant.gate();
        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for ch in 0..4 {
            let volume = f32::from(VOLUME_TABLE[self.volume_registers[ch] as usize]);
            let amplitude = volume * gate.level(self.channel_on(ch));
            if self.stereo & (0x10 << ch) != 0 {
                left += amplitude;
            }
            if self.stereo & (0x01 << ch) != 0 {
                right += amplitude;
            }
        }
        let clamp = |v: f32| v.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        (clamp(left), clamp(right))
    }

    pub fn pending_frames(&self) -> usize {
        self.completed.len()
    }
}

impl AudioChip for Sn76489 {
    fn write_port(&mut self, port: u8, val: u8) -> Result<(), EmuError> {
        log(LogCategory::Audio, LogLevel::Trace, || {
            format!("PSG: port {port:02X} <- {val:02X}")
        });
        match port {
            0x06 => self.write_stereo(val),
            0x40..=0x7F => {
                self.write_data(val);
                Ok(())
            }
            _ => Err(EmuError::UnsupportedPort {
                device: "psg",
                port,
            }),
        }
    }

    fn step(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.divider += 1;
            if self.divider == CLOCK_DIVIDER {
                self.divider = 0;
                self.clock_channels();
            }

            self.sample_cycles += 1.0;
            if self.sample_cycles >= self.cycles_per_sample {
                self.sample_cycles -= self.cycles_per_sample;
                let (left, right) = self.mix();
                self.buffer.push(left);
                self.buffer.push(right);
            }

            self.frame_cycles += 1;
            if self.frame_cycles >= self.cycles_per_frame {
                self.frame_cycles = 0;
                self.completed.push(std::mem::take(&mut self.buffer));
            }
        }
    }

    fn set_clock(&mut self, clock: &ClockConfiguration) {
        self.cycles_per_sample = clock.cycles_per_sample();
        self.cycles_per_frame = clock.cycles_per_frame();
        self.sample_cycles = 0.0;
        self.frame_cycles = 0;
    }

    fn take_samples(&mut self) -> Vec<i16> {
        let mut out = Vec::with_capacity(self.completed.iter().map(Vec::len).sum());
        for frame in self.completed.drain(..) {
            out.extend(frame);
        }
        out
    }

    fn reset(&mut self) {
        self.tone_registers = [0; 3];
        self.noise_register = 0;
        self.volume_registers = [0x0F; 4];
        self.counters = [0; 4];
        self.outputs = [false; 4];
        self.lfsr = self.noise_config.reset;
        self.latched_channel = 0;
        self.latched_volume = false;
        self.stereo = 0xFF;
        self.divider = 0;
        self.sample_cycles = 0.0;
        self.frame_cycles = 0;
        self.buffer.clear();
        self.completed.clear();
    }
}

impl Stateful for Sn76489 {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("tone_registers", &self.tone_registers[..]);
        state.put("noise_register", self.noise_register);
        state.put("volume_registers", &self.volume_registers[..]);
        state.put("counters", &self.counters[..]);
        state.put("outputs", &self.outputs[..]);
        state.put("lfsr", self.lfsr);
        state.put("latched_channel", self.latched_channel);
        state.put("latched_volume", self.latched_volume);
        state.put("stereo", self.stereo);
        state.put("divider", self.divider);
        state.put("sample_cycles", self.sample_cycles);
        state.put("frame_cycles", self.frame_cycles);
        state.put("buffer", self.buffer.clone());
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.tone_registers = state.get("tone_registers")?;
        self.noise_register = state.get("noise_register")?;
        self.volume_registers = state.get("volume_registers")?;
        self.counters = state.get("counters")?;
        self.outputs = state.get("outputs")?;
        self.lfsr = state.get("lfsr")?;
        self.latched_channel = state.get("latched_channel")?;
        self.latched_volume = state.get("latched_volume")?;
        self.stereo = state.get("stereo")?;
        self.divider = state.get("divider")?;
        self.sample_cycles = state.get("sample_cycles")?;
        self.frame_cycles = state.get("frame_cycles")?;
        self.buffer = state.get("buffer")?;
        self.completed.clear();
        Ok(())
    }
}
