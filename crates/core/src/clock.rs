//! Master clock bookkeeping.
//!
//! Every machine is driven by a single master clock. Video, audio and the
//! scheduler derive their cadence from the same four inputs so that a frame
//! always lasts exactly `cycles_per_frame` master cycles.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::EmuError;

/// Master clock, refresh rate, scanline count and output sample rate plus the
/// values derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfiguration {
    master_clock_hz: f64,
    refresh_rate_hz: f64,
    scanlines_per_frame: u32,
    sample_rate: u32,
    cycles_per_scanline: u32,
    cycles_per_frame: u32,
    cycles_per_sample: f64,
}

impl ClockConfiguration {
    pub fn new(
        master_clock_hz: f64,
        refresh_rate_hz: f64,
        scanlines_per_frame: u32,
        sample_rate: u32,
    ) -> Result<Self, EmuError> {
        let mut clock = Self {
            master_clock_hz,
            refresh_rate_hz,
            scanlines_per_frame,
            sample_rate,
            cycles_per_scanline: 0,
            cycles_per_frame: 0,
            cycles_per_sample: 0.0,
        };
        clock.recompute()?;
        Ok(clock)
    }

    fn recompute(&mut self) -> Result<(), EmuError> {
        if !(self.master_clock_hz > 0.0) || !(self.refresh_rate_hz > 0.0) {
            return Err(EmuError::Configuration(format!(
                "master clock ({} Hz) and refresh rate ({} Hz) must be nonzero",
                self.master_clock_hz, self.refresh_rate_hz
            )));
        }
        if self.scanlines_per_frame == 0 {
            return Err(EmuError::Configuration(
                "scanline count must be nonzero".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(EmuError::Configuration(
                "sample rate must be nonzero".to_string(),
            ));
        }

        let per_line = self.master_clock_hz
            / (self.refresh_rate_hz * f64::from(self.scanlines_per_frame));
        self.cycles_per_scanline = per_line.round().max(1.0) as u32;
        self.cycles_per_frame = self.cycles_per_scanline * self.scanlines_per_frame;
        self.cycles_per_sample = f64::from(self.cycles_per_frame)
            / (f64::from(self.sample_rate) / self.refresh_rate_hz);
        Ok(())
    }

    /// Apply `change` to a copy and keep it only if it still validates.
    fn update(&mut self, change: impl FnOnce(&mut Self)) -> Result<(), EmuError> {
        let mut next = self.clone();
        change(&mut next);
        next.recompute()?;
        *self = next;
        Ok(())
    }

    pub fn set_master_clock(&mut self, hz: f64) -> Result<(), EmuError> {
        self.update(|clock| clock.master_clock_hz = hz)
    }

    pub fn set_refresh_rate(&mut self, hz: f64) -> Result<(), EmuError> {
        self.update(|clock| clock.refresh_rate_hz = hz)
    }

    pub fn set_scanlines_per_frame(&mut self, lines: u32) -> Result<(), EmuError> {
        self.update(|clock| clock.scanlines_per_frame = lines)
    }

    pub fn set_sample_rate(&mut self, rate: u32) -> Result<(), EmuError> {
        self.update(|clock| clock.sample_rate = rate)
    }

    pub fn master_clock_hz(&self) -> f64 {
        self.master_clock_hz
    }

    pub fn refresh_rate_hz(&self) -> f64 {
        self.refresh_rate_hz
    }

    pub fn scanlines_per_frame(&self) -> u32 {
        self.scanlines_per_frame
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn cycles_per_scanline(&self) -> u32 {
        self.cycles_per_scanline
    }

    pub fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_frame
    }

    pub fn cycles_per_sample(&self) -> f64 {
        self.cycles_per_sample
    }

    /// Stereo sample pairs produced per frame.
    pub fn samples_per_frame(&self) -> f64 {
        f64::from(self.sample_rate) / self.refresh_rate_hz
    }

    /// Wall-clock length of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_rate_hz)
    }
}
