//! Audio chip trait for pluggable sound generators.
//!
//! A chip is clocked in master cycles by the machine bus and hands out its
//! samples once per completed frame, so the scheduler never sees a partial
//! frame of audio.

use crate::clock::ClockConfiguration;
use crate::state::Stateful;
use crate::EmuError;

pub trait AudioChip: Stateful + Send {
    /// Port write from the CPU.
    fn write_port(&mut self, port: u8, val: u8) -> Result<(), EmuError>;

    /// Advance by `cycles` master cycles.
    fn step(&mut self, cycles: u32);

    /// Adopt a new clock configuration (sample rate, region change).
    fn set_clock(&mut self, clock: &ClockConfiguration);

    /// Interleaved stereo samples of every frame completed since the last
    /// call.
    fn take_samples(&mut self) -> Vec<i16>;

    /// Reset the chip to power-on state
    fn reset(&mut self);
}
