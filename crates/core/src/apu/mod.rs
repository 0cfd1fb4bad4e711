//! Sound generators.
//!
//! Only the SN76489 family is emulated; the Game Boy machine runs without
//! audio output.

pub mod audio_chip;
pub mod sn76489;

pub use audio_chip::AudioChip;
pub use sn76489::{PsgVariant, Sn76489};
