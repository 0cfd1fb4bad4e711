//! Core simulation primitives and traits.
//!
//! Machine crates build on these pieces: a [`ClockConfiguration`] shared by
//! every device, the [`Cpu`]/[`CpuBus`] boundary, the [`cartridge`]
//! contract, the SN76489 [`apu`], [`Stateful`] capture for the
//! [`savestate`] codec, and the real-time [`scheduler`] that drives a
//! [`Machine`] on its own thread.

pub mod apu;
pub mod cartridge;
pub mod clock;
pub mod config;
pub mod cpu;
pub mod error;
pub mod logging;
pub mod savestate;
pub mod scheduler;
pub mod state;

pub use clock::ClockConfiguration;
pub use config::{EmulationConfig, Region};
pub use cpu::{Cpu, CpuBus, HaltedCpu};
pub use error::EmuError;
pub use state::{StateMap, Stateful};

pub mod types {
    use serde::{Deserialize, Serialize};

    /// A completed picture, 4 bytes per pixel in B, G, R, A order.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u8>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height * 4) as usize],
            }
        }

        /// Store an opaque colour at (x, y).
        pub fn set_rgb(&mut self, x: u32, y: u32, (r, g, b): (u8, u8, u8)) {
            let offset = ((y * self.width + x) * 4) as usize;
            self.pixels[offset..offset + 4].copy_from_slice(&[b, g, r, 0xFF]);
        }

        /// Colour at (x, y) as (r, g, b).
        pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
            let offset = ((y * self.width + x) * 4) as usize;
            (
                self.pixels[offset + 2],
                self.pixels[offset + 1],
                self.pixels[offset],
            )
        }
    }

    /// The part of a [`Frame`] that shows picture content.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Viewport {
        pub x: u32,
        pub y: u32,
        pub width: u32,
        pub height: u32,
    }

    pub type AudioSample = i16;
}

use types::{Frame, Viewport};

/// Description of a mount point (media slot) that a machine supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Unique identifier for this mount point (e.g., "Cartridge", "SaveRam")
    pub id: String,
    /// User-friendly name for display (e.g., "Cartridge Slot")
    pub name: String,
    /// File extensions accepted by this mount point (e.g., ["sms", "gg"])
    pub extensions: Vec<String>,
    /// Whether this mount point is required for the machine to run
    pub required: bool,
}

/// Everything one emulated frame produced.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// The picture completed during this frame, if any.
    pub frame: Option<Frame>,
    /// Interleaved stereo samples for this frame.
    pub samples: Vec<types::AudioSample>,
    /// Active picture rectangle inside `frame`.
    pub viewport: Viewport,
}

/// A complete machine: CPU collaborator, bus, video, audio and cartridge.
///
/// The scheduler owns the machine on its own thread, so it must be `Send`.
pub trait Machine: Send {
    /// Identifier stamped into save states (at most 16 bytes are kept).
    fn machine_id(&self) -> &'static str;

    fn clock(&self) -> &ClockConfiguration;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Run one frame's worth of master cycles.
    fn run_frame(&mut self) -> Result<FrameOutput, EmuError>;

    /// Note: save states never include ROM contents.
    fn capture_state(&self) -> StateMap;

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError>;

    /// Apply a new configuration between frames.
    fn apply_config(&mut self, config: &EmulationConfig) -> Result<(), EmuError>;

    /// Get the list of mount points this machine supports
    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Load media into a specific mount point
    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), EmuError>;

    /// Unload media from a specific mount point
    fn unmount(&mut self, mount_point_id: &str) -> Result<(), EmuError>;

    /// Check if a mount point has media loaded
    fn is_mounted(&self, mount_point_id: &str) -> bool;

    /// Cartridge RAM worth writing back to disk, if any.
    fn save_ram(&self) -> Option<Vec<u8>> {
        None
    }

    /// Encode the current state as a save-state blob.
    fn save_state_blob(&self) -> Result<Vec<u8>, EmuError> {
        Ok(savestate::encode(self.machine_id(), &self.capture_state())?)
    }

    /// Validate and apply a save-state blob. On failure the machine is left
    /// exactly as it was.
    fn load_state_blob(&mut self, blob: &[u8]) -> Result<(), EmuError> {
        let state = savestate::decode(blob, self.machine_id())?;
        let backup = self.capture_state();
        if let Err(err) = self.restore_state(&state) {
            self.restore_state(&backup)?;
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_initialization() {
        let f = types::Frame::new(10, 10);
        assert_eq!(f.pixels.len(), 400);
        assert_eq!(f.width, 10);
        assert_eq!(f.height, 10);
    }

    #[test]
    fn frame_pixels_are_bgra() {
        let mut f = types::Frame::new(2, 2);
        f.set_rgb(1, 1, (0x11, 0x22, 0x33));
        assert_eq!(&f.pixels[12..16], &[0x33, 0x22, 0x11, 0xFF]);
        assert_eq!(f.rgb(1, 1), (0x11, 0x22, 0x33));
    }

    struct MockMachine {
        clock: ClockConfiguration,
        counter: u32,
        mounted: bool,
    }

    impl MockMachine {
        fn new() -> Self {
            Self {
                clock: ClockConfiguration::new(1_000.0, 10.0, 10, 100).unwrap(),
                counter: 0,
                mounted: false,
            }
        }
    }

    impl Machine for MockMachine {
        fn machine_id(&self) -> &'static str {
            "mock"
        }

        fn clock(&self) -> &ClockConfiguration {
            &self.clock
        }

        fn reset(&mut self) {
            self.counter = 0;
        }

        fn run_frame(&mut self) -> Result<FrameOutput, EmuError> {
            self.counter += 1;
            Ok(FrameOutput {
                frame: Some(types::Frame::new(2, 2)),
                ..Default::default()
            })
        }

        fn capture_state(&self) -> StateMap {
            let mut state = StateMap::new();
            state.put("counter", self.counter);
            state
        }

        fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
            self.counter = state.get("counter")?;
            if self.counter == 13 {
                return Err(EmuError::State("unlucky".into()));
            }
            Ok(())
        }

        fn apply_config(&mut self, _config: &EmulationConfig) -> Result<(), EmuError> {
            Ok(())
        }

        fn mount_points(&self) -> Vec<MountPointInfo> {
            vec![MountPointInfo {
                id: "test".to_string(),
                name: "Test Slot".to_string(),
                extensions: vec!["bin".to_string()],
                required: false,
            }]
        }

        fn mount(&mut self, _mount_point_id: &str, _data: &[u8]) -> Result<(), EmuError> {
            self.mounted = true;
            Ok(())
        }

        fn unmount(&mut self, _mount_point_id: &str) -> Result<(), EmuError> {
            self.mounted = false;
            Ok(())
        }

        fn is_mounted(&self, _mount_point_id: &str) -> bool {
            self.mounted
        }
    }

    #[test]
    fn mock_machine_blob_roundtrip() {
        let mut machine = MockMachine::new();
        machine.run_frame().unwrap();
        machine.run_frame().unwrap();
        let blob = machine.save_state_blob().unwrap();

        let mut other = MockMachine::new();
        other.load_state_blob(&blob).unwrap();
        assert_eq!(other.counter, 2);
    }

    #[test]
    fn failed_restore_rolls_back() {
        let mut source = MockMachine::new();
        source.counter = 13;
        let blob = source.save_state_blob().unwrap();

        let mut machine = MockMachine::new();
        machine.counter = 7;
        assert!(machine.load_state_blob(&blob).is_err());
        assert_eq!(machine.counter, 7);
    }

    #[test]
    fn corrupted_blob_leaves_machine_untouched() {
        let mut machine = MockMachine::new();
        machine.counter = 5;
        let mut blob = machine.save_state_blob().unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;

        machine.counter = 9;
        assert!(matches!(
            machine.load_state_blob(&blob),
            Err(EmuError::SaveState(_))
        ));
        assert_eq!(machine.counter, 9);
    }

    #[test]
    fn test_machine_mount_operations() {
        let mut machine = MockMachine::new();
        assert_eq!(machine.mount_points()[0].id, "test");
        assert!(!machine.is_mounted("test"));
        machine.mount("test", &[1, 2, 3]).unwrap();
        assert!(machine.is_mounted("test"));
        machine.unmount("test").unwrap();
        assert!(!machine.is_mounted("test"));
    }
}
