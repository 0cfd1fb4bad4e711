//! Game Boy machine: CPU collaborator plus [`GbBus`].
//!
//! The hardware model (monochrome or Color) is fixed when a cartridge is
//! inserted: colour-only cartridges always run on the Color, dual-mode
//! cartridges follow `EmulationConfig::prefer_color`.

use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{
    ClockConfiguration, Cpu, EmuError, EmulationConfig, FrameOutput, HaltedCpu, Machine,
    MountPointInfo, StateMap, Stateful,
};

use crate::bus::GbBus;
use crate::header::{CartridgeHeader, CgbSupport};
use crate::mappers::{Camera, GbMapper};
use crate::ppu::{CYCLES_PER_FRAME, LINES_PER_FRAME};
use crate::GbError;

pub const CARTRIDGE_MOUNT: &str = "Cartridge";
pub const SAVE_RAM_MOUNT: &str = "SaveRam";

const MASTER_CLOCK_HZ: f64 = 4_194_304.0;

fn clock_for(sample_rate: u32) -> Result<ClockConfiguration, EmuError> {
    ClockConfiguration::new(
        MASTER_CLOCK_HZ,
        MASTER_CLOCK_HZ / f64::from(CYCLES_PER_FRAME),
        LINES_PER_FRAME,
        sample_rate,
    )
}

pub struct GbMachine {
    clock: ClockConfiguration,
    prefer_color: bool,
    cpu: Box<dyn Cpu<GbBus> + Send>,
    bus: GbBus,
    header: Option<CartridgeHeader>,
    // Cycles the last frame ran past its budget.
    overshoot: u32,
    // Fractional silent sample pairs carried between frames.
    sample_phase: f64,
}

impl GbMachine {
    /// Machine with the halted CPU stand-in; install a real core with
    /// [`GbMachine::set_cpu`].
    pub fn new(config: &EmulationConfig) -> Result<Self, EmuError> {
        config.validate()?;
        Ok(Self {
            clock: clock_for(config.sample_rate)?,
            prefer_color: config.prefer_color,
            cpu: Box::new(HaltedCpu::new()),
            bus: GbBus::new(false),
            header: None,
            overshoot: 0,
            sample_phase: 0.0,
        })
    }

    pub fn set_cpu(&mut self, mut cpu: Box<dyn Cpu<GbBus> + Send>) {
        cpu.reset();
        self.cpu = cpu;
    }

    pub fn is_cgb(&self) -> bool {
        self.bus.is_cgb()
    }

    pub fn header(&self) -> Option<&CartridgeHeader> {
        self.header.as_ref()
    }

    pub fn bus(&self) -> &GbBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut GbBus {
        &mut self.bus
    }

    /// Held buttons, see [`crate::buttons`].
    pub fn set_buttons(&mut self, pressed: u8) {
        self.bus.set_buttons(pressed);
    }

    /// The Pocket Camera board, when one is inserted.
    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.bus.cartridge.as_mut().and_then(GbMapper::camera_mut)
    }

    /// Bytes sent over the link cable since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.bus.take_serial_output()
    }

    fn insert_cartridge(&mut self, data: &[u8]) -> Result<(), EmuError> {
        let header = CartridgeHeader::parse(data)?;
        let cgb = match header.cgb {
            CgbSupport::Required => true,
            CgbSupport::Enhanced => self.prefer_color,
            CgbSupport::None => false,
        };
        if !header.checksum_valid {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("\"{}\": header checksum mismatch", header.title)
            });
        }
        if header.rom_size != data.len() {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "header declares {} KiB, image holds {} KiB",
                    header.rom_size / 1024,
                    data.len() / 1024
                )
            });
        }
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!(
                "\"{}\": {} KiB, {} board, {} KiB RAM, {} mode",
                header.title,
                data.len() / 1024,
                header.kind.name(),
                header.ram_size / 1024,
                if cgb { "colour" } else { "monochrome" }
            )
        });

        let mut bus = GbBus::new(cgb);
        bus.cartridge = Some(GbMapper::new(&header, data.to_vec()));
        self.bus = bus;
        self.header = Some(header);
        self.reset();
        Ok(())
    }

    fn silent_samples(&mut self) -> Vec<i16> {
        let pairs = self.sample_phase + self.clock.samples_per_frame();
        let whole = pairs.floor();
        self.sample_phase = pairs - whole;
        vec![0; whole as usize * 2]
    }
}

impl Machine for GbMachine {
    fn machine_id(&self) -> &'static str {
        if self.bus.is_cgb() {
            "gbc"
        } else {
            "gb"
        }
    }

    fn clock(&self) -> &ClockConfiguration {
        &self.clock
    }

    fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.overshoot = 0;
        self.sample_phase = 0.0;
    }

    fn run_frame(&mut self) -> Result<FrameOutput, EmuError> {
        if self.bus.cartridge.is_none() {
            return Err(GbError::NoCartridge.into());
        }
        let budget = self.clock.cycles_per_frame().saturating_sub(self.overshoot);
        let used = self.cpu.run_cycles(&mut self.bus, budget)?;
        self.overshoot = used.saturating_sub(budget);

        self.bus.take_frame_ready();
        Ok(FrameOutput {
            frame: self.bus.ppu.take_frame(),
            samples: self.silent_samples(),
            viewport: self.bus.ppu().viewport(),
        })
    }

    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("model", self.machine_id());
        state.put("overshoot", self.overshoot);
        state.put("sample_phase", self.sample_phase);
        state.insert_scope("cpu", self.cpu.capture_state());
        state.insert_scope("bus", self.bus.capture_state());
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let model: String = state.get("model")?;
        if model != self.machine_id() {
            return Err(GbError::ModelMismatch {
                expected: self.machine_id(),
                found: model,
            }
            .into());
        }
        self.overshoot = state.get("overshoot")?;
        self.sample_phase = state.get("sample_phase")?;
        self.cpu.restore_state(&state.scope("cpu"))?;
        self.bus.restore_state(&state.scope("bus"))
    }

    fn apply_config(&mut self, config: &EmulationConfig) -> Result<(), EmuError> {
        config.validate()?;
        if config.prefer_color != self.prefer_color {
            log(LogCategory::Cartridge, LogLevel::Info, || {
                "colour preference applies from the next cartridge".to_string()
            });
        }
        self.clock = clock_for(config.sample_rate)?;
        self.prefer_color = config.prefer_color;
        Ok(())
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![
            MountPointInfo {
                id: CARTRIDGE_MOUNT.to_string(),
                name: "Cartridge Slot".to_string(),
                extensions: vec!["gb".to_string(), "gbc".to_string()],
                required: true,
            },
            MountPointInfo {
                id: SAVE_RAM_MOUNT.to_string(),
                name: "Battery RAM".to_string(),
                extensions: vec!["sav".to_string()],
                required: false,
            },
        ]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), EmuError> {
        match mount_point_id {
            CARTRIDGE_MOUNT => self.insert_cartridge(data),
            SAVE_RAM_MOUNT => match &mut self.bus.cartridge {
                Some(cart) => {
                    cart.load_ram(data);
                    Ok(())
                }
                None => Err(GbError::NoCartridge.into()),
            },
            other => Err(GbError::InvalidMountPoint(other.to_string()).into()),
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), EmuError> {
        match mount_point_id {
            CARTRIDGE_MOUNT => {
                self.bus.cartridge = None;
                self.header = None;
                Ok(())
            }
            SAVE_RAM_MOUNT => Ok(()),
            other => Err(GbError::InvalidMountPoint(other.to_string()).into()),
        }
    }

    fn save_ram(&self) -> Option<Vec<u8>> {
        self.bus
            .cartridge
            .as_ref()
            .filter(|cart| cart.is_ram_save_needed())
            .map(|cart| cart.save_data())
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        match mount_point_id {
            CARTRIDGE_MOUNT => self.bus.cartridge.is_some(),
            SAVE_RAM_MOUNT => self
                .bus
                .cartridge
                .as_ref()
                .is_some_and(|cart| !cart.ram_data().is_empty()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{header_checksum, test_rom};
    use emu_core::CpuBus;

    fn rom_with_flag(cart_type: u8, cgb_flag: u8) -> Vec<u8> {
        let mut rom = test_rom(cart_type, 1, 0x02);
        rom[0x143] = cgb_flag;
        rom[0x14D] = header_checksum(&rom);
        rom
    }

    fn machine(rom: &[u8]) -> GbMachine {
        let mut machine = GbMachine::new(&EmulationConfig::default()).unwrap();
        machine.mount(CARTRIDGE_MOUNT, rom).unwrap();
        machine
    }

    #[test]
    fn test_clock_matches_lcd_timing() {
        let machine = GbMachine::new(&EmulationConfig::default()).unwrap();
        assert_eq!(machine.clock().cycles_per_scanline(), 456);
        assert_eq!(machine.clock().cycles_per_frame(), 70224);
    }

    #[test]
    fn test_model_follows_header() {
        assert_eq!(machine(&rom_with_flag(0x00, 0x00)).machine_id(), "gb");
        assert_eq!(machine(&rom_with_flag(0x00, 0xC0)).machine_id(), "gbc");
        assert_eq!(machine(&rom_with_flag(0x00, 0x80)).machine_id(), "gbc");

        let config = EmulationConfig {
            prefer_color: false,
            ..EmulationConfig::default()
        };
        let mut mono = GbMachine::new(&config).unwrap();
        mono.mount(CARTRIDGE_MOUNT, &rom_with_flag(0x00, 0x80)).unwrap();
        assert_eq!(mono.machine_id(), "gb");
        mono.mount(CARTRIDGE_MOUNT, &rom_with_flag(0x00, 0xC0)).unwrap();
        assert_eq!(mono.machine_id(), "gbc");
    }

    #[test]
    fn test_unknown_cartridge_rejected() {
        let mut machine = GbMachine::new(&EmulationConfig::default()).unwrap();
        assert!(matches!(
            machine.mount(CARTRIDGE_MOUNT, &test_rom(0x22, 0, 0)),
            Err(EmuError::UnimplementedMapper(0x22))
        ));
        assert!(!machine.is_mounted(CARTRIDGE_MOUNT));
        assert!(machine.run_frame().is_err());
    }

    #[test]
    fn test_invalid_mount_point() {
        let mut machine = machine(&rom_with_flag(0x00, 0x00));
        assert!(matches!(
            machine.mount("Tape", &[0]),
            Err(EmuError::Machine(_))
        ));
    }

    #[test]
    fn test_frame_output() {
        let mut machine = machine(&rom_with_flag(0x00, 0x00));
        let output = machine.run_frame().unwrap();
        let frame = output.frame.unwrap();
        assert_eq!((frame.width, frame.height), (160, 144));
        assert_eq!(output.viewport.width, 160);
        let pairs = output.samples.len() / 2;
        assert!((737..=739).contains(&pairs), "{pairs} sample pairs");
        assert!(output.samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_every_frame_has_a_picture() {
        let mut machine = machine(&rom_with_flag(0x00, 0x00));
        for _ in 0..5 {
            assert!(machine.run_frame().unwrap().frame.is_some());
        }
    }

    #[test]
    fn test_battery_ram_and_save_mount() {
        let mut machine = machine(&rom_with_flag(0x03, 0x00));
        assert!(machine.save_ram().is_none());
        machine.bus_mut().write(0x0000, 0x0A).unwrap();
        machine.bus_mut().write(0xA000, 0x77).unwrap();
        let ram = machine.save_ram().unwrap();
        assert_eq!(ram.len(), 0x2000);
        assert_eq!(ram[0], 0x77);

        let mut other = self::machine(&rom_with_flag(0x03, 0x00));
        other.mount(SAVE_RAM_MOUNT, &ram).unwrap();
        other.bus_mut().write(0x0000, 0x0A).unwrap();
        assert_eq!(other.bus_mut().read(0xA000).unwrap(), 0x77);
    }

    #[test]
    fn test_camera_access() {
        let mut machine = machine(&rom_with_flag(0xFC, 0x00));
        assert!(machine.camera_mut().is_some());
        let mut plain = self::machine(&rom_with_flag(0x00, 0x00));
        assert!(plain.camera_mut().is_none());
    }

    #[test]
    fn test_state_blob_roundtrip() {
        let mut machine = machine(&rom_with_flag(0x03, 0x80));
        machine.bus_mut().write(0xC000, 0x5A).unwrap();
        machine.run_frame().unwrap();
        let blob = machine.save_state_blob().unwrap();

        let mut other = self::machine(&rom_with_flag(0x03, 0x80));
        other.load_state_blob(&blob).unwrap();
        assert_eq!(other.bus_mut().read(0xC000).unwrap(), 0x5A);
        assert_eq!(other.capture_state(), machine.capture_state());
    }

    #[test]
    fn test_sample_carry_survives_restore() {
        let mut machine = machine(&rom_with_flag(0x00, 0x00));
        machine.run_frame().unwrap();
        machine.run_frame().unwrap();
        let blob = machine.save_state_blob().unwrap();

        let mut other = self::machine(&rom_with_flag(0x00, 0x00));
        other.load_state_blob(&blob).unwrap();
        assert_eq!(other.sample_phase.to_bits(), machine.sample_phase.to_bits());
        for _ in 0..4 {
            assert_eq!(
                other.run_frame().unwrap().samples.len(),
                machine.run_frame().unwrap().samples.len()
            );
        }
    }

    #[test]
    fn test_state_from_other_model_rejected() {
        let color = machine(&rom_with_flag(0x00, 0xC0));
        let state = color.capture_state();
        let mut mono = machine(&rom_with_flag(0x00, 0x00));
        assert!(mono.restore_state(&state).is_err());
    }
}
