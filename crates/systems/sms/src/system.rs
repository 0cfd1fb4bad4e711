//! Sega 8-bit machine: CPU collaborator plus [`SmsBus`].

use emu_core::apu::AudioChip;
use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{
    ClockConfiguration, Cpu, EmuError, EmulationConfig, FrameOutput, HaltedCpu, Machine,
    MountPointInfo, Region, StateMap, Stateful,
};

use crate::bus::{SmsBus, SmsModel};
use crate::mappers::{SmsMapper, SmsMapperKind};
use crate::SmsError;

pub const CARTRIDGE_MOUNT: &str = "Cartridge";
pub const SAVE_RAM_MOUNT: &str = "SaveRam";

/// NTSC: 262 lines of 228 cycles at 59.92 Hz. PAL: 313 lines at 49.70 Hz.
fn clock_for(
    model: SmsModel,
    region: Region,
    sample_rate: u32,
) -> Result<ClockConfiguration, EmuError> {
    // The Game Gear LCD only exists in NTSC timing.
    let region = if model == SmsModel::GameGear {
        Region::Ntsc
    } else {
        region
    };
    match region {
        Region::Ntsc => ClockConfiguration::new(3_579_545.0, 59.922743, 262, sample_rate),
        Region::Pal => ClockConfiguration::new(3_546_893.0, 49.701459, 313, sample_rate),
    }
}

pub struct SmsMachine {
    model: SmsModel,
    clock: ClockConfiguration,
    region: Region,
    cpu: Box<dyn Cpu<SmsBus> + Send>,
    bus: SmsBus,
    forced_mapper: Option<SmsMapperKind>,
    // Cycles the last frame ran past its budget.
    overshoot: u32,
}

impl SmsMachine {
    /// Machine with the halted CPU stand-in; install a real core with
    /// [`SmsMachine::set_cpu`].
    pub fn new(model: SmsModel, config: &EmulationConfig) -> Result<Self, EmuError> {
        config.validate()?;
        let clock = clock_for(model, config.region, config.sample_rate)?;
        let mut bus = SmsBus::new(model, config.region, &clock);
        bus.set_japanese(config.japanese_console);
        bus.vdp.set_remove_sprite_limit(config.remove_sprite_limit);
        Ok(Self {
            model,
            clock,
            region: config.region,
            cpu: Box::new(HaltedCpu::new()),
            bus,
            forced_mapper: None,
            overshoot: 0,
        })
    }

    pub fn set_cpu(&mut self, mut cpu: Box<dyn Cpu<SmsBus> + Send>) {
        cpu.reset();
        self.cpu = cpu;
    }

    pub fn model(&self) -> SmsModel {
        self.model
    }

    pub fn bus(&self) -> &SmsBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SmsBus {
        &mut self.bus
    }

    /// Board used for the next cartridge instead of the detected one.
    pub fn force_mapper(&mut self, kind: Option<SmsMapperKind>) {
        self.forced_mapper = kind;
    }

    pub fn mapper_kind(&self) -> Option<SmsMapperKind> {
        self.bus.cartridge.as_ref().map(SmsMapper::kind)
    }

    fn insert_cartridge(&mut self, data: &[u8]) -> Result<(), EmuError> {
        if data.is_empty() {
            return Err(SmsError::EmptyRom.into());
        }
        let rom = data.to_vec();
        let kind = self
            .forced_mapper
            .unwrap_or_else(|| SmsMapperKind::detect(&rom));
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!("{} KiB cartridge, {} board", rom.len() / 1024, kind.name())
        });
        self.bus.cartridge = Some(SmsMapper::new(kind, rom));
        self.reset();
        Ok(())
    }
}

impl Machine for SmsMachine {
    fn machine_id(&self) -> &'static str {
        self.model.machine_id()
    }

    fn clock(&self) -> &ClockConfiguration {
        &self.clock
    }

    fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.overshoot = 0;
    }

    fn run_frame(&mut self) -> Result<FrameOutput, EmuError> {
        if self.bus.cartridge.is_none() {
            return Err(SmsError::NoCartridge.into());
        }
        let budget = self.clock.cycles_per_frame().saturating_sub(self.overshoot);
        let used = self.cpu.run_cycles(&mut self.bus, budget)?;
        self.overshoot = used.saturating_sub(budget);

        if self.bus.vdp.take_viewport_change() {
            log(LogCategory::Video, LogLevel::Debug, || {
                format!("viewport now {:?}", self.bus.vdp.viewport())
            });
        }
        self.bus.take_frame_ready();
        Ok(FrameOutput {
            frame: self.bus.vdp.take_frame(),
            samples: self.bus.psg.take_samples(),
            viewport: self.bus.vdp.viewport(),
        })
    }

    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("model", self.model.machine_id());
        state.put("overshoot", self.overshoot);
        state.insert_scope("cpu", self.cpu.capture_state());
        state.insert_scope("bus", self.bus.capture_state());
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let model: String = state.get("model")?;
        if model != self.model.machine_id() {
            return Err(SmsError::ModelMismatch {
                expected: self.model.machine_id(),
                found: model,
            }
            .into());
        }
        self.overshoot = state.get("overshoot")?;
        self.cpu.restore_state(&state.scope("cpu"))?;
        self.bus.restore_state(&state.scope("bus"))
    }

    fn apply_config(&mut self, config: &EmulationConfig) -> Result<(), EmuError> {
        config.validate()?;
        let clock = clock_for(self.model, config.region, config.sample_rate)?;
        if config.region != self.region {
            log(LogCategory::Video, LogLevel::Info, || {
                format!("switching to {:?} timing", config.region)
            });
        }
        self.bus
            .vdp
            .set_timing(config.region, clock.cycles_per_scanline());
        self.bus.psg.set_clock(&clock);
        self.bus.vdp.set_remove_sprite_limit(config.remove_sprite_limit);
        self.bus.set_japanese(config.japanese_console);
        self.clock = clock;
        self.region = config.region;
        Ok(())
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![
            MountPointInfo {
                id: CARTRIDGE_MOUNT.to_string(),
                name: "Cartridge Slot".to_string(),
                extensions: self
                    .model
                    .extensions()
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect(),
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
                None => Err(SmsError::NoCartridge.into()),
            },
            other => Err(SmsError::InvalidMountPoint(other.to_string()).into()),
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), EmuError> {
        match mount_point_id {
            CARTRIDGE_MOUNT => {
                self.bus.cartridge = None;
                Ok(())
            }
            SAVE_RAM_MOUNT => Ok(()),
            other => Err(SmsError::InvalidMountPoint(other.to_string()).into()),
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
    use emu_core::CpuBus;

    fn machine(model: SmsModel) -> SmsMachine {
        let mut machine = SmsMachine::new(model, &EmulationConfig::default()).unwrap();
        machine.mount(CARTRIDGE_MOUNT, &vec![0u8; 0x8000]).unwrap();
        machine
    }

    #[test]
    fn test_mount_points() {
        let machine = machine(SmsModel::GameGear);
        let points = machine.mount_points();
        assert_eq!(points[0].id, CARTRIDGE_MOUNT);
        assert_eq!(points[0].extensions, vec!["gg".to_string()]);
        assert!(machine.is_mounted(CARTRIDGE_MOUNT));
        assert!(machine.is_mounted(SAVE_RAM_MOUNT));

        let mut full = SmsMachine::new(SmsModel::GameGear, &EmulationConfig::default()).unwrap();
        full.mount(CARTRIDGE_MOUNT, &vec![0u8; 0xC000]).unwrap();
        assert!(!full.is_mounted(SAVE_RAM_MOUNT));
    }

    #[test]
    fn test_small_rom_gets_cartridge_ram() {
        let mut machine = machine(SmsModel::MasterSystem);
        assert_eq!(machine.mapper_kind(), Some(SmsMapperKind::StaticRomWithRam));
        machine.bus_mut().write(0xA000, 0x42).unwrap();
        assert_eq!(machine.bus_mut().read(0xA000).unwrap(), 0x42);
    }

    #[test]
    fn test_invalid_mount_point() {
        let mut machine = machine(SmsModel::MasterSystem);
        assert!(matches!(
            machine.mount("Floppy", &[1]),
            Err(EmuError::Machine(_))
        ));
    }

    #[test]
    fn test_run_frame_without_cartridge_fails() {
        let mut machine = SmsMachine::new(SmsModel::MasterSystem, &EmulationConfig::default())
            .unwrap();
        assert!(machine.run_frame().is_err());
    }

    #[test]
    fn test_frame_output() {
        let mut machine = machine(SmsModel::MasterSystem);
        let output = machine.run_frame().unwrap();
        let frame = output.frame.unwrap();
        assert_eq!(frame.width, 284);
        assert_eq!(frame.height, 243);
        assert_eq!(output.viewport.width, 256);
        let pairs = output.samples.len() / 2;
        assert!((734..=736).contains(&pairs), "{pairs} sample pairs");
    }

    #[test]
    fn test_pal_config_switches_clock() {
        let mut machine = machine(SmsModel::MasterSystem);
        let config = EmulationConfig {
            region: Region::Pal,
            ..EmulationConfig::default()
        };
        machine.apply_config(&config).unwrap();
        assert_eq!(machine.clock().scanlines_per_frame(), 313);
        // First frame finishes the NTSC layout, the next one is PAL.
        machine.run_frame().unwrap();
        machine.run_frame().unwrap();
        let frame = machine.run_frame().unwrap().frame.unwrap();
        assert_eq!(frame.height, 54 + 192 + 48);
    }

    #[test]
    fn test_game_gear_stays_ntsc() {
        let mut machine = machine(SmsModel::GameGear);
        let config = EmulationConfig {
            region: Region::Pal,
            ..EmulationConfig::default()
        };
        machine.apply_config(&config).unwrap();
        assert_eq!(machine.clock().scanlines_per_frame(), 262);
    }

    #[test]
    fn test_forced_mapper() {
        let mut machine = SmsMachine::new(SmsModel::MasterSystem, &EmulationConfig::default())
            .unwrap();
        machine.force_mapper(Some(SmsMapperKind::Codemasters));
        machine.mount(CARTRIDGE_MOUNT, &vec![0u8; 0x20000]).unwrap();
        assert_eq!(machine.mapper_kind(), Some(SmsMapperKind::Codemasters));
    }

    #[test]
    fn test_save_ram_only_after_use() {
        let mut machine = SmsMachine::new(SmsModel::MasterSystem, &EmulationConfig::default())
            .unwrap();
        machine.mount(CARTRIDGE_MOUNT, &vec![0u8; 0x20000]).unwrap();
        assert!(machine.save_ram().is_none());
        machine.bus_mut().write(0xFFFC, 0x08).unwrap();
        machine.bus_mut().write(0x8000, 0x12).unwrap();
        let ram = machine.save_ram().unwrap();
        assert_eq!(ram[0], 0x12);
    }

    #[test]
    fn test_state_blob_roundtrip() {
        let mut machine = machine(SmsModel::MasterSystem);
        machine.bus_mut().write(0xC000, 0x5A).unwrap();
        machine.run_frame().unwrap();
        let blob = machine.save_state_blob().unwrap();

        let mut other = self::machine(SmsModel::MasterSystem);
        other.load_state_blob(&blob).unwrap();
        assert_eq!(other.bus().ram()[0], 0x5A);
        assert_eq!(other.capture_state(), machine.capture_state());
    }

    #[test]
    fn test_state_from_other_model_rejected() {
        let sms = machine(SmsModel::MasterSystem);
        let state = sms.capture_state();
        let mut gg = machine(SmsModel::GameGear);
        assert!(gg.restore_state(&state).is_err());
    }
}
