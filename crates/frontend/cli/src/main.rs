use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::unbounded;
use emu_core::logging::{LogCategory, LogConfig, LogLevel};
use emu_core::scheduler::{DirectorySlotStore, Runner, SchedulerEvent};
use emu_core::{savestate, EmulationConfig, Machine};
use emu_gb::{CartridgeHeader, GbMachine};
use emu_sms::{SmsMachine, SmsMapperKind, SmsModel};

#[derive(Parser)]
#[command(about = "Headless runner for the 8-bit console cores")]
struct Args {
    /// Core log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Per-category override, e.g. `cartridge=debug`; repeatable
    #[arg(long, global = true)]
    log_category: Vec<String>,

    /// Also write core logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print what the cartridge header and mapper detection make of a ROM
    Info { rom: PathBuf },

    /// Run a ROM for a number of frames with the halted CPU
    Run {
        rom: PathBuf,

        #[arg(long, default_value_t = 60)]
        frames: u32,

        /// Write a save state here after the last frame
        #[arg(long)]
        save_state: Option<PathBuf>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the console picked from the file extension
        #[arg(long, value_enum)]
        machine: Option<MachineKind>,
    },

    /// Check a save-state file against a machine id
    VerifyState {
        file: PathBuf,

        #[arg(long)]
        machine: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MachineKind {
    Sg1000,
    Sms,
    Gamegear,
    Gb,
}

impl MachineKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "sg" | "sc" => Some(MachineKind::Sg1000),
            "sms" => Some(MachineKind::Sms),
            "gg" => Some(MachineKind::Gamegear),
            "gb" | "gbc" | "cgb" => Some(MachineKind::Gb),
            _ => None,
        }
    }

    fn sms_model(self) -> Option<SmsModel> {
        match self {
            MachineKind::Sg1000 => Some(SmsModel::Sg1000),
            MachineKind::Sms => Some(SmsModel::MasterSystem),
            MachineKind::Gamegear => Some(SmsModel::GameGear),
            MachineKind::Gb => None,
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = LogConfig::global();
    let level = LogLevel::parse(&args.log_level)
        .with_context(|| format!("unknown log level `{}`", args.log_level))?;
    config.set_global_level(level);

    for spec in &args.log_category {
        let (name, level) = spec
            .split_once('=')
            .with_context(|| format!("expected CATEGORY=LEVEL, got `{spec}`"))?;
        let category = LogCategory::parse(name)
            .with_context(|| format!("unknown log category `{name}`"))?;
        let level =
            LogLevel::parse(level).with_context(|| format!("unknown log level `{level}`"))?;
        config.set_level(category, level);
    }

    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn read_rom(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn machine_kind(path: &Path, forced: Option<MachineKind>) -> Result<MachineKind> {
    match forced.or_else(|| MachineKind::from_path(path)) {
        Some(kind) => Ok(kind),
        None => bail!(
            "cannot tell the console from {}; pass --machine",
            path.display()
        ),
    }
}

fn info(path: &Path) -> Result<()> {
    let rom = read_rom(path)?;
    let kind = machine_kind(path, None)?;
    println!("file:    {}", path.display());
    println!("size:    {} KiB", rom.len() / 1024);

    if kind == MachineKind::Gb {
        let header = CartridgeHeader::parse(&rom)?;
        println!("title:   {}", header.title);
        println!("colour:  {:?}", header.cgb);
        println!(
            "board:   {} (type {:02X})",
            header.kind.name(),
            header.cart_type
        );
        println!("rom:     {} KiB declared", header.rom_size / 1024);
        println!("ram:     {} KiB", header.ram_size / 1024);
        println!(
            "extras:  battery={} timer={} rumble={}",
            header.battery, header.timer, header.rumble
        );
        println!(
            "header:  checksum {}",
            if header.checksum_valid { "ok" } else { "BAD" }
        );
    } else {
        println!("console: {kind:?}");
        println!("mapper:  {}", SmsMapperKind::detect(&rom).name());
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EmulationConfig> {
    let mut config = match path {
        Some(path) => EmulationConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EmulationConfig::default(),
    };
    config.fps_limiting = false;
    Ok(config)
}

/// Drive the scheduler loop on this thread for `frames` frames.
fn run_machine<M: Machine + 'static>(
    mut machine: M,
    rom_path: &Path,
    rom: &[u8],
    config: &EmulationConfig,
    frames: u32,
    save_state: Option<&Path>,
) -> Result<()> {
    let points = machine.mount_points();
    let Some(slot) = points.iter().find(|m| m.required) else {
        bail!("{} has no cartridge slot", machine.machine_id());
    };
    machine.mount(&slot.id, rom)?;

    // A `.sav` beside the ROM goes into the battery RAM mount point.
    let sav = rom_path.with_extension("sav");
    let battery = points
        .iter()
        .find(|m| !m.required && m.extensions.iter().any(|e| e == "sav"));
    if let (Some(battery), true) = (battery, sav.is_file()) {
        machine.mount(&battery.id, &fs::read(&sav)?)?;
        log::info!("loaded battery RAM from {}", sav.display());
    }

    let slots = DirectorySlotStore::for_rom(rom_path, config.slot_directory.as_deref());
    let (_ctrl_tx, ctrl_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let running = Arc::new(AtomicBool::new(true));
    let mut runner = Runner::new(machine, Box::new(slots), ctrl_rx, event_tx, running, false);

    let mut pictures = 0u32;
    let mut samples = 0usize;
    for _ in 0..frames {
        runner.iterate()?;
        for event in event_rx.try_iter() {
            match event {
                SchedulerEvent::FrameRendered { .. } => pictures += 1,
                SchedulerEvent::SamplesEnqueued(chunk) => samples += chunk.len(),
                SchedulerEvent::ViewportChanged(viewport) => log::debug!("viewport {viewport:?}"),
                _ => {}
            }
        }
    }
    let machine = runner.into_machine();
    println!(
        "{}: ran {frames} frames, {pictures} pictures, {} sample pairs",
        machine.machine_id(),
        samples / 2
    );

    if persist_save_ram(&machine, &sav)? {
        println!("battery: -> {}", sav.display());
    }

    if let Some(path) = save_state {
        let blob = machine.save_state_blob()?;
        fs::write(path, &blob).with_context(|| format!("writing {}", path.display()))?;
        println!("state:   {} bytes -> {}", blob.len(), path.display());
    }
    Ok(())
}

/// Write cartridge RAM to `path` when the game used it. Returns whether a
/// file was written.
fn persist_save_ram<M: Machine>(machine: &M, path: &Path) -> Result<bool> {
    let Some(ram) = machine.save_ram() else {
        return Ok(false);
    };
    fs::write(path, &ram).with_context(|| format!("writing {}", path.display()))?;
    log::info!("saved {} bytes of battery RAM to {}", ram.len(), path.display());
    Ok(true)
}

fn run(
    rom_path: &Path,
    frames: u32,
    save_state: Option<&Path>,
    config_path: Option<&Path>,
    forced: Option<MachineKind>,
) -> Result<()> {
    let rom = read_rom(rom_path)?;
    let config = load_config(config_path)?;
    let kind = machine_kind(rom_path, forced)?;
    log::info!("running {} as {kind:?}", rom_path.display());

    match kind.sms_model() {
        Some(model) => run_machine(
            SmsMachine::new(model, &config)?,
            rom_path,
            &rom,
            &config,
            frames,
            save_state,
        ),
        None => run_machine(
            GbMachine::new(&config)?,
            rom_path,
            &rom,
            &config,
            frames,
            save_state,
        ),
    }
}

fn verify_state(path: &Path, machine: &str) -> Result<()> {
    let blob = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let state = savestate::decode(&blob, machine)?;
    let model: Option<String> = state.get("model").ok();
    println!(
        "{}: valid `{machine}` state, {} bytes{}",
        path.display(),
        blob.len(),
        model.map(|m| format!(", model {m}")).unwrap_or_default()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    match &args.command {
        Command::Info { rom } => info(rom),
        Command::Run {
            rom,
            frames,
            save_state,
            config,
            machine,
        } => run(
            rom,
            *frames,
            save_state.as_deref(),
            config.as_deref(),
            *machine,
        ),
        Command::VerifyState { file, machine } => verify_state(file, machine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::CpuBus;

    #[test]
    fn test_machine_from_extension() {
        assert_eq!(MachineKind::from_path(Path::new("a.SMS")), Some(MachineKind::Sms));
        assert_eq!(MachineKind::from_path(Path::new("a.gg")), Some(MachineKind::Gamegear));
        assert_eq!(MachineKind::from_path(Path::new("a.sg")), Some(MachineKind::Sg1000));
        assert_eq!(MachineKind::from_path(Path::new("a.gbc")), Some(MachineKind::Gb));
        assert_eq!(MachineKind::from_path(Path::new("a.bin")), None);
        assert!(machine_kind(Path::new("a.bin"), Some(MachineKind::Sms)).is_ok());
        assert!(machine_kind(Path::new("a.bin"), None).is_err());
    }

    fn gb_rom(cart_type: u8, ram_code: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x147] = cart_type;
        rom[0x149] = ram_code;
        rom[0x14D] = emu_gb::header::header_checksum(&rom);
        rom
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("emu_cli_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_battery_ram_written_back() {
        let mut machine = GbMachine::new(&EmulationConfig::default()).unwrap();
        machine
            .mount(emu_gb::CARTRIDGE_MOUNT, &gb_rom(0x03, 0x02))
            .unwrap();
        let path = scratch_path("battery.sav");
        assert!(!persist_save_ram(&machine, &path).unwrap());
        assert!(!path.exists());

        machine.bus_mut().write(0x0000, 0x0A).unwrap();
        machine.bus_mut().write(0xA000, 0x77).unwrap();
        assert!(persist_save_ram(&machine, &path).unwrap());
        let saved = fs::read(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(saved.len(), 0x2000);
        assert_eq!(saved[0], 0x77);
    }

    #[test]
    fn test_no_battery_nothing_written() {
        let mut machine = GbMachine::new(&EmulationConfig::default()).unwrap();
        machine
            .mount(emu_gb::CARTRIDGE_MOUNT, &gb_rom(0x00, 0x00))
            .unwrap();
        machine.bus_mut().write(0xA000, 0x77).unwrap();
        let path = scratch_path("plain.sav");
        assert!(!persist_save_ram(&machine, &path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "emu_cli",
            "--log-category",
            "cartridge=debug",
            "run",
            "game.gb",
            "--frames",
            "3",
            "--save-state",
            "out.state",
        ]);
        assert_eq!(args.log_category, vec!["cartridge=debug".to_string()]);
        match args.command {
            Command::Run {
                frames, save_state, ..
            } => {
                assert_eq!(frames, 3);
                assert_eq!(save_state, Some(PathBuf::from("out.state")));
            }
            _ => panic!("expected run"),
        }
    }
}
