use std::time::Duration;

use emu_core::scheduler::{MemorySlotStore, Scheduler, SchedulerEvent};
use emu_core::{savestate, Cpu, CpuBus, EmuError, EmulationConfig, Machine, StateMap};
use emu_gb::{buttons, header, interrupts, GbBus, GbMachine, CARTRIDGE_MOUNT};

/// Plays a list of memory writes, one per step, then idles.
struct ScriptedCpu {
    script: Vec<(u16, u8)>,
    pc: usize,
}

impl ScriptedCpu {
    fn new(script: Vec<(u16, u8)>) -> Self {
        Self { script, pc: 0 }
    }
}

impl Cpu<GbBus> for ScriptedCpu {
    fn reset(&mut self) {
        self.pc = 0;
    }

    fn step(&mut self, bus: &mut GbBus) -> Result<u32, EmuError> {
        match self.script.get(self.pc) {
            Some(&(addr, val)) => {
                bus.write(addr, val)?;
                self.pc += 1;
                Ok(8)
            }
            None => Ok(4),
        }
    }

    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("pc", self.pc as u64);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.pc = state.get::<u64>("pc")? as usize;
        Ok(())
    }
}

/// LCD off, a solid tile in the top-left map cell, LCD back on, then "Hi"
/// over the link cable.
fn corner_tile_script() -> Vec<(u16, u8)> {
    let mut script = vec![(0xFF40, 0x00)];
    script.extend((0x8010..0x8020).map(|addr| (addr, 0xFF)));
    script.push((0x9800, 0x01));
    script.push((0xFF40, 0x91));
    script.extend([(0xFF01, b'H'), (0xFF02, 0x81), (0xFF01, b'i'), (0xFF02, 0x81)]);
    script
}

fn unlimited() -> EmulationConfig {
    EmulationConfig {
        fps_limiting: false,
        ..Default::default()
    }
}

fn rom(cgb_flag: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x134..0x138].copy_from_slice(b"DEMO");
    rom[0x143] = cgb_flag;
    rom[0x14D] = header::header_checksum(&rom);
    rom
}

fn scripted_machine() -> GbMachine {
    let mut machine = GbMachine::new(&unlimited()).unwrap();
    machine.mount(CARTRIDGE_MOUNT, &rom(0x00)).unwrap();
    machine.set_cpu(Box::new(ScriptedCpu::new(corner_tile_script())));
    machine
}

#[test]
fn scripted_writes_reach_the_picture() {
    let mut machine = scripted_machine();
    machine.run_frame().unwrap();
    let output = machine.run_frame().unwrap();
    let frame = output.frame.unwrap();

    assert_eq!(frame.rgb(0, 0), (0, 0, 0));
    assert_eq!(frame.rgb(7, 7), (0, 0, 0));
    assert_eq!(frame.rgb(8, 0), (255, 255, 255));
    assert_eq!(frame.rgb(0, 8), (255, 255, 255));
    assert_eq!(frame.rgb(100, 100), (255, 255, 255));
}

#[test]
fn serial_bytes_reach_the_host() {
    let mut machine = scripted_machine();
    machine.run_frame().unwrap();
    assert_eq!(machine.take_serial_output(), b"Hi");
    assert!(machine.take_serial_output().is_empty());
}

#[test]
fn vblank_and_joypad_raise_interrupts() {
    let mut machine = scripted_machine();
    machine.bus_mut().write(0xFF0F, 0x00).unwrap();
    machine.run_frame().unwrap();
    let flags = machine.bus_mut().read(0xFF0F).unwrap();
    assert_ne!(flags & interrupts::VBLANK, 0);

    machine.bus_mut().write(0xFF0F, 0x00).unwrap();
    machine.set_buttons(buttons::START);
    machine.bus_mut().tick(4).unwrap();
    let flags = machine.bus_mut().read(0xFF0F).unwrap();
    assert_ne!(flags & interrupts::JOYPAD, 0);

    // Action buttons selected: Start is bit 3, active low.
    machine.bus_mut().write(0xFF00, 0x10).unwrap();
    assert_eq!(machine.bus_mut().read(0xFF00).unwrap() & 0x0F, 0x07);
}

#[test]
fn restored_machine_runs_identically() {
    let mut machine = scripted_machine();
    machine.run_frame().unwrap();
    machine.run_frame().unwrap();
    let blob = machine.save_state_blob().unwrap();

    let mut twin = scripted_machine();
    twin.load_state_blob(&blob).unwrap();

    // Frame lengths in sample pairs vary with the carried fraction.
    for _ in 0..6 {
        let a = machine.run_frame().unwrap();
        let b = twin.run_frame().unwrap();
        assert_eq!(a.frame, b.frame);
        assert_eq!(a.samples, b.samples);
    }
    assert_eq!(machine.capture_state(), twin.capture_state());
}

#[test]
fn blob_decodes_with_machine_id() {
    let mut machine = scripted_machine();
    machine.run_frame().unwrap();
    let blob = machine.save_state_blob().unwrap();

    let state = savestate::decode(&blob, "gb").unwrap();
    assert_eq!(
        state.get::<u64>("cpu.pc").unwrap(),
        corner_tile_script().len() as u64
    );
    assert!(savestate::decode(&blob, "gbc").is_err());
}

#[test]
fn color_state_rejected_by_monochrome_machine() {
    let mut color = GbMachine::new(&unlimited()).unwrap();
    color.mount(CARTRIDGE_MOUNT, &rom(0xC0)).unwrap();
    let blob = color.save_state_blob().unwrap();

    let mut machine = scripted_machine();
    assert!(machine.load_state_blob(&blob).is_err());
    assert!(machine.run_frame().is_ok());
}

#[test]
fn scheduler_saves_a_slot() {
    let slots = MemorySlotStore::new();
    let mut scheduler = Scheduler::new(scripted_machine(), Box::new(slots.clone()), &unlimited());
    let events = scheduler.events();
    scheduler.startup(|err| panic!("unexpected fatal error: {err}")).unwrap();

    let mut rendered = 0;
    while rendered < 2 {
        let event = events.recv_timeout(Duration::from_secs(10)).unwrap();
        if let SchedulerEvent::FrameRendered { width, .. } = event {
            assert_eq!(width, 160);
            rendered += 1;
        }
    }

    scheduler.save_state(2).unwrap();
    loop {
        if let SchedulerEvent::StateSaved(2) = events.recv_timeout(Duration::from_secs(10)).unwrap()
        {
            break;
        }
    }

    let machine = scheduler.shutdown().unwrap();
    let blob = slots.get(2).unwrap();
    let mut restored = scripted_machine();
    restored.load_state_blob(&blob).unwrap();
    assert_eq!(machine.machine_id(), restored.machine_id());
}
