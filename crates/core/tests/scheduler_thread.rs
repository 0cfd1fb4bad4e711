use std::time::Duration;

use emu_core::scheduler::{MemorySlotStore, Scheduler, SchedulerEvent};
use emu_core::types::{Frame, Viewport};
use emu_core::{
    ClockConfiguration, EmuError, EmulationConfig, FrameOutput, Machine, MountPointInfo, StateMap,
};

struct Ticker {
    clock: ClockConfiguration,
    frames: u32,
    explode_at: Option<u32>,
}

impl Ticker {
    fn new() -> Self {
        Self {
            clock: ClockConfiguration::new(10_000.0, 100.0, 10, 1_000).unwrap(),
            frames: 0,
            explode_at: None,
        }
    }
}

impl Machine for Ticker {
    fn machine_id(&self) -> &'static str {
        "ticker"
    }
    fn clock(&self) -> &ClockConfiguration {
        &self.clock
    }
    fn reset(&mut self) {
        self.frames = 0;
    }
    fn run_frame(&mut self) -> Result<FrameOutput, EmuError> {
        if self.explode_at == Some(self.frames) {
            return Err(EmuError::UnimplementedMapper(0xEE));
        }
        self.frames += 1;
        Ok(FrameOutput {
            frame: Some(Frame::new(1, 1)),
            samples: Vec::new(),
            viewport: Viewport::default(),
        })
    }
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("frames", self.frames);
        state
    }
    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.frames = state.get("frames")?;
        Ok(())
    }
    fn apply_config(&mut self, _config: &EmulationConfig) -> Result<(), EmuError> {
        Ok(())
    }
    fn mount_points(&self) -> Vec<MountPointInfo> {
        Vec::new()
    }
    fn mount(&mut self, _id: &str, _data: &[u8]) -> Result<(), EmuError> {
        Ok(())
    }
    fn unmount(&mut self, _id: &str) -> Result<(), EmuError> {
        Ok(())
    }
    fn is_mounted(&self, _id: &str) -> bool {
        true
    }
}

fn unlimited() -> EmulationConfig {
    EmulationConfig {
        fps_limiting: false,
        ..Default::default()
    }
}

#[test]
fn thread_runs_frames_and_returns_machine_on_shutdown() {
    let slots = MemorySlotStore::new();
    let mut scheduler = Scheduler::new(Ticker::new(), Box::new(slots.clone()), &unlimited());
    let events = scheduler.events();
    scheduler.startup(|err| panic!("unexpected fatal error: {err}")).unwrap();

    let mut rendered = 0;
    while rendered < 5 {
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        if matches!(event, SchedulerEvent::FrameRendered { .. }) {
            rendered += 1;
        }
    }

    scheduler.save_state(4).unwrap();
    loop {
        if let SchedulerEvent::StateSaved(4) = events.recv_timeout(Duration::from_secs(5)).unwrap() {
            break;
        }
    }
    assert!(slots.get(4).is_some());

    let machine = scheduler.shutdown().unwrap();
    assert!(machine.frames >= 5);
    assert!(!scheduler.is_running());
}

#[test]
fn pause_is_acknowledged_by_the_thread() {
    let mut scheduler =
        Scheduler::new(Ticker::new(), Box::new(MemorySlotStore::new()), &unlimited());
    let events = scheduler.events();
    scheduler.pause(true).unwrap();
    scheduler.startup(|_| {}).unwrap();

    loop {
        if let SchedulerEvent::PauseChanged(true) =
            events.recv_timeout(Duration::from_secs(5)).unwrap()
        {
            break;
        }
    }
    let machine = scheduler.shutdown().unwrap();
    assert_eq!(machine.frames, 0);
}

#[test]
fn fatal_error_reaches_handler_and_stops_loop() {
    let mut ticker = Ticker::new();
    ticker.explode_at = Some(2);
    let mut scheduler = Scheduler::new(ticker, Box::new(MemorySlotStore::new()), &unlimited());
    let (fatal_tx, fatal_rx) = crossbeam_channel::unbounded();
    scheduler
        .startup(move |err| {
            let _ = fatal_tx.send(err.to_string());
        })
        .unwrap();

    let message = fatal_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(message.contains("0xEE"));

    let machine = scheduler.shutdown().unwrap();
    assert_eq!(machine.frames, 2);
}

#[test]
fn startup_twice_is_rejected() {
    let mut scheduler =
        Scheduler::new(Ticker::new(), Box::new(MemorySlotStore::new()), &unlimited());
    scheduler.startup(|_| {}).unwrap();
    assert!(matches!(
        scheduler.startup(|_| {}),
        Err(EmuError::Configuration(_))
    ));
    scheduler.shutdown();
}
