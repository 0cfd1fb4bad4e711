use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::control::ControlMessage;
use super::events::SchedulerEvent;
use super::slots::SlotStore;
use super::FatalHandler;
use crate::config::EmulationConfig;
use crate::logging::{log, LogCategory, LogLevel};
use crate::types::Viewport;
use crate::{EmuError, Machine};

/// Wall time the limiter may owe before it stops trying to catch up.
const MAX_CATCH_UP: Duration = Duration::from_millis(250);
/// FPS is re-measured over windows of this length.
const FPS_WINDOW: Duration = Duration::from_millis(500);
/// Poll interval while paused.
const PAUSED_POLL: Duration = Duration::from_millis(10);

/// The simulation loop. Owns the machine; lives on the scheduler thread,
/// or is driven directly through [`Runner::iterate`].
pub struct Runner<M: Machine> {
    machine: M,
    slots: Box<dyn SlotStore>,
    ctrl_rx: Receiver<ControlMessage>,
    event_tx: Sender<SchedulerEvent>,
    running: Arc<AtomicBool>,

    paused: bool,
    fps_limiting: bool,
    pause_queue: VecDeque<bool>,
    pending_config: Option<EmulationConfig>,
    pending_load: Option<u32>,
    pending_save: Option<u32>,

    last_tick: Option<Instant>,
    accumulator: Duration,

    fps_window_start: Instant,
    fps_window_frames: u32,
    fps: f64,

    viewport: Option<Viewport>,
}

impl<M: Machine> Runner<M> {
    pub fn new(
        machine: M,
        slots: Box<dyn SlotStore>,
        ctrl_rx: Receiver<ControlMessage>,
        event_tx: Sender<SchedulerEvent>,
        running: Arc<AtomicBool>,
        fps_limiting: bool,
    ) -> Self {
        Self {
            machine,
            slots,
            ctrl_rx,
            event_tx,
            running,
            paused: false,
            fps_limiting,
            pause_queue: VecDeque::new(),
            pending_config: None,
            pending_load: None,
            pending_save: None,
            last_tick: None,
            accumulator: Duration::ZERO,
            fps_window_start: Instant::now(),
            fps_window_frames: 0,
            fps: 0.0,
            viewport: None,
        }
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    pub fn into_machine(self) -> M {
        self.machine
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Loop until the running flag drops. Errors that escape an iteration
    /// go to `on_fatal` and end the loop.
    pub fn run(mut self, on_fatal: FatalHandler) -> M {
        log(LogCategory::Scheduler, LogLevel::Info, || {
            format!("scheduler started for {}", self.machine.machine_id())
        });
        while self.running.load(Ordering::Acquire) {
            match self.iterate() {
                Ok(0) => self.wait_for_work(),
                Ok(_) => {}
                Err(err) => {
                    log(LogCategory::Scheduler, LogLevel::Error, || {
                        format!("scheduler stopped: {err}")
                    });
                    self.running.store(false, Ordering::Release);
                    on_fatal(err);
                    break;
                }
            }
        }
        log(LogCategory::Scheduler, LogLevel::Info, || {
            "scheduler stopped".to_string()
        });
        self.machine
    }

    /// One pass of the loop. Returns how many frames ran.
    pub fn iterate(&mut self) -> Result<u32, EmuError> {
        self.drain_controls();

        if let Some(slot) = self.pending_load.take() {
            self.load_slot(slot);
        }

        while let Some(paused) = self.pause_queue.pop_front() {
            self.paused = paused;
            self.last_tick = None;
            self.emit(SchedulerEvent::PauseChanged(paused));
        }

        let mut frames = 0;
        if !self.paused {
            if self.fps_limiting {
                frames = self.run_due_frames()?;
            } else {
                self.run_frame()?;
                frames = 1;
            }
        }

        self.update_fps();

        if let Some(config) = self.pending_config.take() {
            self.apply_config(config)?;
        }

        if let Some(slot) = self.pending_save.take() {
            self.save_slot(slot);
        }

        Ok(frames)
    }

    fn drain_controls(&mut self) {
        loop {
            match self.ctrl_rx.try_recv() {
                Ok(msg) => self.enqueue(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::Release);
                    break;
                }
            }
        }
    }

    fn enqueue(&mut self, msg: ControlMessage) {
        log(LogCategory::Scheduler, LogLevel::Debug, || {
            format!("control: {msg:?}")
        });
        match msg {
            ControlMessage::Pause(paused) => self.pause_queue.push_back(paused),
            ControlMessage::SetConfig(config) => self.pending_config = Some(config),
            ControlMessage::LoadState(slot) => self.pending_load = Some(slot),
            ControlMessage::SaveState(slot) => self.pending_save = Some(slot),
            ControlMessage::SetFpsLimiting(enabled) => self.set_fps_limiting(enabled),
            ControlMessage::Shutdown => self.running.store(false, Ordering::Release),
        }
    }

    fn set_fps_limiting(&mut self, enabled: bool) {
        self.fps_limiting = enabled;
        self.last_tick = None;
        self.accumulator = Duration::ZERO;
    }

    /// Fixed-step pacing: accumulate wall time, run whole frames while at
    /// least one frame's worth is owed.
    fn run_due_frames(&mut self) -> Result<u32, EmuError> {
        let frame = self.machine.clock().frame_duration();
        let now = Instant::now();
        match self.last_tick {
            Some(last) => self.accumulator += now.duration_since(last),
            // Resuming: the first frame is due immediately.
            None => self.accumulator = frame,
        }
        self.last_tick = Some(now);
        self.accumulator = self.accumulator.min(MAX_CATCH_UP.max(frame));

        let mut frames = 0;
        while self.accumulator >= frame {
            self.run_frame()?;
            self.accumulator -= frame;
            frames += 1;
        }
        Ok(frames)
    }

    fn run_frame(&mut self) -> Result<(), EmuError> {
        let output = self.machine.run_frame()?;
        self.fps_window_frames += 1;

        if let Some(frame) = output.frame {
            self.emit(SchedulerEvent::FrameRendered {
                width: frame.width,
                height: frame.height,
                bgra: frame.pixels,
            });
        }
        if !output.samples.is_empty() {
            self.emit(SchedulerEvent::SamplesEnqueued(output.samples));
        }
        if self.viewport != Some(output.viewport) {
            self.viewport = Some(output.viewport);
            self.emit(SchedulerEvent::ViewportChanged(output.viewport));
        }
        Ok(())
    }

    fn update_fps(&mut self) {
        let elapsed = self.fps_window_start.elapsed();
        if elapsed >= FPS_WINDOW {
            self.fps = f64::from(self.fps_window_frames) / elapsed.as_secs_f64();
            self.fps_window_frames = 0;
            self.fps_window_start = Instant::now();
            self.emit(SchedulerEvent::FpsUpdated(self.fps));
        }
    }

    fn apply_config(&mut self, config: EmulationConfig) -> Result<(), EmuError> {
        if let Err(err) = config.validate() {
            log(LogCategory::Scheduler, LogLevel::Warn, || {
                format!("configuration rejected: {err}")
            });
            self.emit(SchedulerEvent::ConfigurationRejected(err.to_string()));
            return Ok(());
        }
        self.machine.apply_config(&config)?;
        self.set_fps_limiting(config.fps_limiting);
        self.emit(SchedulerEvent::ConfigurationApplied);
        Ok(())
    }

    fn load_slot(&mut self, slot: u32) {
        let result = self
            .slots
            .read_slot(slot)
            .and_then(|blob| self.machine.load_state_blob(&blob));
        match result {
            Ok(()) => {
                log(LogCategory::SaveState, LogLevel::Info, || {
                    format!("loaded state from slot {slot}")
                });
                self.emit(SchedulerEvent::StateLoaded(slot));
            }
            Err(err) => self.report_state_failure(slot, err),
        }
    }

    fn save_slot(&mut self, slot: u32) {
        let result = self
            .machine
            .save_state_blob()
            .and_then(|blob| self.slots.write_slot(slot, &blob));
        match result {
            Ok(()) => {
                log(LogCategory::SaveState, LogLevel::Info, || {
                    format!("saved state to slot {slot}")
                });
                self.emit(SchedulerEvent::StateSaved(slot));
            }
            Err(err) => self.report_state_failure(slot, err),
        }
    }

    fn report_state_failure(&self, slot: u32, err: EmuError) {
        log(LogCategory::SaveState, LogLevel::Warn, || {
            format!("state operation on slot {slot} failed: {err}")
        });
        self.emit(SchedulerEvent::StateOperationFailed {
            slot,
            message: err.to_string(),
        });
    }

    /// Block on the control channel until a message arrives or the next
    /// frame is due.
    fn wait_for_work(&mut self) {
        let timeout = if self.paused {
            PAUSED_POLL
        } else if self.fps_limiting {
            let frame = self.machine.clock().frame_duration();
            frame
                .saturating_sub(self.accumulator)
                .max(Duration::from_millis(1))
        } else {
            return;
        };

        match self.ctrl_rx.recv_timeout(timeout) {
            Ok(msg) => self.enqueue(msg),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.running.store(false, Ordering::Release),
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        // Nobody listening is not an error for the simulation.
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::slots::MemorySlotStore;
    use crate::types::Frame;
    use crate::{ClockConfiguration, FrameOutput, MountPointInfo, StateMap};
    use crossbeam_channel::unbounded;

    struct CounterMachine {
        clock: ClockConfiguration,
        frames: u32,
        fail_after: Option<u32>,
    }

    impl CounterMachine {
        fn new() -> Self {
            Self {
                clock: ClockConfiguration::new(6_000.0, 60.0, 10, 600).unwrap(),
                frames: 0,
                fail_after: None,
            }
        }
    }

    impl Machine for CounterMachine {
        fn machine_id(&self) -> &'static str {
            "counter"
        }
        fn clock(&self) -> &ClockConfiguration {
            &self.clock
        }
        fn reset(&mut self) {
            self.frames = 0;
        }
        fn run_frame(&mut self) -> Result<FrameOutput, EmuError> {
            if self.fail_after == Some(self.frames) {
                return Err(EmuError::UnsupportedPort {
                    device: "counter",
                    port: 0x42,
                });
            }
            self.frames += 1;
            Ok(FrameOutput {
                frame: Some(Frame::new(4, 2)),
                samples: vec![0; 20],
                viewport: Viewport {
                    x: 0,
                    y: 0,
                    width: 4,
                    height: 2,
                },
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
        fn apply_config(&mut self, config: &EmulationConfig) -> Result<(), EmuError> {
            self.clock.set_sample_rate(config.sample_rate)
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

    struct Harness {
        runner: Runner<CounterMachine>,
        ctrl_tx: Sender<ControlMessage>,
        event_rx: Receiver<SchedulerEvent>,
        slots: MemorySlotStore,
    }

    fn harness(fps_limiting: bool) -> Harness {
        let (ctrl_tx, ctrl_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let slots = MemorySlotStore::new();
        let runner = Runner::new(
            CounterMachine::new(),
            Box::new(slots.clone()),
            ctrl_rx,
            event_tx,
            Arc::new(AtomicBool::new(true)),
            fps_limiting,
        );
        Harness {
            runner,
            ctrl_tx,
            event_rx,
            slots,
        }
    }

    fn drain(rx: &Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_pause_toggles_applied_in_order() {
        let mut h = harness(false);
        for paused in [true, false, true] {
            h.ctrl_tx.send(ControlMessage::Pause(paused)).unwrap();
        }

        assert_eq!(h.runner.iterate().unwrap(), 0);
        assert!(h.runner.is_paused());

        let pauses: Vec<_> = drain(&h.event_rx)
            .into_iter()
            .filter_map(|e| match e {
                SchedulerEvent::PauseChanged(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(pauses, vec![true, false, true]);
        assert_eq!(h.runner.machine().frames, 0);
    }

    #[test]
    fn test_unlimited_runs_one_frame_per_iteration() {
        let mut h = harness(false);
        assert_eq!(h.runner.iterate().unwrap(), 1);
        assert_eq!(h.runner.iterate().unwrap(), 1);
        assert_eq!(h.runner.machine().frames, 2);

        let events = drain(&h.event_rx);
        let rendered = events
            .iter()
            .filter(|e| matches!(e, SchedulerEvent::FrameRendered { width: 4, height: 2, .. }))
            .count();
        let viewports = events
            .iter()
            .filter(|e| matches!(e, SchedulerEvent::ViewportChanged(_)))
            .count();
        assert_eq!(rendered, 2);
        assert_eq!(viewports, 1);
    }

    #[test]
    fn test_limited_first_frame_is_due_immediately() {
        let mut h = harness(true);
        assert_eq!(h.runner.iterate().unwrap(), 1);
    }

    #[test]
    fn test_limiter_catch_up_is_bounded() {
        let mut h = harness(true);
        h.runner.iterate().unwrap();
        h.runner.last_tick = Some(Instant::now() - Duration::from_secs(5));
        let frames = h.runner.iterate().unwrap();
        // 250 ms at 60 Hz
        assert!(frames <= 15, "ran {frames} frames");
        assert!(frames >= 14, "ran {frames} frames");
    }

    #[test]
    fn test_save_then_load_restores_machine() {
        let mut h = harness(false);
        h.runner.iterate().unwrap();
        h.ctrl_tx.send(ControlMessage::SaveState(1)).unwrap();
        h.runner.iterate().unwrap();
        assert!(h.slots.get(1).is_some());
        assert_eq!(h.runner.machine().frames, 2);

        h.runner.iterate().unwrap();
        h.ctrl_tx.send(ControlMessage::Pause(true)).unwrap();
        h.ctrl_tx.send(ControlMessage::LoadState(1)).unwrap();
        h.runner.iterate().unwrap();
        assert_eq!(h.runner.machine().frames, 2);

        let events = drain(&h.event_rx);
        assert!(events.contains(&SchedulerEvent::StateSaved(1)));
        assert!(events.contains(&SchedulerEvent::StateLoaded(1)));
    }

    #[test]
    fn test_load_requests_latest_wins() {
        let mut h = harness(false);
        h.slots
            .insert(2, h.runner.machine().save_state_blob().unwrap());
        h.ctrl_tx.send(ControlMessage::LoadState(7)).unwrap();
        h.ctrl_tx.send(ControlMessage::LoadState(2)).unwrap();
        h.runner.iterate().unwrap();

        let state_events: Vec<_> = drain(&h.event_rx)
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    SchedulerEvent::StateLoaded(_) | SchedulerEvent::StateOperationFailed { .. }
                )
            })
            .collect();
        assert_eq!(state_events, vec![SchedulerEvent::StateLoaded(2)]);
    }

    #[test]
    fn test_failed_load_reports_and_keeps_state() {
        let mut h = harness(false);
        h.runner.iterate().unwrap();
        let mut corrupt = h.runner.machine().save_state_blob().unwrap();
        corrupt[20] ^= 0x55;
        h.slots.insert(3, corrupt);

        h.ctrl_tx.send(ControlMessage::Pause(true)).unwrap();
        h.ctrl_tx.send(ControlMessage::LoadState(3)).unwrap();
        h.runner.iterate().unwrap();

        assert_eq!(h.runner.machine().frames, 1);
        assert!(drain(&h.event_rx)
            .iter()
            .any(|e| matches!(e, SchedulerEvent::StateOperationFailed { slot: 3, .. })));
    }

    #[test]
    fn test_configuration_applied_after_frame() {
        let mut h = harness(true);
        let config = EmulationConfig {
            sample_rate: 1_200,
            fps_limiting: false,
            ..Default::default()
        };
        h.ctrl_tx.send(ControlMessage::SetConfig(config)).unwrap();
        h.runner.iterate().unwrap();

        assert_eq!(h.runner.machine().clock.sample_rate(), 1_200);
        assert!(!h.runner.fps_limiting);
        assert!(drain(&h.event_rx).contains(&SchedulerEvent::ConfigurationApplied));
    }

    #[test]
    fn test_invalid_configuration_reported() {
        let mut h = harness(false);
        let rate = h.runner.machine().clock.sample_rate();
        let config = EmulationConfig {
            sample_rate: 0,
            ..Default::default()
        };
        h.ctrl_tx.send(ControlMessage::SetConfig(config)).unwrap();
        h.runner.iterate().unwrap();

        assert_eq!(h.runner.machine().clock.sample_rate(), rate);
        let events = drain(&h.event_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::ConfigurationRejected(_))));
        assert!(!events.contains(&SchedulerEvent::ConfigurationApplied));
    }

    #[test]
    fn test_shutdown_message_clears_running() {
        let mut h = harness(false);
        h.ctrl_tx.send(ControlMessage::Shutdown).unwrap();
        h.runner.iterate().unwrap();
        assert!(!h.runner.running.load(Ordering::Acquire));
    }

    #[test]
    fn test_run_forwards_fatal_error() {
        let mut h = harness(false);
        h.runner.machine_mut().fail_after = Some(3);
        let (fatal_tx, fatal_rx) = unbounded();
        let machine = h.runner.run(Box::new(move |err| {
            let _ = fatal_tx.send(err.to_string());
        }));

        assert_eq!(machine.frames, 3);
        let message = fatal_rx.try_recv().unwrap();
        assert!(message.contains("0x42"));
    }
}
