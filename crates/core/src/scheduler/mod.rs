//! Real-time scheduler.
//!
//! One simulation thread per session owns the machine. The UI talks to it
//! only through [`ControlMessage`]s and reads results from a stream of
//! [`SchedulerEvent`]s; nothing is shared by reference across threads.
//!
//! # Loop order
//!
//! Each iteration of [`Runner::iterate`]:
//! 1. applies a pending state load
//! 2. drains pause toggles in order, one `PauseChanged` each
//! 3. runs frames unless paused (paced by wall time when FPS limiting is on)
//! 4. refreshes the FPS measurement every half second
//! 5. applies a pending configuration
//! 6. performs a pending state save
//!
//! Load, save and configuration requests are single-slot: a newer request
//! replaces an older one that has not been serviced yet.

mod control;
mod events;
mod runner;
mod slots;

pub use control::ControlMessage;
pub use events::SchedulerEvent;
pub use runner::Runner;
pub use slots::{DirectorySlotStore, MemorySlotStore, SlotStore};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::EmulationConfig;
use crate::logging::{log, LogCategory, LogLevel};
use crate::{EmuError, Machine};

/// Receives errors that escape a frame. Called at most once, after which
/// the loop has ended.
pub type FatalHandler = Box<dyn FnOnce(EmuError) + Send>;

/// Handle owned by the UI thread.
pub struct Scheduler<M: Machine + 'static> {
    ctrl_tx: Sender<ControlMessage>,
    event_rx: Receiver<SchedulerEvent>,
    running: Arc<AtomicBool>,
    idle: Option<Runner<M>>,
    join: Option<JoinHandle<M>>,
}

impl<M: Machine + 'static> Scheduler<M> {
    pub fn new(machine: M, slots: Box<dyn SlotStore>, config: &EmulationConfig) -> Self {
        let (ctrl_tx, ctrl_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(false));
        let runner = Runner::new(
            machine,
            slots,
            ctrl_rx,
            event_tx,
            Arc::clone(&running),
            config.fps_limiting,
        );
        Self {
            ctrl_tx,
            event_rx,
            running,
            idle: Some(runner),
            join: None,
        }
    }

    /// Event stream. Every clone sees a share of the same queue, so keep a
    /// single consumer.
    pub fn events(&self) -> Receiver<SchedulerEvent> {
        self.event_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the simulation thread.
    pub fn startup<F>(&mut self, on_fatal: F) -> Result<(), EmuError>
    where
        F: FnOnce(EmuError) + Send + 'static,
    {
        let runner = self
            .idle
            .take()
            .ok_or_else(|| EmuError::Configuration("scheduler already started".to_string()))?;
        if runner.machine().clock().cycles_per_frame() == 0 {
            self.idle = Some(runner);
            return Err(EmuError::Configuration(
                "machine clock yields an empty frame".to_string(),
            ));
        }

        self.running.store(true, Ordering::Release);
        let handler: FatalHandler = Box::new(on_fatal);
        let spawned = thread::Builder::new()
            .name("emu-scheduler".to_string())
            .spawn(move || runner.run(handler));
        match spawned {
            Ok(handle) => {
                self.join = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                Err(EmuError::Io(err))
            }
        }
    }

    /// Stop the loop, wait for the thread and hand the machine back.
    pub fn shutdown(&mut self) -> Option<M> {
        if let Some(runner) = self.idle.take() {
            return Some(runner.into_machine());
        }
        let handle = self.join.take()?;
        self.running.store(false, Ordering::Release);
        let _ = self.ctrl_tx.send(ControlMessage::Shutdown);
        match handle.join() {
            Ok(machine) => Some(machine),
            Err(_) => {
                log(LogCategory::Scheduler, LogLevel::Error, || {
                    "scheduler thread panicked".to_string()
                });
                None
            }
        }
    }

    fn post(&self, msg: ControlMessage) -> Result<(), EmuError> {
        self.ctrl_tx
            .send(msg)
            .map_err(|_| EmuError::Configuration("scheduler has shut down".to_string()))
    }

    pub fn pause(&self, paused: bool) -> Result<(), EmuError> {
        self.post(ControlMessage::Pause(paused))
    }

    pub fn set_configuration(&self, config: EmulationConfig) -> Result<(), EmuError> {
        self.post(ControlMessage::SetConfig(config))
    }

    pub fn load_state(&self, slot: u32) -> Result<(), EmuError> {
        self.post(ControlMessage::LoadState(slot))
    }

    pub fn save_state(&self, slot: u32) -> Result<(), EmuError> {
        self.post(ControlMessage::SaveState(slot))
    }

    pub fn set_fps_limiting(&self, enabled: bool) -> Result<(), EmuError> {
        self.post(ControlMessage::SetFpsLimiting(enabled))
    }
}

impl<M: Machine + 'static> Drop for Scheduler<M> {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.shutdown();
        }
    }
}
