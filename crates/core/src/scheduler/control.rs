use crate::config::EmulationConfig;

/// Intents posted from the UI thread to the simulation thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Pause toggles are applied in order, one event each.
    Pause(bool),
    /// Latest wins; applied after the current frame.
    SetConfig(EmulationConfig),
    /// Latest wins; applied before the next frame.
    LoadState(u32),
    /// Latest wins; applied after the current frame.
    SaveState(u32),
    SetFpsLimiting(bool),
    Shutdown,
}
