use crate::types::Viewport;

/// Results published by value from the simulation thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    FrameRendered {
        width: u32,
        height: u32,
        bgra: Vec<u8>,
    },
    /// Interleaved stereo samples for one frame.
    SamplesEnqueued(Vec<i16>),
    ViewportChanged(Viewport),
    PauseChanged(bool),
    FpsUpdated(f64),
    StateSaved(u32),
    StateLoaded(u32),
    /// A save or load failed; live state is unchanged.
    StateOperationFailed {
        slot: u32,
        message: String,
    },
    ConfigurationApplied,
    /// The configuration failed validation and was not applied.
    ConfigurationRejected(String),
}
