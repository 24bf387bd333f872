mod clock;
mod core;
mod workspace;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use self::core::{
    BurstAbort, BurstResult, CaptureRequest, CaptureSequencer, PhotoArtifact, SequencerTick,
};
pub use workspace::SessionWorkspace;
