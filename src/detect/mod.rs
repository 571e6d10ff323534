mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ReplayBackend, ScriptedBackend};
pub use result::{
    clamp_confidence, round_input_size, BoundingBox, Detection, DetectionParams,
    DEFAULT_CONFIDENCE, DEFAULT_INPUT_SIZE,
};
