//! PPE Access Gate
//!
//! Detection-to-access decision engine: per frame, decide whether every
//! required piece of personal protective equipment is visible and drive a
//! door actuator, signal pins and a status display accordingly.
//!
//! # Architecture
//!
//! The engine holds these properties by construction:
//!
//! 1. **Registry-checked classes**: a detector label outside the class
//!    registry is an `UnknownClass` error for that frame, never a silent
//!    miscount.
//! 2. **Minimal actuation**: hardware is commanded only when the access
//!    state changes.
//! 3. **Decided once**: source and hardware availability are established at
//!    run start; a hardware failure downgrades the whole run to simulated.
//! 4. **Ordered**: frames are handled strictly one after another; actuator
//!    commands follow frame order.
//! 5. **Released**: source and sink are released on every exit path.
//!
//! # Module Structure
//!
//! - `classes`: class catalog (ClassRegistry, ClassName, manifest)
//! - `selector`: target selection protocol (TargetSet, SelectorSession)
//! - `detect`: detector boundary and backends
//! - `processor`: per-frame verdict and annotation
//! - `access`: access state machine and hardware collaborators
//! - `stats`: run aggregation
//! - `ingest` / `sink`: frame source and video sink boundaries
//! - `pipeline`: the processing loop
//! - `config`, `ui`: operator plumbing for the binaries

pub mod access;
pub mod classes;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod processor;
pub mod selector;
pub mod sink;
pub mod stats;
pub mod ui;

pub use access::{
    AccessController, AccessHardware, AccessState, ActuatorCommand, ConsoleHardware,
    HardwareBackend, HardwareProfile, RecordingHardware, Transition,
};
pub use classes::{ClassGroup, ClassManifest, ClassName, ClassRegistry};
pub use config::GateConfig;
pub use detect::{Detection, DetectionParams, DetectorBackend, ReplayBackend, ScriptedBackend};
pub use error::AccessError;
pub use frame::{AnnotatedFrame, Frame, FrameStep, Overlay};
pub use ingest::{FileConfig, FileSource, FrameSource};
pub use pipeline::{execute, CancelToken, RunEnd, RunOutcome, RunPlan};
pub use processor::{Annotator, FrameProcessor, FrameVerdict, ProcessedFrame, StatusOverlay};
pub use selector::{
    replay, select_interactive, SelectionOutcome, SelectorCommand, SelectorSession, TargetSet,
};
pub use sink::{OverlayLogSink, VideoSink};
pub use stats::{RunReport, RunStatistics};
