//! Processing loop.
//!
//! One logical thread per run. For every frame, in order:
//! acquisition -> detection -> verdict -> actuation -> aggregation -> sink.
//! Cancellation is only checked between frames, so a stop request never
//! leaves the actuator out of step with the recorded statistics.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::access::{AccessController, AccessHardware, AccessState, Transition};
use crate::classes::ClassRegistry;
use crate::detect::{DetectionParams, DetectorBackend};
use crate::error::AccessError;
use crate::frame::{AnnotatedFrame, FrameStep};
use crate::ingest::FrameSource;
use crate::processor::FrameProcessor;
use crate::selector::TargetSet;
use crate::sink::VideoSink;
use crate::stats::{RunReport, RunStatistics};

pub const DEFAULT_PROGRESS_EVERY: u64 = 30;

pub const START_LINE1: &str = "PPE gate";
pub const START_LINE2: &str = "Processing...";
pub const STOP_LINE1: &str = "PPE gate";
pub const STOP_LINE2: &str = "Stopped";

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything fixed for the duration of a run.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub registry: ClassRegistry,
    pub targets: TargetSet,
    pub params: DetectionParams,
    pub frame_step: FrameStep,
    pub display_columns: usize,
    /// Log progress every N processed frames (0 disables).
    pub progress_every: u64,
}

impl RunPlan {
    pub fn new(registry: ClassRegistry, targets: TargetSet) -> Self {
        Self {
            registry,
            targets,
            params: DetectionParams::default(),
            frame_step: FrameStep::EVERY,
            display_columns: crate::access::hardware::DEFAULT_DISPLAY_COLUMNS,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RunEnd {
    /// The source reported end of stream.
    Exhausted,
    /// The cancel token was set.
    Cancelled,
    /// A read failed mid-run.
    SourceFailed(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    pub report: RunReport,
    pub final_state: AccessState,
    pub simulated: bool,
    pub frames_read: u64,
    pub frames_skipped: u64,
    pub transitions: u64,
    pub command_failures: u64,
    #[serde(serialize_with = "serialize_error")]
    pub sink_failure: Option<AccessError>,
    pub end: RunEnd,
}

fn serialize_error<S: Serializer>(err: &Option<AccessError>, s: S) -> Result<S::Ok, S::Error> {
    match err {
        Some(err) => s.serialize_some(&err.to_string()),
        None => s.serialize_none(),
    }
}

/// Snapshot handed to a `RunObserver` after each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunProgress {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub state: AccessState,
}

/// Hooks for operator feedback. Observers cannot influence the run.
pub trait RunObserver {
    fn on_frame(&mut self, _progress: &RunProgress) {}

    fn on_transition(&mut self, _transition: &Transition) {}
}

impl RunObserver for () {}

/// Owns the source and sink for the run and releases both exactly once,
/// including on early returns and panics.
struct Resources {
    source: Box<dyn FrameSource>,
    sink: Option<Box<dyn VideoSink>>,
    sink_failure: Option<AccessError>,
    released: bool,
}

impl Resources {
    fn forward(&mut self, frame: &AnnotatedFrame) {
        if self.sink_failure.is_some() {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.write(frame) {
                log::error!("{}; further frames will not be written", err);
                self.sink_failure = Some(err);
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.release() {
                log::error!("{}", err);
                if self.sink_failure.is_none() {
                    self.sink_failure = Some(err);
                }
            }
        }
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run the gate with no observer.
pub fn execute<S, H>(
    plan: &RunPlan,
    open_source: S,
    init_hardware: H,
    detector: &mut dyn DetectorBackend,
    sink: Option<Box<dyn VideoSink>>,
    cancel: &CancelToken,
) -> Result<RunOutcome, AccessError>
where
    S: FnOnce() -> Result<Box<dyn FrameSource>, AccessError>,
    H: FnOnce() -> Result<Box<dyn AccessHardware>, AccessError>,
{
    execute_observed(plan, open_source, init_hardware, detector, sink, cancel, &mut ())
}

/// Run the gate until the source ends, fails or `cancel` is set.
///
/// The source is opened first; if that fails the sink is released,
/// `SourceUnavailable` is returned and `init_hardware` is never called. A
/// hardware init failure downgrades the run to simulated actuation.
pub fn execute_observed<S, H>(
    plan: &RunPlan,
    open_source: S,
    init_hardware: H,
    detector: &mut dyn DetectorBackend,
    sink: Option<Box<dyn VideoSink>>,
    cancel: &CancelToken,
    observer: &mut dyn RunObserver,
) -> Result<RunOutcome, AccessError>
where
    S: FnOnce() -> Result<Box<dyn FrameSource>, AccessError>,
    H: FnOnce() -> Result<Box<dyn AccessHardware>, AccessError>,
{
    let source = match open_source() {
        Ok(source) => source,
        Err(err) => {
            if let Some(mut sink) = sink {
                if let Err(release_err) = sink.release() {
                    log::error!("{}", release_err);
                }
            }
            return Err(err);
        }
    };
    log::info!(
        "run: source={} detector={} targets={} step={}",
        source.location(),
        detector.name(),
        plan.targets.summary(),
        plan.frame_step.get()
    );
    let mut resources = Resources {
        source,
        sink,
        sink_failure: None,
        released: false,
    };

    let mut controller = AccessController::new(init_hardware(), plan.display_columns);
    if let Err(err) = detector.warm_up() {
        log::warn!("detector warm-up failed: {:#}", err);
    }
    controller.announce(START_LINE1, START_LINE2);

    let processor = FrameProcessor::new(&plan.registry, &plan.targets);
    let mut stats = RunStatistics::new(&plan.targets, &plan.registry);
    let mut frames_read = 0u64;
    let mut frames_skipped = 0u64;
    let mut frames_rejected = 0u64;

    let end = loop {
        if cancel.is_cancelled() {
            log::info!("run: stop requested after {} frames", frames_read);
            break RunEnd::Cancelled;
        }
        let frame = match resources.source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => break RunEnd::Exhausted,
            Err(err) => {
                log::error!("run: frame source failed: {:#}", err);
                break RunEnd::SourceFailed(format!("{:#}", err));
            }
        };
        frames_read += 1;

        let annotated = if !plan.frame_step.should_process(frames_read) {
            frames_skipped += 1;
            AnnotatedFrame::untouched(frame)
        } else {
            match detector.detect(&frame, &plan.params) {
                Err(err) => {
                    log::warn!("frame {}: detector failed: {:#}", frames_read, err);
                    stats.reject();
                    frames_rejected += 1;
                    AnnotatedFrame::untouched(frame)
                }
                Ok(detections) => match processor.process(frame, &detections) {
                    Err((err, frame)) => {
                        log::warn!("frame {}: {}; frame excluded", frames_read, err);
                        stats.reject();
                        frames_rejected += 1;
                        AnnotatedFrame::untouched(frame)
                    }
                    Ok(processed) => {
                        if let Some(transition) = controller.observe(&processed.verdict) {
                            observer.on_transition(&transition);
                        }
                        stats.record(&processed.verdict, &processed.tally);
                        let done = stats.frames_processed();
                        if plan.progress_every > 0 && done % plan.progress_every == 0 {
                            log::info!(
                                "progress: {} frames read, {} processed",
                                frames_read,
                                done
                            );
                        }
                        processed.annotated
                    }
                },
            }
        };

        resources.forward(&annotated);
        observer.on_frame(&RunProgress {
            frames_read,
            frames_processed: stats.frames_processed(),
            frames_rejected,
            state: controller.state(),
        });
    };

    resources.release();
    controller.announce(STOP_LINE1, STOP_LINE2);
    let simulated = controller.is_simulated();
    let transitions = controller.transitions();
    let command_failures = controller.command_failures();
    let final_state = controller.shutdown();

    let report = stats.report();
    log::info!(
        "run finished ({:?}): {} read, {} processed, {} rejected, state {:?}",
        end,
        frames_read,
        report.frames_processed,
        report.frames_rejected,
        final_state
    );

    Ok(RunOutcome {
        report,
        final_state,
        simulated,
        frames_read,
        frames_skipped,
        transitions,
        command_failures,
        sink_failure: resources.sink_failure.take(),
        end,
    })
}
