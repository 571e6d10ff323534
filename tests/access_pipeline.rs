use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use ppe_gate::access::{AccessHardware, AccessState, ActuatorCommand, RecordingHardware};
use ppe_gate::classes::ClassRegistry;
use ppe_gate::detect::{Detection, DetectionParams, DetectorBackend, ScriptedBackend};
use ppe_gate::frame::{AnnotatedFrame, Frame, FrameStep};
use ppe_gate::ingest::{FileConfig, FileSource, FrameSource};
use ppe_gate::pipeline::{
    execute, execute_observed, CancelToken, RunEnd, RunObserver, RunPlan, RunProgress,
};
use ppe_gate::selector::TargetSet;
use ppe_gate::sink::VideoSink;
use ppe_gate::AccessError;

fn plan(targets: &[&str]) -> RunPlan {
    let registry = ClassRegistry::ppe_default();
    let targets = TargetSet::resolve(&registry, targets).expect("targets");
    RunPlan::new(registry, targets)
}

fn stub(limit: Option<u64>) -> Result<Box<dyn FrameSource>, AccessError> {
    Ok(Box::new(FileSource::open(FileConfig::synthetic("gate", limit))?))
}

fn hardware(probe: &RecordingHardware) -> Result<Box<dyn AccessHardware>, AccessError> {
    Ok(Box::new(probe.clone()))
}

/// Sink that records (frame index, annotated) and can fail on a given write.
#[derive(Clone, Default)]
struct MemorySink {
    frames: Arc<Mutex<Vec<(u64, bool)>>>,
    attempts: Arc<Mutex<u64>>,
    fail_on_write: Option<u64>,
    released: Arc<AtomicBool>,
}

impl VideoSink for MemorySink {
    fn write(&mut self, frame: &AnnotatedFrame) -> Result<(), AccessError> {
        let mut attempts = self.attempts.lock().unwrap();
        *attempts += 1;
        if self.fail_on_write == Some(*attempts) {
            return Err(AccessError::SinkWrite("disk full".to_string()));
        }
        self.frames
            .lock()
            .unwrap()
            .push((frame.frame.index, frame.is_annotated()));
        Ok(())
    }

    fn release(&mut self) -> Result<(), AccessError> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn missing_vest_denies_then_full_kit_opens_door_once() {
    let plan = plan(&["Hardhat", "Safety Vest"]);
    let probe = RecordingHardware::new();
    let mut detector = ScriptedBackend::from_labels(&[
        &["Hardhat", "Person"],
        &["Hardhat", "Safety Vest", "Safety Vest"],
    ]);

    let outcome = execute(
        &plan,
        || stub(Some(2)),
        || hardware(&probe),
        &mut detector,
        None,
        &CancelToken::new(),
    )
    .expect("run");

    assert_eq!(outcome.end, RunEnd::Exhausted);
    assert_eq!(outcome.final_state, AccessState::Permitted);
    assert!(!outcome.simulated);
    assert_eq!(outcome.transitions, 2);
    assert_eq!(outcome.report.frames_processed, 2);
    assert_eq!(outcome.report.frames_complete, 1);
    assert_eq!(outcome.report.count("Safety Vest"), Some(2));
    assert_eq!(outcome.report.count("Hardhat"), Some(2));

    let commands = probe.commands();
    assert_eq!(
        commands,
        vec![
            ActuatorCommand::ShowStatus {
                line1: "PPE gate".to_string(),
                line2: "Processing...".to_string(),
            },
            ActuatorCommand::SetPins { granted: false },
            ActuatorCommand::ShowStatus {
                line1: "ACCESS DENIED".to_string(),
                line2: "Missing Safety V".to_string(),
            },
            ActuatorCommand::SetDoor { open: false },
            ActuatorCommand::SetPins { granted: true },
            ActuatorCommand::ShowStatus {
                line1: "ACCESS GRANTED".to_string(),
                line2: "PPE complete".to_string(),
            },
            ActuatorCommand::SetDoor { open: true },
            ActuatorCommand::ShowStatus {
                line1: "PPE gate".to_string(),
                line2: "Stopped".to_string(),
            },
            ActuatorCommand::Shutdown,
        ]
    );
    assert_eq!(probe.door_moves(true), 1);
}

#[test]
fn repeated_verdicts_do_not_recommand_hardware() {
    let plan = plan(&["Hardhat"]);
    let probe = RecordingHardware::new();
    let mut detector = ScriptedBackend::from_labels(&[
        &["Hardhat"],
        &["Hardhat"],
        &[],
        &["Person"],
        &["Hardhat"],
    ]);

    let outcome = execute(
        &plan,
        || stub(Some(5)),
        || hardware(&probe),
        &mut detector,
        None,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.transitions, 3);
    assert_eq!(probe.door_moves(true), 2);
    assert_eq!(probe.door_moves(false), 1);
    assert_eq!(outcome.report.completion_rate, Some(0.6));
}

#[test]
fn skipped_frames_reach_the_sink_untouched() {
    let plan = RunPlan {
        frame_step: FrameStep::new(3).unwrap(),
        ..plan(&["Hardhat"])
    };
    let sink = MemorySink::default();
    let mut detector = ScriptedBackend::new(vec![vec![Detection::new("Hardhat", 0.9)]]);

    let outcome = execute(
        &plan,
        || stub(Some(7)),
        || Err(AccessError::ActuatorUnavailable("no gpio".to_string())),
        &mut detector,
        Some(Box::new(sink.clone())),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(detector.calls(), 2);
    assert_eq!(outcome.frames_read, 7);
    assert_eq!(outcome.frames_skipped, 5);
    assert_eq!(outcome.report.frames_processed, 2);
    let frames = sink.frames.lock().unwrap().clone();
    assert_eq!(
        frames,
        vec![
            (1, false),
            (2, false),
            (3, true),
            (4, false),
            (5, false),
            (6, true),
            (7, false)
        ]
    );
    assert!(sink.released.load(Ordering::SeqCst));
}

#[test]
fn sink_failure_is_reported_and_run_continues() {
    let plan = plan(&["Hardhat"]);
    let sink = MemorySink {
        fail_on_write: Some(2),
        ..MemorySink::default()
    };
    let mut detector = ScriptedBackend::new(vec![vec![Detection::new("Hardhat", 0.9)]]);

    let outcome = execute(
        &plan,
        || stub(Some(4)),
        || Err(AccessError::ActuatorUnavailable("no gpio".to_string())),
        &mut detector,
        Some(Box::new(sink.clone())),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.end, RunEnd::Exhausted);
    assert_eq!(outcome.report.frames_processed, 4);
    assert!(matches!(outcome.sink_failure, Some(AccessError::SinkWrite(_))));
    assert_eq!(*sink.attempts.lock().unwrap(), 2);
    assert_eq!(sink.frames.lock().unwrap().len(), 1);
    assert!(sink.released.load(Ordering::SeqCst));
}

#[test]
fn unavailable_source_skips_hardware_init() {
    let plan = plan(&["Hardhat"]);
    let mut hardware_requested = false;
    let mut detector = ScriptedBackend::demo();

    let result = execute(
        &plan,
        || {
            Ok(Box::new(FileSource::open(FileConfig {
                path: "/nonexistent/gate.mp4".to_string(),
                ..FileConfig::default()
            })?) as Box<dyn FrameSource>)
        },
        || {
            hardware_requested = true;
            Err(AccessError::ActuatorUnavailable("unused".to_string()))
        },
        &mut detector,
        None,
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(AccessError::SourceUnavailable { .. })));
    assert!(!hardware_requested);
    assert_eq!(detector.calls(), 0);
}

#[test]
fn unavailable_source_still_releases_the_sink() {
    let plan = plan(&["Hardhat"]);
    let sink = MemorySink::default();
    let mut detector = ScriptedBackend::demo();

    let result = execute(
        &plan,
        || {
            Err(AccessError::SourceUnavailable {
                location: "rtsp://dock".to_string(),
                reason: "remote sources are not supported".to_string(),
            })
        },
        || Err(AccessError::ActuatorUnavailable("unused".to_string())),
        &mut detector,
        Some(Box::new(sink.clone())),
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(AccessError::SourceUnavailable { .. })));
    assert!(sink.released.load(Ordering::SeqCst));
    assert!(sink.frames.lock().unwrap().is_empty());
}

#[test]
fn hardware_failure_downgrades_to_simulated() {
    let plan = plan(&["Hardhat", "Mask"]);
    let mut detector = ScriptedBackend::from_labels(&[&["Hardhat"], &["Hardhat", "Mask"]]);

    let outcome = execute(
        &plan,
        || stub(Some(2)),
        || Err(AccessError::ActuatorUnavailable("i2c bus missing".to_string())),
        &mut detector,
        None,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(outcome.simulated);
    assert_eq!(outcome.transitions, 2);
    assert_eq!(outcome.command_failures, 0);
    assert_eq!(outcome.final_state, AccessState::Permitted);
}

#[test]
fn failing_actuator_calls_are_counted() {
    let plan = plan(&["Hardhat"]);
    let probe = RecordingHardware::new();
    probe.fail_on("set_door");
    let mut detector = ScriptedBackend::from_labels(&[&["Hardhat"], &[], &["Hardhat"]]);

    let outcome = execute(
        &plan,
        || stub(Some(3)),
        || hardware(&probe),
        &mut detector,
        None,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(!outcome.simulated);
    assert_eq!(outcome.transitions, 3);
    assert_eq!(outcome.command_failures, 3);
    assert_eq!(outcome.final_state, AccessState::Permitted);
}

#[test]
fn unknown_labels_reject_only_that_frame() {
    let plan = plan(&["Hardhat"]);
    let sink = MemorySink::default();
    let mut detector = ScriptedBackend::from_labels(&[&["Hardhat", "Helmet"], &["Hardhat"]]);

    let outcome = execute(
        &plan,
        || stub(Some(2)),
        || Err(AccessError::ActuatorUnavailable("no gpio".to_string())),
        &mut detector,
        Some(Box::new(sink.clone())),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.report.frames_rejected, 1);
    assert_eq!(outcome.report.frames_processed, 1);
    assert_eq!(outcome.report.count("Hardhat"), Some(1));
    assert_eq!(outcome.transitions, 1);
    assert_eq!(*sink.frames.lock().unwrap(), vec![(1, false), (2, true)]);
}

struct FlakyDetector {
    calls: u64,
}

impl DetectorBackend for FlakyDetector {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn detect(
        &mut self,
        _frame: &Frame,
        _params: &DetectionParams,
    ) -> anyhow::Result<Vec<Detection>> {
        self.calls += 1;
        if self.calls == 1 {
            return Err(anyhow!("inference timed out"));
        }
        Ok(vec![Detection::new("Hardhat", 0.8)])
    }
}

#[test]
fn detector_errors_are_frame_local() {
    let plan = plan(&["Hardhat"]);
    let mut detector = FlakyDetector { calls: 0 };

    let outcome = execute(
        &plan,
        || stub(Some(3)),
        || Err(AccessError::ActuatorUnavailable("no gpio".to_string())),
        &mut detector,
        None,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.end, RunEnd::Exhausted);
    assert_eq!(outcome.report.frames_rejected, 1);
    assert_eq!(outcome.report.frames_processed, 2);
}

struct CancelAfter {
    token: CancelToken,
    frames: u64,
    seen: Vec<RunProgress>,
}

impl RunObserver for CancelAfter {
    fn on_frame(&mut self, progress: &RunProgress) {
        self.seen.push(*progress);
        if progress.frames_read == self.frames {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_finishes_the_in_flight_frame() {
    let plan = plan(&["Hardhat"]);
    let probe = RecordingHardware::new();
    let cancel = CancelToken::new();
    let mut observer = CancelAfter {
        token: cancel.clone(),
        frames: 3,
        seen: Vec::new(),
    };
    let mut detector = ScriptedBackend::new(vec![vec![Detection::new("Hardhat", 0.9)]]);

    let outcome = execute_observed(
        &plan,
        || stub(None),
        || hardware(&probe),
        &mut detector,
        None,
        &cancel,
        &mut observer,
    )
    .unwrap();

    assert_eq!(outcome.end, RunEnd::Cancelled);
    assert_eq!(outcome.frames_read, 3);
    assert_eq!(outcome.report.frames_processed, 3);
    assert_eq!(observer.seen.len(), 3);
    assert_eq!(observer.seen[2].state, AccessState::Permitted);
    assert_eq!(probe.commands().last(), Some(&ActuatorCommand::Shutdown));
}

/// Source that fails on its second read and records its release.
struct BrokenSource {
    reads: u64,
    released: Arc<AtomicBool>,
}

impl FrameSource for BrokenSource {
    fn location(&self) -> &str {
        "test://broken"
    }

    fn is_open(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        self.reads += 1;
        if self.reads > 1 {
            return Err(anyhow!("usb camera disconnected"));
        }
        Ok(Some(Frame::new(self.reads, 2, 2, vec![0; 12])))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn read_failure_ends_run_and_releases_resources() {
    let plan = plan(&["Hardhat"]);
    let released = Arc::new(AtomicBool::new(false));
    let source_flag = released.clone();
    let sink = MemorySink::default();
    let mut detector = ScriptedBackend::new(vec![vec![Detection::new("Hardhat", 0.9)]]);

    let outcome = execute(
        &plan,
        move || {
            Ok(Box::new(BrokenSource {
                reads: 0,
                released: source_flag,
            }) as Box<dyn FrameSource>)
        },
        || Err(AccessError::ActuatorUnavailable("no gpio".to_string())),
        &mut detector,
        Some(Box::new(sink.clone())),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(matches!(outcome.end, RunEnd::SourceFailed(ref reason) if reason.contains("disconnected")));
    assert_eq!(outcome.frames_read, 1);
    assert!(released.load(Ordering::SeqCst));
    assert!(sink.released.load(Ordering::SeqCst));
}

#[test]
fn all_mode_counts_everything_and_always_permits() {
    let registry = ClassRegistry::ppe_default();
    let plan = RunPlan::new(registry, TargetSet::All);
    let probe = RecordingHardware::new();
    let mut detector =
        ScriptedBackend::from_labels(&[&[], &["Person", "Ladder"], &["Person"]]);

    let outcome = execute(
        &plan,
        || stub(Some(3)),
        || hardware(&probe),
        &mut detector,
        None,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.transitions, 1);
    assert_eq!(outcome.final_state, AccessState::Permitted);
    assert_eq!(outcome.report.count("Person"), Some(2));
    assert_eq!(outcome.report.count("Ladder"), Some(1));
    assert_eq!(outcome.report.completion_rate, Some(1.0));
}
