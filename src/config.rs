use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::access::hardware::{
    HardwareBackend, HardwareProfile, DEFAULT_DENIED_PINS, DEFAULT_DISPLAY_COLUMNS,
    DEFAULT_GRANTED_PINS, DEFAULT_LCD_ADDRESS, DEFAULT_SERVO_PIN, DEFAULT_SETTLE_MS,
};
use crate::classes::{ClassManifest, ClassRegistry};
use crate::detect::{
    DetectionParams, DetectorBackend, ReplayBackend, ScriptedBackend, DEFAULT_CONFIDENCE,
    DEFAULT_INPUT_SIZE,
};
use crate::frame::FrameStep;
use crate::ingest::FileConfig;
use crate::pipeline::RunPlan;
use crate::selector::{TargetSet, ALL_TARGETS};

pub const CONFIG_ENV: &str = "PPE_GATE_CONFIG";

const DEFAULT_SOURCE_PATH: &str = "stub://gate_camera";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GateConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    targets: Option<Vec<String>>,
    frame_step: Option<u64>,
    hardware: Option<HardwareConfigFile>,
    output: Option<OutputConfigFile>,
    classes: Option<ClassesConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    path: Option<String>,
    frame_limit: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    replay_path: Option<PathBuf>,
    confidence: Option<f32>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct HardwareConfigFile {
    backend: Option<String>,
    granted_pins: Option<Vec<u8>>,
    denied_pins: Option<Vec<u8>>,
    servo_pin: Option<u8>,
    settle_ms: Option<u64>,
    display_columns: Option<usize>,
    lcd_address: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    sink_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassesConfigFile {
    manifest_path: Option<PathBuf>,
}

/// Which detector drives the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// Built-in scripted scene (demos, tests).
    Scripted,
    /// JSON-lines file of recorded detections.
    Replay,
}

impl std::str::FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "scripted" => Ok(DetectorKind::Scripted),
            "replay" => Ok(DetectorKind::Replay),
            other => Err(anyhow!(
                "unknown detector backend '{}' (expected scripted or replay)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub source: FileConfig,
    pub detector: DetectorSettings,
    /// Target labels as configured; `["ALL"]` selects every class.
    pub targets: Vec<String>,
    pub frame_step: FrameStep,
    pub hardware: HardwareSettings,
    pub sink_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: DetectorKind,
    pub replay_path: Option<PathBuf>,
    pub params: DetectionParams,
}

#[derive(Debug, Clone)]
pub struct HardwareSettings {
    pub backend: HardwareBackend,
    pub profile: HardwareProfile,
}

impl GateConfig {
    /// Defaults, then the file named by `PPE_GATE_CONFIG`, then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file instead of `PPE_GATE_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GateConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let hardware = file.hardware.unwrap_or_default();

        let frame_step = parse_frame_step(file.frame_step.unwrap_or(1))?;
        let backend = match detector.backend.as_deref() {
            Some(name) => name.parse()?,
            None => DetectorKind::Scripted,
        };
        let hardware_backend = match hardware.backend.as_deref() {
            Some(name) => name.parse()?,
            None => HardwareBackend::Console,
        };

        Ok(Self {
            source: FileConfig {
                path: source
                    .path
                    .unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string()),
                frame_limit: source.frame_limit,
            },
            detector: DetectorSettings {
                backend,
                replay_path: detector.replay_path,
                params: DetectionParams::new(
                    detector.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                    detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                ),
            },
            targets: file
                .targets
                .unwrap_or_else(|| vec![ALL_TARGETS.to_string()]),
            frame_step,
            hardware: HardwareSettings {
                backend: hardware_backend,
                profile: HardwareProfile {
                    granted_pins: hardware
                        .granted_pins
                        .unwrap_or_else(|| DEFAULT_GRANTED_PINS.to_vec()),
                    denied_pins: hardware
                        .denied_pins
                        .unwrap_or_else(|| DEFAULT_DENIED_PINS.to_vec()),
                    servo_pin: hardware.servo_pin.unwrap_or(DEFAULT_SERVO_PIN),
                    settle: Duration::from_millis(hardware.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
                    display_columns: hardware
                        .display_columns
                        .unwrap_or(DEFAULT_DISPLAY_COLUMNS),
                    lcd_address: hardware.lcd_address.unwrap_or(DEFAULT_LCD_ADDRESS),
                },
            },
            sink_path: file.output.and_then(|output| output.sink_path),
            manifest_path: file.classes.and_then(|classes| classes.manifest_path),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("PPE_GATE_SOURCE") {
            self.source.path = path;
        }
        if let Some(limit) = env_value("PPE_GATE_FRAME_LIMIT") {
            let limit: u64 = limit
                .parse()
                .map_err(|_| anyhow!("PPE_GATE_FRAME_LIMIT must be a whole number of frames"))?;
            self.source.frame_limit = Some(limit);
        }
        if let Some(backend) = env_value("PPE_GATE_DETECTOR") {
            self.detector.backend = backend.parse()?;
        }
        if let Some(path) = env_value("PPE_GATE_REPLAY_PATH") {
            self.detector.replay_path = Some(PathBuf::from(path));
        }
        if let Some(confidence) = env_value("PPE_GATE_CONFIDENCE") {
            let confidence: f32 = confidence
                .parse()
                .map_err(|_| anyhow!("PPE_GATE_CONFIDENCE must be a number"))?;
            self.detector.params =
                DetectionParams::new(confidence, self.detector.params.input_size());
        }
        if let Some(size) = env_value("PPE_GATE_INPUT_SIZE") {
            let size: u32 = size
                .parse()
                .map_err(|_| anyhow!("PPE_GATE_INPUT_SIZE must be a whole number of pixels"))?;
            self.detector.params = DetectionParams::new(self.detector.params.confidence(), size);
        }
        if let Some(targets) = env_value("PPE_GATE_TARGETS") {
            self.targets = split_csv(&targets);
        }
        if let Some(step) = env_value("PPE_GATE_FRAME_STEP") {
            let step: u64 = step
                .parse()
                .map_err(|_| anyhow!("PPE_GATE_FRAME_STEP must be a whole number"))?;
            self.frame_step = parse_frame_step(step)?;
        }
        if let Some(backend) = env_value("PPE_GATE_HARDWARE") {
            self.hardware.backend = backend.parse()?;
        }
        if let Some(path) = env_value("PPE_GATE_SINK") {
            self.sink_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("PPE_GATE_CLASSES") {
            self.manifest_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(anyhow!(
                "targets must name at least one class (use {} explicitly)",
                ALL_TARGETS
            ));
        }
        if self.detector.backend == DetectorKind::Replay && self.detector.replay_path.is_none() {
            return Err(anyhow!("replay detector requires detector.replay_path"));
        }
        self.hardware
            .profile
            .validate()
            .map_err(|e| anyhow!("invalid hardware profile: {}", e))?;
        Ok(())
    }

    /// The class catalog: the manifest when configured, the built-in PPE
    /// catalog otherwise.
    pub fn registry(&self) -> Result<ClassRegistry> {
        match &self.manifest_path {
            Some(path) => {
                let manifest = ClassManifest::read(path)?;
                ClassRegistry::from_manifest(&manifest)
                    .with_context(|| format!("class manifest {}", path.display()))
            }
            None => Ok(ClassRegistry::ppe_default()),
        }
    }

    /// Resolve the configured target labels against `registry`.
    pub fn target_set(&self, registry: &ClassRegistry) -> Result<TargetSet> {
        TargetSet::resolve(registry, &self.targets).context("resolve configured targets")
    }

    pub fn open_detector(&self) -> Result<Box<dyn DetectorBackend>> {
        match self.detector.backend {
            DetectorKind::Scripted => Ok(Box::new(ScriptedBackend::demo())),
            DetectorKind::Replay => {
                let path = self
                    .detector
                    .replay_path
                    .as_deref()
                    .ok_or_else(|| anyhow!("replay detector requires detector.replay_path"))?;
                Ok(Box::new(ReplayBackend::open(path)?))
            }
        }
    }

    pub fn run_plan(&self, registry: ClassRegistry, targets: TargetSet) -> RunPlan {
        RunPlan {
            params: self.detector.params,
            frame_step: self.frame_step,
            display_columns: self.hardware.profile.display_columns,
            ..RunPlan::new(registry, targets)
        }
    }
}

fn parse_frame_step(step: u64) -> Result<FrameStep> {
    FrameStep::new(step).ok_or_else(|| anyhow!("frame_step must be at least 1"))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<GateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
