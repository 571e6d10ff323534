//! ppe_gate - run the PPE access gate
//!
//! Loads the gate configuration, resolves the required class set (from
//! configuration, `--targets`, or an interactive selection session), then
//! processes the frame source until it ends or Ctrl-C is pressed.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use ppe_gate::access::init_hardware;
use ppe_gate::pipeline::{execute_observed, CancelToken};
use ppe_gate::selector::{select_interactive, SelectionOutcome};
use ppe_gate::ui::Ui;
use ppe_gate::{
    DetectionParams, FileSource, FrameSource, FrameStep, GateConfig, OverlayLogSink,
    VideoSink,
};

#[derive(Parser, Debug)]
#[command(name = "ppe_gate", about = "PPE detection-to-access gate", version)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, value_name = "PATH", env = "PPE_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Choose the required classes interactively before the run
    #[arg(long, conflicts_with = "targets")]
    select: bool,

    /// Comma-separated required classes, or ALL
    #[arg(long, value_delimiter = ',', value_name = "CLASSES")]
    targets: Option<Vec<String>>,

    /// Frame source: local video file or stub://<name>
    #[arg(long, value_name = "PATH")]
    source: Option<String>,

    /// Stop after this many frames
    #[arg(long)]
    frame_limit: Option<u64>,

    /// Process every k-th frame
    #[arg(long, value_name = "K")]
    frame_step: Option<u64>,

    /// Detection confidence threshold (clamped to 0.1-1.0)
    #[arg(long)]
    confidence: Option<f32>,

    /// Detector input size (rounded down to a multiple of 32 in 320-1280)
    #[arg(long)]
    input_size: Option<u32>,

    /// Hardware backend (console|none)
    #[arg(long, value_name = "BACKEND")]
    hardware: Option<String>,

    /// Write per-frame overlay records (JSON lines) to this file
    #[arg(long, value_name = "PATH")]
    sink: Option<PathBuf>,

    /// Write the end-of-run report as JSON to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = GateConfig::load_from(args.config.as_deref())?;
        apply_args(&mut cfg, &args)?;
        cfg
    };

    let registry = cfg.registry()?;
    let targets = if args.select {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        match select_interactive(&registry, stdin.lock(), &mut stdout)? {
            SelectionOutcome::Committed(targets) => targets,
            SelectionOutcome::Aborted => {
                log::info!("selection aborted; nothing to run");
                return Ok(());
            }
        }
    } else {
        cfg.target_set(&registry)?
    };
    log::info!("required classes: {}", targets.summary());

    let mut detector = cfg.open_detector()?;
    let sink: Option<Box<dyn VideoSink>> = match &cfg.sink_path {
        Some(path) => Some(Box::new(OverlayLogSink::create(path)?)),
        None => None,
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("stop requested; finishing the current frame");
        handler_token.cancel();
    })
    .context("install Ctrl-C handler")?;

    let plan = cfg.run_plan(registry, targets);
    let source_config = cfg.source.clone();
    let hardware = cfg.hardware.clone();
    let mut indicator = ui.run_progress(source_config.frame_limit);

    let outcome = execute_observed(
        &plan,
        move || {
            FileSource::open(source_config).map(|source| Box::new(source) as Box<dyn FrameSource>)
        },
        move || init_hardware(hardware.backend, &hardware.profile),
        detector.as_mut(),
        sink,
        &cancel,
        &mut indicator,
    )?;
    indicator.finish();

    println!("{}", outcome.report.summary());
    println!(
        "Final state: {:?}{}",
        outcome.final_state,
        if outcome.simulated { " (simulated)" } else { "" }
    );
    if let Some(err) = &outcome.sink_failure {
        println!("Output incomplete: {}", err);
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        log::info!("run report written to {}", path.display());
    }

    Ok(())
}

fn apply_args(cfg: &mut GateConfig, args: &Args) -> Result<()> {
    if let Some(targets) = &args.targets {
        cfg.targets = targets
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if cfg.targets.is_empty() {
            return Err(anyhow!("--targets needs at least one class (or ALL)"));
        }
    }
    if let Some(source) = &args.source {
        cfg.source.path = source.clone();
    }
    if let Some(limit) = args.frame_limit {
        cfg.source.frame_limit = Some(limit);
    }
    if let Some(step) = args.frame_step {
        cfg.frame_step = FrameStep::new(step).ok_or_else(|| anyhow!("--frame-step must be >= 1"))?;
    }
    if args.confidence.is_some() || args.input_size.is_some() {
        cfg.detector.params = DetectionParams::new(
            args.confidence.unwrap_or(cfg.detector.params.confidence()),
            args.input_size.unwrap_or(cfg.detector.params.input_size()),
        );
    }
    if let Some(backend) = &args.hardware {
        cfg.hardware.backend = backend.parse()?;
    }
    if let Some(path) = &args.sink {
        cfg.sink_path = Some(path.clone());
    }
    Ok(())
}
