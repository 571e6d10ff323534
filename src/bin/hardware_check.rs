//! hardware_check - exercise the gate hardware
//!
//! Runs the self-test sequence (display, door open/close, granted and denied
//! signal pins, all pins low) against the configured hardware backend.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use ppe_gate::access::{init_hardware, self_test};
use ppe_gate::ui::Ui;
use ppe_gate::{GateConfig, HardwareBackend};

#[derive(Parser, Debug)]
#[command(name = "hardware_check", about = "Exercise door, pins and display")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, value_name = "PATH", env = "PPE_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Hardware backend (console|none)
    #[arg(long, value_name = "BACKEND")]
    hardware: Option<HardwareBackend>,

    /// Pause between steps, in milliseconds
    #[arg(long, default_value_t = 2000)]
    hold_ms: u64,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());
    let cfg = GateConfig::load_from(args.config.as_deref())?;
    let backend = args.hardware.unwrap_or(cfg.hardware.backend);

    let mut hw = {
        let _stage = ui.stage("Initialize hardware");
        init_hardware(backend, &cfg.hardware.profile)?
    };

    let steps = {
        let _stage = ui.stage("Self-test");
        self_test(hw.as_mut(), Duration::from_millis(args.hold_ms))
    };

    let mut failed = 0;
    for step in &steps {
        match &step.result {
            Ok(()) => println!("  ok    {}", step.name),
            Err(err) => {
                failed += 1;
                println!("  FAIL  {} ({})", step.name, err);
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!("{} of {} hardware steps failed", failed, steps.len()));
    }
    println!("hardware OK");
    Ok(())
}
