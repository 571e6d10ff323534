//! class_manifest - write or check the class-manifest document
//!
//! The manifest maps each group (equipment, missing, other) to an ordered
//! list of class names. `write` exports the built-in PPE catalog; `check`
//! loads a manifest and prints the numbered catalog the selector would show.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ppe_gate::{ClassManifest, ClassRegistry};

#[derive(Parser, Debug)]
#[command(name = "class_manifest", about = "Write or check a class manifest")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the built-in 14-class PPE catalog
    Write {
        #[arg(long, value_name = "PATH", default_value = "classes.json")]
        out: PathBuf,
    },
    /// Validate a manifest and list its classes with selector indices
    Check {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Write { out } => {
            let registry = ClassRegistry::ppe_default();
            registry.to_manifest().write(&out)?;
            println!("wrote {} classes to {}", registry.len(), out.display());
        }
        Command::Check { path } => {
            let manifest = ClassManifest::read(&path)?;
            let registry = ClassRegistry::from_manifest(&manifest)?;
            let groups = registry.groups();
            let mut index = 1;
            for (title, classes) in [
                ("equipment", groups.equipment),
                ("missing", groups.missing),
                ("other", groups.other),
            ] {
                println!("{}:", title);
                for class in classes {
                    println!("  [{:2}] {}", index, class);
                    index += 1;
                }
            }
            println!("OK: {} classes", registry.len());
        }
    }
    Ok(())
}
