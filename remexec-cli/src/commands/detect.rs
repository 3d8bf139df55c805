//! Backend detection report

use anyhow::{bail, Result};
use clap::Parser;
use remexec_core::{BackendKind, PathLocator, Platform, RemexecConfig};

#[derive(Parser, Debug)]
pub struct DetectArgs {
    /// Also list every backend found on PATH
    #[arg(long)]
    pub all: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run_detect(args: DetectArgs, config: &RemexecConfig) -> Result<()> {
    let platform = Platform::current();
    let selected = config.resolve_backend(platform, &PathLocator);

    let available: Vec<_> = if args.all {
        BackendKind::ALL
            .iter()
            .filter_map(|kind| which::which(kind.executable_name()).ok().map(|p| (*kind, p)))
            .collect()
    } else {
        Vec::new()
    };

    if args.json {
        let doc = serde_json::json!({
            "selected": selected,
            "bundle_dir": config.bundle_dir(),
            "available": available
                .iter()
                .map(|(kind, path)| serde_json::json!({ "kind": kind, "program": path }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    match &selected {
        Some(backend) => {
            println!("{} {}", backend.kind, backend.program.display());
            if !backend.program.exists() && which::which(&backend.program).is_err() {
                eprintln!("⚠️  {} does not exist yet", backend.program.display());
            }
        }
        None => {
            if platform.windows {
                eprintln!(
                    "Install paexec or psexec, or place paexec.exe in {}",
                    config.bundle_dir().display()
                );
            } else {
                eprintln!("Install impacket (psexec.py) or winexe, or set backend.program in the config");
            }
            for (kind, path) in &available {
                println!("  available: {} {}", kind, path.display());
            }
            bail!("no remote execution backend found");
        }
    }

    for (kind, path) in &available {
        println!("  available: {} {}", kind, path.display());
    }

    Ok(())
}
