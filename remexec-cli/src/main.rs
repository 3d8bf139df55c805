//! remexec CLI - run commands on remote Windows hosts
//!
//! Thin front end over `remexec-core`, which drives an installed backend:
//! - `run` executes a command and streams its output
//! - `args` prints the backend command line without running it
//! - `detect` shows which backend would be used
//! - `config` manages ~/.remexec/config.toml

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use remexec_core::RemexecConfig;

mod commands;
mod config;
mod tracing_setup;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "remexec",
    author,
    version,
    about = "Run commands on remote Windows hosts through winexe, psexec, paexec or psexec.py",
    long_about = "Run a command on a remote Windows host by driving an installed remote-execution \
                  tool. Output is streamed line by line with backend banners removed, and an \
                  optional timeout kills a hung backend."
)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    /// Suppress progress spinners (for script consumption)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command on a remote host
    Run(commands::exec::RunArgs),
    /// Print the backend command line for a remote command without running it
    Args(commands::exec::ArgsArgs),
    /// Show which backend would be used
    Detect(commands::detect::DetectArgs),
    /// Manage remexec configuration (init, show, validate, path)
    Config(config::ConfigArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();
    ui::init_quiet_mode(cli.quiet);

    let code = dispatch(cli.command).await;
    tracing_setup::shutdown_otel();

    match code? {
        0 => Ok(()),
        code => std::process::exit(code),
    }
}

async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run(args) => commands::run_run(args, &RemexecConfig::load()?).await,
        Commands::Args(args) => commands::run_args(args, &RemexecConfig::load()?).map(|_| 0),
        Commands::Detect(args) => commands::run_detect(args, &RemexecConfig::load()?).map(|_| 0),
        Commands::Config(args) => config::run_config(args).map(|_| 0),
        Commands::Completions(args) => run_completions(args).map(|_| 0),
    }
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}
