//! Remote execution commands
//!
//! Commands: run, args

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use remexec_core::{
    Backend, BackendKind, CopyOptions, CopySource, ExecError, ExecEvent,
    ExecOptions, ExecOutput, Overwrite, PathLocator, Platform, RemexecConfig, RemoteExec,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::ui;

/// Exit status used when the run is interrupted with Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

// === Arg Structs ===

/// Target host, credentials and backend options shared by `run` and `args`
#[derive(Parser, Debug)]
pub struct TargetArgs {
    /// Host name, IP address, or a [hosts.<name>] profile from the config
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Account name (user, DOMAIN\user or DOMAIN/user)
    #[arg(long, short = 'u')]
    pub user: Option<String>,

    /// Password (prefer --password-env; visible in the process list)
    #[arg(long, short = 'p')]
    pub password: Option<String>,

    /// Read the password from this environment variable
    #[arg(long, value_name = "VAR")]
    pub password_env: Option<String>,

    /// Run the remote command as SYSTEM
    #[arg(long)]
    pub system: bool,

    /// Run with the account's elevated token (psexec/paexec)
    #[arg(long)]
    pub elevated: bool,

    /// Reinstall the remote service before running (winexe)
    #[arg(long)]
    pub reinstall: bool,

    /// Uninstall the remote service after running (winexe)
    #[arg(long)]
    pub uninstall: bool,

    /// Copy the program to the remote host before running (psexec/paexec)
    #[arg(long)]
    pub copy: bool,

    /// Overwrite an existing remote copy (implies --copy)
    #[arg(long, conflicts_with = "copy_version")]
    pub copy_force: bool,

    /// Overwrite only if the local copy is newer (implies --copy)
    #[arg(long)]
    pub copy_version: bool,

    /// Extra file to copy alongside the program (implies --copy)
    #[arg(long, value_name = "FILE", conflicts_with = "copy_list")]
    pub copy_file: Option<PathBuf>,

    /// File listing extra files to copy (implies --copy)
    #[arg(long, value_name = "FILE")]
    pub copy_list: Option<PathBuf>,

    /// Kill the backend after this many seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Backend family (winexe, psexec, paexec, psexec-py)
    #[arg(long, env = "REMEXEC_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Backend executable to run instead of searching PATH
    #[arg(long, value_name = "PATH")]
    pub program: Option<PathBuf>,

    /// Working directory for the backend process
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Command line to execute remotely
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Print a JSON result document instead of streaming output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ArgsArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Print the password instead of masking it
    #[arg(long)]
    pub show_password: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl TargetArgs {
    fn command_line(&self) -> String {
        self.command.join(" ")
    }

    fn copy_options(&self) -> Option<CopyOptions> {
        let wants_copy = self.copy
            || self.copy_force
            || self.copy_version
            || self.copy_file.is_some()
            || self.copy_list.is_some();
        if !wants_copy {
            return None;
        }

        let overwrite = if self.copy_force {
            Some(Overwrite::Force)
        } else if self.copy_version {
            Some(Overwrite::Version)
        } else {
            None
        };
        let source = match (&self.copy_file, &self.copy_list) {
            (Some(file), _) => Some(CopySource::File(file.clone())),
            (None, Some(list)) => Some(CopySource::List(list.clone())),
            (None, None) => None,
        };

        Some(CopyOptions { overwrite, source })
    }

    /// Flags on the command line switch options on; they never switch a
    /// configured option off
    fn merge_options(&self, mut options: ExecOptions) -> ExecOptions {
        options.system |= self.system;
        options.elevated |= self.elevated;
        options.reinstall |= self.reinstall;
        options.uninstall |= self.uninstall;
        if let Some(copy) = self.copy_options() {
            options.copy = Some(copy);
        }
        if let Some(secs) = self.timeout {
            options.timeout = Some(Duration::from_secs(secs));
        }
        options
    }

    fn resolve_backend(&self, config: &RemexecConfig) -> Option<Backend> {
        match (&self.backend, &self.program) {
            (Some(kind), Some(program)) => Some(Backend::explicit(*kind, program)),
            (None, Some(program)) => Some(Backend::from_program(program)),
            (Some(kind), None) => Backend::locate(*kind, &PathLocator),
            (None, None) => config.resolve_backend(Platform::current(), &PathLocator),
        }
    }

    /// Build the executor and options from config plus command-line flags
    pub fn build(&self, config: &RemexecConfig) -> Result<(RemoteExec, ExecOptions)> {
        let mut target = config.resolve_target(&self.target);
        if let Some(profile) = &target.profile {
            debug!(profile = %profile, host = %target.host, "using host profile");
        }

        if self.user.is_some() {
            target.username = self.user.clone();
            target.password = None;
            target.password_env = None;
        }
        if let Some(password) = &self.password {
            target.password = Some(password.clone());
        } else if let Some(var) = &self.password_env {
            let password = std::env::var(var)
                .with_context(|| format!("environment variable {} is not set", var))?;
            target.password = Some(password);
        }

        let credentials = target.credentials();
        let options = self.merge_options(target.options.clone());

        let mut remote = RemoteExec::new(target.host, credentials)
            .with_backend(self.resolve_backend(config))
            .with_options(options.clone());
        if let Some(dir) = self.working_dir.as_ref().or(config.backend.working_dir.as_ref()) {
            remote = remote.with_working_dir(dir);
        }

        Ok((remote, options))
    }
}

// === Command Implementations ===

/// JSON document printed by `run --json`
#[derive(Serialize, Debug)]
struct RunReport<'a> {
    host: &'a str,
    backend: Option<&'a Backend>,
    success: bool,
    timed_out: bool,
    exit_code: Option<i32>,
    stdout: &'a str,
    stderr: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the remote command; returns the process exit code to report
pub async fn run_run(args: RunArgs, config: &RemexecConfig) -> Result<i32> {
    let (remote, options) = args.target.build(config)?;
    let command = args.target.command_line();

    if args.json {
        return run_collected(&remote, &command, &options).await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ExecEvent::Stdout(line) => println!("{}", line),
                ExecEvent::Stderr(line) => eprintln!("{}", line),
            }
        }
    });

    let result = tokio::select! {
        result = remote.run(&command, Some(&options), Some(tx)) => result,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the run future kills the backend
            eprintln!("Interrupted");
            return Ok(EXIT_INTERRUPTED);
        }
    };

    printer.await.context("output printer task failed")?;

    // Same exit code mapping as `run --json`
    match result {
        Ok(_) => Ok(0),
        Err(err) => {
            eprintln!("Error: failed to run command on {}: {}", remote.host(), err);
            Ok(err.exit_code())
        }
    }
}

async fn run_collected(remote: &RemoteExec, command: &str, options: &ExecOptions) -> Result<i32> {
    let pb = ui::spinner(format!("Running on {}...", remote.host()));
    let result = remote.run(command, Some(options), None).await;

    let empty = ExecOutput::default();
    let (output, code, error) = match &result {
        Ok(output) => (output, 0, None),
        Err(err) => (err.output().unwrap_or(&empty), err.exit_code(), Some(err.to_string())),
    };

    match &error {
        None => ui::finish_clear(pb),
        Some(message) => ui::finish_error(pb, message.clone()),
    }

    let report = RunReport {
        host: remote.host(),
        backend: remote.backend(),
        success: result.is_ok(),
        timed_out: matches!(result, Err(ExecError::TimedOut { .. })),
        exit_code: output.exit_code,
        stdout: &output.stdout,
        stderr: &output.stderr,
        error,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(code)
}

/// Print the backend command line without running it
pub fn run_args(args: ArgsArgs, config: &RemexecConfig) -> Result<()> {
    let (remote, options) = args.target.build(config)?;
    let command = args.target.command_line();
    let backend = remote.backend().ok_or(ExecError::NoBackend)?;

    let argv = if args.show_password {
        remote.args(&command, Some(&options))?
    } else {
        remote.redacted_args(&command, Some(&options))?
    };

    if args.json {
        let doc = serde_json::json!({
            "backend": backend.kind,
            "program": backend.program,
            "args": argv,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let program = backend.program.display().to_string();
    let line = shlex::try_join(std::iter::once(program.as_str()).chain(argv.iter().map(String::as_str)))
        .map_err(|e| anyhow!("cannot quote argument list: {}", e))?;
    println!("{}", line);

    Ok(())
}

// === Tests ===
