//! Backend process supervision
//!
//! Provides an [`Invoker`] trait for running a backend executable, with:
//! - a real implementation on `tokio::process`
//! - a mock implementation for tests
//! - line-buffered stdout/stderr with banner filtering
//! - a kill-on-timeout watchdog

use std::collections::VecDeque;
use std::future::pending;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::{ExecError, Result};
use crate::filter::OutputFilter;

/// How long to keep draining pipes after the watchdog kill
pub const KILL_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Everything needed to start a backend process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// A single line produced by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(String),
    Stderr(String),
}

/// Listener for output lines as they arrive
pub type EventSender = mpsc::UnboundedSender<ExecEvent>;

/// Accumulated output of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Trait for backend execution (testable)
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        invocation: &Invocation,
        filter: OutputFilter,
        events: Option<EventSender>,
    ) -> Result<ExecOutput>;
}

/// Collects lines into an [`ExecOutput`] and forwards them to the listener
struct LineSink {
    filter: OutputFilter,
    events: Option<EventSender>,
    output: ExecOutput,
}

impl LineSink {
    fn new(filter: OutputFilter, events: Option<EventSender>) -> Self {
        Self {
            filter,
            events,
            output: ExecOutput::default(),
        }
    }

    fn stdout(&mut self, line: String) {
        if self.filter.is_noise(&line) {
            return;
        }
        self.output.stdout.push_str(&line);
        self.output.stdout.push('\n');
        self.emit(ExecEvent::Stdout(line));
    }

    fn stderr(&mut self, line: String) {
        self.output.stderr.push_str(&line);
        self.output.stderr.push('\n');
        self.emit(ExecEvent::Stderr(line));
    }

    fn emit(&mut self, event: ExecEvent) {
        if let Some(tx) = &self.events {
            // Listener went away; keep collecting
            if tx.send(event).is_err() {
                self.events = None;
            }
        }
    }

    fn finish(mut self, code: Option<i32>, timed_out: Option<Duration>) -> Result<ExecOutput> {
        self.output.exit_code = code;
        let output = self.output;

        if let Some(timeout) = timed_out {
            return Err(ExecError::TimedOut { timeout, output });
        }
        match code {
            Some(0) => Ok(output),
            code => Err(ExecError::ExitStatus { code, output }),
        }
    }
}

fn decode_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Real invoker using `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessInvoker;

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn invoke(
        &self,
        invocation: &Invocation,
        filter: OutputFilter,
        events: Option<EventSender>,
    ) -> Result<ExecOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ExecError::spawn(&invocation.program, e))?;
        debug!(program = %invocation.program.display(), pid = ?child.id(), "backend spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stderr not captured"))?;

        let mut out_lines = BufReader::new(stdout).split(b'\n');
        let mut err_lines = BufReader::new(stderr).split(b'\n');
        let mut sink = LineSink::new(filter, events);

        let timeout = invocation.timeout.filter(|t| !t.is_zero());
        let deadline = timeout.map(|t| Instant::now() + t);
        let watchdog = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(watchdog);

        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut status = None;
        let mut killed = false;
        let mut drain_deadline: Option<Instant> = None;

        while stdout_open || stderr_open || status.is_none() {
            let drain = async move {
                match drain_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                segment = out_lines.next_segment(), if stdout_open => match segment? {
                    Some(bytes) => sink.stdout(decode_line(bytes)),
                    None => stdout_open = false,
                },
                segment = err_lines.next_segment(), if stderr_open => match segment? {
                    Some(bytes) => sink.stderr(decode_line(bytes)),
                    None => stderr_open = false,
                },
                exit = child.wait(), if status.is_none() => {
                    status = Some(exit?);
                    if killed {
                        drain_deadline = Some(Instant::now() + KILL_DRAIN_GRACE);
                    }
                },
                _ = &mut watchdog, if !killed && status.is_none() => {
                    killed = true;
                    warn!(
                        program = %invocation.program.display(),
                        timeout_ms = timeout.map(|t| t.as_millis() as u64),
                        "timeout elapsed, killing backend"
                    );
                    // The child may already be gone
                    let _ = child.start_kill();
                },
                _ = drain => {
                    // Grandchildren still hold the pipes open
                    debug!("giving up on pipe drain after kill");
                    break;
                },
            }
        }

        let code = status.and_then(|s| s.code());
        debug!(code = ?code, killed, "backend exited");

        sink.finish(code, if killed { timeout } else { None })
    }
}

/// Canned result for [`MockInvoker`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockResponse {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: Option<i32>,
}

impl MockResponse {
    pub fn success(stdout: &[&str]) -> Self {
        Self {
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stderr: Vec::new(),
            exit_code: Some(0),
        }
    }

    pub fn failure(code: i32, stderr: &[&str]) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
            exit_code: Some(code),
        }
    }
}

/// Mock invoker for testing
///
/// Replays queued responses through the same filtering and event path as
/// the real invoker and records every invocation it receives.
#[derive(Debug, Default)]
pub struct MockInvoker {
    responses: Mutex<VecDeque<MockResponse>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response to return on the next invocation
    pub fn add_response(&self, response: MockResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Invocations seen so far
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke(
        &self,
        invocation: &Invocation,
        filter: OutputFilter,
        events: Option<EventSender>,
    ) -> Result<ExecOutput> {
        if let Ok(mut seen) = self.invocations.lock() {
            seen.push(invocation.clone());
        }

        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front())
            .unwrap_or_else(|| MockResponse::success(&[]));

        let mut sink = LineSink::new(filter, events);
        for line in response.stdout {
            sink.stdout(line);
        }
        for line in response.stderr {
            sink.stderr(line);
        }
        sink.finish(response.exit_code, None)
    }
}
