//! Remote command execution facade
//!
//! [`RemoteExec`] ties a target host and credentials to a backend and an
//! [`Invoker`], and turns a command line into a supervised backend run.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use crate::args::build_args;
use crate::backend::{self, Backend, PathLocator, Platform};
use crate::credentials::Credentials;
use crate::error::{ExecError, Result};
use crate::filter::OutputFilter;
use crate::options::ExecOptions;
use crate::runner::{EventSender, ExecOutput, Invocation, Invoker, ProcessInvoker};

/// Runs commands on one remote Windows host
#[derive(Clone)]
pub struct RemoteExec {
    host: String,
    credentials: Credentials,
    options: ExecOptions,
    backend: Option<Backend>,
    working_dir: Option<PathBuf>,
    invoker: Arc<dyn Invoker>,
}

impl std::fmt::Debug for RemoteExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExec")
            .field("host", &self.host)
            .field("credentials", &self.credentials)
            .field("options", &self.options)
            .field("backend", &self.backend)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl RemoteExec {
    /// Target `host`, detecting a backend for the current platform
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        let backend = backend::detect(
            Platform::current(),
            &PathLocator,
            &backend::default_bundle_dir(),
        );

        Self {
            host: host.into(),
            credentials,
            options: ExecOptions::default(),
            backend,
            working_dir: None,
            invoker: Arc::new(ProcessInvoker),
        }
    }

    /// Force a backend instead of the detected one (`None` clears it)
    pub fn with_backend(mut self, backend: Option<Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Default options for runs that pass none of their own
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn Invoker>) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn validate(&self) -> Result<&Backend> {
        let backend = self.backend.as_ref().ok_or(ExecError::NoBackend)?;
        if self.host.trim().is_empty() {
            return Err(ExecError::invalid_invocation("host must not be empty"));
        }
        Ok(backend)
    }

    /// Argument vector the backend would receive for `command`
    pub fn args(&self, command: &str, options: Option<&ExecOptions>) -> Result<Vec<String>> {
        let backend = self.validate()?;
        let options = options.unwrap_or(&self.options);
        Ok(build_args(
            backend.kind,
            &self.host,
            &self.credentials,
            options,
            command,
        ))
    }

    /// Same as [`RemoteExec::args`] with the password masked
    pub fn redacted_args(&self, command: &str, options: Option<&ExecOptions>) -> Result<Vec<String>> {
        let backend = self.validate()?;
        let options = options.unwrap_or(&self.options);
        Ok(build_args(
            backend.kind,
            &self.host,
            &self.credentials.redacted(),
            options,
            command,
        ))
    }

    /// Full process description for `command`
    pub fn invocation(&self, command: &str, options: Option<&ExecOptions>) -> Result<Invocation> {
        let backend = self.validate()?;
        let options = options.unwrap_or(&self.options);

        Ok(Invocation {
            program: backend.program.clone(),
            args: build_args(backend.kind, &self.host, &self.credentials, options, command),
            working_dir: self.working_dir.clone(),
            timeout: options.effective_timeout(),
        })
    }

    /// Run `command` on the remote host.
    ///
    /// Lines are sent to `events` as they arrive; the full output is
    /// returned once the backend exits. A non-zero exit or a watchdog kill
    /// is an error that still carries the collected output.
    pub async fn run(
        &self,
        command: &str,
        options: Option<&ExecOptions>,
        events: Option<EventSender>,
    ) -> Result<ExecOutput> {
        let invocation = self.invocation(command, options)?;
        let backend = self.validate()?;
        let filter = OutputFilter::for_backend(backend.kind);
        let shown_args = self.redacted_args(command, options)?;

        let span = info_span!(
            "remote_exec",
            host = %self.host,
            backend = %backend.kind,
        );

        async {
            info!(
                program = %invocation.program.display(),
                args = ?shown_args,
                "running remote command"
            );
            let result = self.invoker.invoke(&invocation, filter, events).await;
            match &result {
                Ok(output) => info!(code = ?output.exit_code, "remote command finished"),
                Err(err) => info!(error = %err, "remote command failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::runner::{ExecEvent, MockInvoker, MockResponse};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn remote(kind: BackendKind, mock: Arc<MockInvoker>) -> RemoteExec {
        RemoteExec::new("10.0.0.5", Credentials::new(Some("admin"), Some("pw")))
            .with_backend(Some(Backend::explicit(kind, "/opt/backend")))
            .with_invoker(mock)
    }

    #[tokio::test]
    async fn test_run_builds_invocation_from_backend() {
        let mock = Arc::new(MockInvoker::new());
        mock.add_response(MockResponse::success(&["ok"]));

        let exec = remote(BackendKind::WinExe, mock.clone())
            .with_working_dir("/srv")
            .with_options(ExecOptions {
                system: true,
                timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            });

        let output = exec.run("hostname", None, None).await.unwrap();
        assert_eq!(output.stdout, "ok\n");

        let seen = mock.invocations();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].program, PathBuf::from("/opt/backend"));
        assert_eq!(
            seen[0].args,
            vec!["--user=admin%pw", "--system", "//10.0.0.5", "hostname"]
        );
        assert_eq!(seen[0].working_dir, Some(PathBuf::from("/srv")));
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_per_call_options_replace_defaults() {
        let mock = Arc::new(MockInvoker::new());
        let exec = remote(BackendKind::PsExec, mock.clone()).with_options(ExecOptions {
            system: true,
            ..Default::default()
        });

        let options = ExecOptions {
            elevated: true,
            ..Default::default()
        };
        exec.run("whoami", Some(&options), None).await.unwrap();

        let args = &mock.invocations()[0].args;
        assert!(args.contains(&"-h".to_string()));
        assert!(!args.contains(&"-s".to_string()));
        assert_eq!(mock.invocations()[0].timeout, None);
    }

    #[tokio::test]
    async fn test_run_filters_for_backend() {
        let mock = Arc::new(MockInvoker::new());
        mock.add_response(MockResponse::success(&[
            "Impacket v0.12.0 - Copyright Fortra, LLC",
            "[*] Found writable share ADMIN$",
            "Microsoft Windows [Version 10.0.17763]",
        ]));

        let exec = remote(BackendKind::PsExecPy, mock);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = exec.run("ver", None, Some(tx)).await.unwrap();

        assert_eq!(output.stdout, "Microsoft Windows [Version 10.0.17763]\n");
        assert_eq!(
            rx.recv().await,
            Some(ExecEvent::Stdout(
                "Microsoft Windows [Version 10.0.17763]".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_missing_backend_is_error() {
        let exec = RemoteExec::new("host", Credentials::anonymous()).with_backend(None);

        let err = exec.run("dir", None, None).await.unwrap_err();
        assert!(matches!(err, ExecError::NoBackend));
        assert!(exec.args("dir", None).is_err());
    }

    #[tokio::test]
    async fn test_empty_host_is_rejected() {
        let mock = Arc::new(MockInvoker::new());
        let exec = RemoteExec::new("  ", Credentials::anonymous())
            .with_backend(Some(Backend::explicit(BackendKind::WinExe, "winexe")))
            .with_invoker(mock.clone());

        let err = exec.run("dir", None, None).await.unwrap_err();
        assert!(matches!(err, ExecError::InvalidInvocation { .. }));
        assert!(mock.invocations().is_empty());
    }

    #[test]
    fn test_redacted_args_and_debug_hide_password() {
        let exec = remote(BackendKind::PsExec, Arc::new(MockInvoker::new()));

        let redacted = exec.redacted_args("dir", None).unwrap();
        assert!(redacted.iter().all(|a| a != "pw"));
        assert!(redacted.contains(&"****".to_string()));

        assert!(!format!("{:?}", exec).contains("\"pw\""));
    }
}
