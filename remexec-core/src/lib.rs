//! Remote command execution on Windows hosts through external backends
//! (winexe, psexec, paexec, impacket's psexec.py).

pub mod args;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod filter;
pub mod options;
pub mod remote;
pub mod runner;

pub use args::{build_args, split_command};
pub use backend::{detect, ArgStyle, Backend, BackendKind, BackendLocator, PathLocator, Platform};
pub use config::{RemexecConfig, Target};
pub use credentials::{Credentials, Username};
pub use error::{ConfigError, ExecError, Result};
pub use filter::OutputFilter;
pub use options::{CopyOptions, CopySource, ExecOptions, Overwrite};
pub use remote::RemoteExec;
pub use runner::{
    EventSender, ExecEvent, ExecOutput, Invocation, Invoker, MockInvoker, MockResponse,
    ProcessInvoker,
};
