//! Backend selection
//!
//! Picks which external tool carries out the remote execution. On Windows
//! hosts that is PAExec or Sysinternals PsExec; everywhere else impacket's
//! `psexec.py` or `winexe`. Bundled copies in the bundle directory are used
//! as a fallback when nothing suitable is on `PATH`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bundled PAExec binary name (Windows fallback)
pub const BUNDLED_PAEXEC: &str = "paexec.exe";

/// Bundled winexe binary name (Linux x86-64 fallback)
pub const BUNDLED_WINEXE: &str = "winexe_x64";

/// The external tool family used to reach the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Samba `winexe`
    #[serde(rename = "winexe")]
    WinExe,
    /// Sysinternals `psexec`
    #[serde(rename = "psexec")]
    PsExec,
    /// `paexec`, the open-source psexec clone
    #[serde(rename = "paexec")]
    PaExec,
    /// impacket `psexec.py`
    #[serde(rename = "psexec-py", alias = "psexec.py")]
    PsExecPy,
}

/// How a backend expects its command line to be laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStyle {
    WinExe,
    PsExec,
    Impacket,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::WinExe,
        BackendKind::PsExec,
        BackendKind::PaExec,
        BackendKind::PsExecPy,
    ];

    /// Executable name looked up on PATH
    pub fn executable_name(self) -> &'static str {
        match self {
            BackendKind::WinExe => "winexe",
            BackendKind::PsExec => "psexec",
            BackendKind::PaExec => "paexec",
            BackendKind::PsExecPy => "psexec.py",
        }
    }

    pub fn arg_style(self) -> ArgStyle {
        match self {
            BackendKind::WinExe => ArgStyle::WinExe,
            BackendKind::PsExec | BackendKind::PaExec => ArgStyle::PsExec,
            BackendKind::PsExecPy => ArgStyle::Impacket,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            BackendKind::WinExe => "winexe",
            BackendKind::PsExec => "psexec",
            BackendKind::PaExec => "paexec",
            BackendKind::PsExecPy => "psexec-py",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "winexe" => Ok(BackendKind::WinExe),
            "psexec" => Ok(BackendKind::PsExec),
            "paexec" => Ok(BackendKind::PaExec),
            "psexec-py" | "psexec.py" | "impacket" => Ok(BackendKind::PsExecPy),
            other => Err(format!(
                "unknown backend '{}' (expected winexe, psexec, paexec or psexec-py)",
                other
            )),
        }
    }
}

/// A resolved backend: tool family plus the executable to spawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backend {
    pub kind: BackendKind,
    pub program: PathBuf,
}

impl Backend {
    /// Use a specific executable with a known kind
    pub fn explicit(kind: BackendKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    /// Use a specific executable, inferring its kind from the file name
    pub fn from_program(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let kind = infer_kind(&program);
        Self { kind, program }
    }

    /// Locate the default executable for `kind` on PATH
    pub fn locate(kind: BackendKind, locator: &dyn BackendLocator) -> Option<Self> {
        locator
            .find(kind.executable_name())
            .map(|program| Self::explicit(kind, program))
    }
}

fn infer_kind(program: &Path) -> BackendKind {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if name.ends_with(".py") {
        BackendKind::PsExecPy
    } else if name.starts_with("paexec") {
        BackendKind::PaExec
    } else if name.starts_with("psexec") {
        BackendKind::PsExec
    } else {
        BackendKind::WinExe
    }
}

/// Facts about the local machine that drive backend detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub windows: bool,
    pub linux_x64: bool,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            windows: cfg!(windows),
            linux_x64: cfg!(all(target_os = "linux", target_arch = "x86_64")),
        }
    }
}

/// Finds executables by name (PATH lookup in production)
pub trait BackendLocator {
    fn find(&self, name: &str) -> Option<PathBuf>;

    /// Whether a file exists (used for bundled fallbacks)
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// PATH lookup through the `which` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct PathLocator;

impl BackendLocator for PathLocator {
    fn find(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Fixed name → path table, for tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct StaticLocator {
    programs: HashMap<String, PathBuf>,
    files: Vec<PathBuf>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.programs.insert(name.to_string(), path.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }
}

impl BackendLocator for StaticLocator {
    fn find(&self, name: &str) -> Option<PathBuf> {
        self.programs.get(name).cloned()
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path)
    }
}

/// Default directory holding bundled backend binaries (~/.remexec/bin)
pub fn default_bundle_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".remexec")
        .join("bin")
}

/// Select a backend for `platform`.
///
/// Windows prefers paexec (PATH, then bundled), then psexec. Other
/// platforms prefer psexec.py, then winexe, then the bundled winexe on
/// Linux x86-64. The bundled winexe is returned without checking that it
/// exists; spawning reports the failure.
pub fn detect(
    platform: Platform,
    locator: &dyn BackendLocator,
    bundle_dir: &Path,
) -> Option<Backend> {
    if platform.windows {
        if let Some(backend) = Backend::locate(BackendKind::PaExec, locator) {
            return Some(backend);
        }
        let bundled = bundle_dir.join(BUNDLED_PAEXEC);
        if locator.exists(&bundled) {
            return Some(Backend::explicit(BackendKind::PaExec, bundled));
        }
        return Backend::locate(BackendKind::PsExec, locator);
    }

    if let Some(backend) = Backend::locate(BackendKind::PsExecPy, locator) {
        return Some(backend);
    }
    if let Some(backend) = Backend::locate(BackendKind::WinExe, locator) {
        return Some(backend);
    }
    if platform.linux_x64 {
        return Some(Backend::explicit(
            BackendKind::WinExe,
            bundle_dir.join(BUNDLED_WINEXE),
        ));
    }

    None
}
