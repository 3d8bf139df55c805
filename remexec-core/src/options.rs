//! Per-run execution options

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How psexec treats a program that already exists on the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overwrite {
    /// `-f`: always overwrite
    Force,
    /// `-v`: overwrite only with a newer version
    Version,
}

/// What psexec copies to the remote host besides the program itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopySource {
    /// `-csrc <file>`
    File(PathBuf),
    /// `-clist <file>`
    List(PathBuf),
}

/// psexec `-c` program copy settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyOptions {
    pub overwrite: Option<Overwrite>,
    pub source: Option<CopySource>,
}

/// Options that shape a single remote execution.
///
/// Backends ignore the flags they do not understand: `reinstall` and
/// `uninstall` only apply to winexe, `elevated` and `copy` only to
/// psexec/paexec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    pub system: bool,
    pub elevated: bool,
    pub reinstall: bool,
    pub uninstall: bool,
    pub copy: Option<CopyOptions>,
    #[serde(with = "duration_millis", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Watchdog duration, treating zero as "no timeout"
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => {
                let millis = u64::try_from(d.as_millis()).map_err(|_| {
                    <S::Error as ser::Error>::custom(format!("timeout {:?} does not fit in u64 milliseconds", d))
                })?;
                serializer.serialize_u64(millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
