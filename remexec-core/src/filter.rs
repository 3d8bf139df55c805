//! Banner noise filtering for backend stdout
//!
//! impacket prints its status lines on stdout and Sysinternals psexec
//! prints a banner even with `-nobanner` on some versions. Those lines are
//! dropped before output reaches the caller.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::BackendKind;

static IMPACKET_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[*!]\]").expect("valid regex"));
static IMPACKET_BANNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Impacket ").expect("valid regex"));

static PSEXEC_BANNER: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"PsExec v\d\.\d - Execute processes remotely").expect("valid regex"),
        Regex::new(r"Copyright \(C\) 2001-20\d\d Mark Russinovich").expect("valid regex"),
        Regex::new(r"Sysinternals - www\.sysinternals\.com").expect("valid regex"),
    ]
});

/// Per-backend stdout filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFilter {
    /// Keep every line
    #[default]
    None,
    Impacket,
    PsExec,
}

impl OutputFilter {
    pub fn for_backend(kind: BackendKind) -> Self {
        match kind {
            BackendKind::PsExecPy => OutputFilter::Impacket,
            BackendKind::PsExec => OutputFilter::PsExec,
            BackendKind::PaExec | BackendKind::WinExe => OutputFilter::None,
        }
    }

    /// Whether a stdout line is backend chatter rather than command output
    pub fn is_noise(self, line: &str) -> bool {
        match self {
            OutputFilter::None => false,
            OutputFilter::Impacket => {
                IMPACKET_STATUS.is_match(line) || IMPACKET_BANNER.is_match(line)
            }
            OutputFilter::PsExec => PSEXEC_BANNER.iter().any(|re| re.is_match(line)),
        }
    }
}
