//! Program templates that wrap documentation snippets.
//!
//! A run connects a client ([`bootstrap`]), executes one [`Snippet`] inside
//! one [`Template`], and reports an [`ExitStatus`]. Output always flows
//! through an explicit [`OutputSink`].

pub mod bootstrap;
pub mod capture;
pub mod snippet;
pub mod template;
pub mod watchdog;

pub use capture::{CaptureBuffer, OutputSink, SharedBuffer};
pub use snippet::{ServerNow, Snippet};
pub use template::{Program, Template};
pub use watchdog::{Elapsed, Watchdog};

/// Process outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Success = 0,
    Failure = 1,
}

impl ExitStatus {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}
