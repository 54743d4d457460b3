//! Exit code logic for the anidl process.
//!
//! Single responsibility: map the run tally to the process exit outcome.

use std::process::ExitCode;

use anidl_core::RunTally;

/// Process exit outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every episode succeeded or was skipped, or list-only mode.
    Success,
    /// At least one episode failed, or a configuration/catalog error.
    Failure,
    /// Interrupted by Ctrl-C.
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Interrupted => 130,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Determines the process exit outcome from the run tally.
pub(crate) fn determine_exit_outcome(tally: &RunTally) -> ProcessExit {
    if tally.all_succeeded() {
        ProcessExit::Success
    } else {
        ProcessExit::Failure
    }
}
