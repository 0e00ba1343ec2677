use std::process;

/// Process exit status for each command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    /// Reserved for comparison commands
    #[allow(dead_code)]
    Differences = 1,
    /// The command ran to the end but found problems
    ProblemsNoted = 2,
    /// A problem stopped the command
    ProblemsStopped = 3,
    CommandLine = 4,
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code as u8)
    }
}
