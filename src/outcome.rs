use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Terminal classification of a supervised run.
///
/// Every way a run can end maps to a distinct process exit code, so a
/// caller (or its own supervisor) can tell "the child misbehaved" apart
/// from "the watcher itself malfunctioned".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Child exited 0, was signaled without a core dump, was already gone,
    /// or the watcher was asked to stop gracefully.
    Success,
    /// Deadline expired; the child was killed, or is presumed still
    /// running after the kill budget was spent.
    Timeout,
    /// Spawning the child failed before the command image was involved.
    SpawnFailed,
    /// Could not install graceful-termination signal handling.
    TermSetupFailed,
    /// Could not install liveness-reset signal handling.
    LivenessSetupFailed,
    /// Liveness reset received with no outstanding child.
    LivenessHandlerFailed,
    /// Sending the kill signal failed.
    CannotKill,
    /// Waiting on the child failed for a reason other than "no such child".
    CannotWait,
    /// Command/argument list exceeds the configured limit.
    TooManyArgs,
    /// The command image could not be executed.
    ExecFailed,
    /// Environment list exceeds the configured limit.
    TooManyEnv,
    /// Child terminated by a signal and dumped core.
    CoreDump,
    /// Child exited with a nonzero status. The code is reported, not
    /// propagated as the watcher's own exit code.
    NonZeroExit(i32),
    /// Configuration error: empty command, zero timeout, malformed
    /// environment entry, or unwritable pid file.
    InvalidArgument,
}

impl Outcome {
    /// The watcher's own process exit code for this classification.
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Timeout => 1,
            Outcome::SpawnFailed => 2,
            Outcome::TermSetupFailed => 3,
            Outcome::LivenessSetupFailed => 5,
            Outcome::LivenessHandlerFailed => 6,
            Outcome::CannotKill => 9,
            Outcome::CannotWait => 10,
            Outcome::TooManyArgs => 11,
            Outcome::ExecFailed => 12,
            Outcome::TooManyEnv => 13,
            Outcome::CoreDump => 14,
            Outcome::NonZeroExit(_) => 15,
            Outcome::InvalidArgument => 22,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Timeout => write!(f, "child timed out"),
            Outcome::SpawnFailed => write!(f, "failed to spawn child"),
            Outcome::TermSetupFailed => {
                write!(f, "could not set up termination signal handling")
            }
            Outcome::LivenessSetupFailed => {
                write!(f, "could not set up liveness signal handling")
            }
            Outcome::LivenessHandlerFailed => {
                write!(f, "liveness reset received with no outstanding child")
            }
            Outcome::CannotKill => write!(f, "cannot kill child"),
            Outcome::CannotWait => write!(f, "cannot wait for child"),
            Outcome::TooManyArgs => write!(f, "too many arguments"),
            Outcome::ExecFailed => write!(f, "command could not be executed"),
            Outcome::TooManyEnv => write!(f, "too many environment variables"),
            Outcome::CoreDump => write!(f, "child core dumped"),
            Outcome::NonZeroExit(code) => write!(f, "child returned non-zero code {code}"),
            Outcome::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

/// Classify a reaped child's wait status against the outcome that
/// triggered the wait.
///
/// A clean exit and a plain signal death leave `origin` unchanged, so a
/// normal run stays `Success` and a timeout kill stays `Timeout`. A
/// nonzero exit code or a core dump overrides either origin.
pub fn finish(pid: i32, origin: Outcome, status: ExitStatus) -> Outcome {
    if let Some(code) = status.code() {
        tracing::info!(pid, code, "child exited");
        if code != 0 {
            return Outcome::NonZeroExit(code);
        }
        return origin;
    }
    if let Some(sig) = status.signal() {
        if status.core_dumped() {
            tracing::warn!(pid, signal = sig, "child core dumped");
            return Outcome::CoreDump;
        }
        tracing::info!(pid, signal = sig, "child was signaled");
    }
    origin
}

#[cfg(test)]
mod tests {
    use super::*;

    // Raw wait-status layouts: exit code in bits 8..16, termination
    // signal in the low 7 bits, core-dump flag at 0x80.
    fn exited(code: i32) -> ExitStatus {
        ExitStatus::from_raw((code & 0xff) << 8)
    }

    fn signaled(sig: i32) -> ExitStatus {
        ExitStatus::from_raw(sig)
    }

    fn core_dumped(sig: i32) -> ExitStatus {
        ExitStatus::from_raw(sig | 0x80)
    }

    #[test]
    fn test_clean_exit_keeps_origin() {
        assert_eq!(finish(1, Outcome::Success, exited(0)), Outcome::Success);
        assert_eq!(finish(1, Outcome::Timeout, exited(0)), Outcome::Timeout);
    }

    #[test]
    fn test_nonzero_exit_overrides_origin() {
        assert_eq!(
            finish(1, Outcome::Success, exited(42)),
            Outcome::NonZeroExit(42)
        );
        assert_eq!(
            finish(1, Outcome::Timeout, exited(1)),
            Outcome::NonZeroExit(1)
        );
    }

    #[test]
    fn test_signal_death_keeps_origin() {
        // SIGKILL without a core dump folds into whatever path we came from
        assert_eq!(finish(1, Outcome::Success, signaled(9)), Outcome::Success);
        assert_eq!(finish(1, Outcome::Timeout, signaled(9)), Outcome::Timeout);
    }

    #[test]
    fn test_core_dump_overrides_origin() {
        assert_eq!(finish(1, Outcome::Success, core_dumped(6)), Outcome::CoreDump);
        assert_eq!(finish(1, Outcome::Timeout, core_dumped(11)), Outcome::CoreDump);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let outcomes = [
            Outcome::Success,
            Outcome::Timeout,
            Outcome::SpawnFailed,
            Outcome::TermSetupFailed,
            Outcome::LivenessSetupFailed,
            Outcome::LivenessHandlerFailed,
            Outcome::CannotKill,
            Outcome::CannotWait,
            Outcome::TooManyArgs,
            Outcome::ExecFailed,
            Outcome::TooManyEnv,
            Outcome::CoreDump,
            Outcome::NonZeroExit(7),
            Outcome::InvalidArgument,
        ];
        let mut codes: Vec<i32> = outcomes.iter().map(|o| o.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), outcomes.len());
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::Timeout.exit_code(), 1);
        assert_eq!(Outcome::NonZeroExit(42).exit_code(), 15);
        assert_eq!(Outcome::CoreDump.exit_code(), 14);
        assert_eq!(Outcome::InvalidArgument.exit_code(), 22);
    }

    #[test]
    fn test_display_reports_child_code() {
        let text = Outcome::NonZeroExit(42).to_string();
        assert!(text.contains("42"));
    }
}
