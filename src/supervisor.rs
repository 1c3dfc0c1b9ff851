//! Child-process supervision: spawn a command, watch it under a
//! wall-clock deadline, and classify how the run ended.
//!
//! The reset and terminate signals are consumed as stream events by a
//! single-threaded event loop, so the loop is the only thing that ever
//! touches the supervision state.

use crate::config::{KillConfig, LimitsConfig};
use crate::outcome::{finish, Outcome};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;

/// Everything needed to run one supervised command.
///
/// The plan owns its command and environment strings, so the caller's
/// copies are free to go away independent of the child's lifetime.
#[derive(Debug, Clone)]
pub struct WatchPlan {
    /// Command and its arguments, passed to the child verbatim.
    pub command: Vec<String>,
    /// `KEY=VALUE` entries; the child's environment is exactly this set.
    pub env: Vec<String>,
    /// Milliseconds before the child is killed; negative means no timeout,
    /// zero is rejected.
    pub timeout_ms: i64,
    pub poll_interval: Duration,
    pub kill: KillConfig,
    pub limits: LimitsConfig,
    /// Kill the child before exiting when termination is requested.
    pub kill_on_term: bool,
}

/// Mutable supervision state: which child is outstanding and when the
/// timeout clock last started.
///
/// `pid` is `Some` exactly while the child is unreaped. `last_reset` only
/// moves forward, at spawn and on every liveness reset.
struct WatchState {
    pid: Option<Pid>,
    timeout: Option<Duration>,
    last_reset: Instant,
}

impl WatchState {
    fn new(pid: Pid, timeout: Option<Duration>) -> Self {
        Self {
            pid: Some(pid),
            timeout,
            last_reset: Instant::now(),
        }
    }

    /// Restart the timeout clock. A reset with no outstanding child is a
    /// protocol violation by whoever sent the signal and fatal for the
    /// watcher.
    fn note_liveness_reset(&mut self, now: Instant) -> Result<(), Outcome> {
        if self.pid.is_none() {
            return Err(Outcome::LivenessHandlerFailed);
        }
        self.last_reset = now;
        Ok(())
    }

    /// Whether the deadline has passed as of `now`. Always false for an
    /// infinite timeout.
    fn deadline_exceeded(&self, now: Instant) -> bool {
        match self.timeout {
            Some(timeout) => now.duration_since(self.last_reset) >= timeout,
            None => false,
        }
    }

    fn clear_child(&mut self) {
        self.pid = None;
    }
}

/// Map the millisecond setting to a deadline: negative means no timeout,
/// zero is rejected before anything spawns.
fn timeout_from_millis(ms: i64) -> Result<Option<Duration>, Outcome> {
    match ms {
        0 => Err(Outcome::InvalidArgument),
        ms if ms < 0 => Ok(None),
        ms => Ok(Some(Duration::from_millis(ms as u64))),
    }
}

/// Split `KEY=VALUE` entries, rejecting anything without a key and a `=`.
fn parse_env_entries(entries: &[String]) -> Result<Vec<(String, String)>, Outcome> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => {
                tracing::error!(entry = %entry, "environment entry is not KEY=VALUE");
                Err(Outcome::InvalidArgument)
            }
        })
        .collect()
}

/// Spawn the child with exactly the given environment, stdio inherited.
///
/// A spawn error that denotes a missing or non-executable image maps to
/// `ExecFailed`; anything else is a fork-level `SpawnFailed`.
fn spawn_child(argv: &[String], env: &[(String, String)]) -> Result<Child, Outcome> {
    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    match command.spawn() {
        Ok(child) => Ok(child),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                tracing::error!(command = %argv[0], error = %e, "command could not be executed");
                Err(Outcome::ExecFailed)
            }
            _ => {
                tracing::error!(error = %e, "failed to spawn child");
                Err(Outcome::SpawnFailed)
            }
        },
    }
}

/// Run one supervised command to completion and classify the result.
///
/// Liveness resets (SIGUSR1) restart the timeout clock without touching
/// the child; graceful termination (SIGTERM) stops supervising and
/// reports success. If the deadline passes first, the child is killed
/// through the bounded retry sequence.
pub async fn watch(plan: WatchPlan) -> Outcome {
    if plan.command.is_empty() {
        tracing::error!("no command provided");
        return Outcome::InvalidArgument;
    }
    let timeout = match timeout_from_millis(plan.timeout_ms) {
        Ok(timeout) => timeout,
        Err(outcome) => {
            tracing::error!("timeout must not be zero");
            return outcome;
        }
    };
    if plan.command.len() > plan.limits.max_args {
        tracing::error!(
            args = plan.command.len(),
            max = plan.limits.max_args,
            "too many arguments"
        );
        return Outcome::TooManyArgs;
    }
    if plan.env.len() > plan.limits.max_env {
        tracing::error!(
            env = plan.env.len(),
            max = plan.limits.max_env,
            "too many environment variables"
        );
        return Outcome::TooManyEnv;
    }
    let env = match parse_env_entries(&plan.env) {
        Ok(env) => env,
        Err(outcome) => return outcome,
    };

    // Signal streams are set up before the spawn so a setup failure
    // cannot leave a live child behind.
    let mut term = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "could not set signal handling for SIGTERM");
            return Outcome::TermSetupFailed;
        }
    };
    let mut reset = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "could not set signal handling for SIGUSR1");
            return Outcome::LivenessSetupFailed;
        }
    };

    let mut child = match spawn_child(&plan.command, &env) {
        Ok(child) => child,
        Err(outcome) => return outcome,
    };
    let pid = match child.id() {
        Some(raw) => Pid::from_raw(raw as i32),
        // Already reaped between spawn and here; one non-blocking wait
        // picks up whatever status is left.
        None => {
            return match child.try_wait() {
                Ok(Some(status)) => finish(0, Outcome::Success, status),
                _ => Outcome::CannotWait,
            };
        }
    };
    tracing::info!(%pid, command = %plan.command[0], "child started");

    let mut state = WatchState::new(pid, timeout);
    let mut poll = tokio::time::interval(plan.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = term.recv() => {
                tracing::info!(%pid, "termination requested, watcher exiting");
                if plan.kill_on_term {
                    let fate = kill_sequence(&mut child, &mut state, &plan.kill, Outcome::Success).await;
                    tracing::debug!(?fate, "child reaped on termination request");
                }
                return Outcome::Success;
            }
            _ = reset.recv() => {
                match state.note_liveness_reset(Instant::now()) {
                    Ok(()) => tracing::debug!(%pid, "timeout clock reset"),
                    Err(outcome) => {
                        tracing::error!("liveness reset received with no outstanding child");
                        return outcome;
                    }
                }
            }
            _ = poll.tick() => {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        state.clear_child();
                        return finish(pid.as_raw(), Outcome::Success, status);
                    }
                    Ok(None) => {
                        if state.deadline_exceeded(Instant::now()) {
                            tracing::warn!(%pid, "child timed out");
                            return kill_sequence(&mut child, &mut state, &plan.kill, Outcome::Timeout).await;
                        }
                    }
                    Err(e) if e.raw_os_error() == Some(Errno::ECHILD as i32) => {
                        // Child already gone; that counts as success.
                        tracing::info!(%pid, "no such child to wait for");
                        state.clear_child();
                        return Outcome::Success;
                    }
                    Err(e) => {
                        tracing::error!(%pid, error = %e, "cannot wait for child");
                        return Outcome::CannotWait;
                    }
                }
            }
        }
    }
}

/// Bounded forced-kill retry: poll, SIGKILL, sleep, repeat.
///
/// Runs at most `kill.max_attempts` rounds, `kill.retry_delay_ms` apart.
/// An exhausted budget is terminal but non-fatal: the child is reported
/// as presumed still running and the origin outcome stands.
async fn kill_sequence(
    child: &mut Child,
    state: &mut WatchState,
    policy: &KillConfig,
    origin: Outcome,
) -> Outcome {
    let Some(pid) = state.pid else {
        return origin;
    };
    for attempt in 0..policy.max_attempts {
        match child.try_wait() {
            Ok(Some(status)) => {
                state.clear_child();
                return finish(pid.as_raw(), origin, status);
            }
            Ok(None) => {
                if let Err(e) = kill(pid, Signal::SIGKILL) {
                    tracing::error!(%pid, error = %e, "cannot kill child");
                    return Outcome::CannotKill;
                }
                tracing::debug!(%pid, attempt, "sent SIGKILL");
                tokio::time::sleep(Duration::from_millis(policy.retry_delay_ms)).await;
            }
            Err(e) => {
                tracing::error!(%pid, error = %e, "cannot wait for child");
                return Outcome::CannotWait;
            }
        }
    }
    tracing::warn!(%pid, "child is still running, watcher could not kill it");
    origin
}
