mod config;
mod daemon;
mod outcome;
mod pidfile;
mod supervisor;

use clap::Parser;
use config::WatcherConfig;
use outcome::Outcome;
use std::path::PathBuf;
use std::time::Duration;
use supervisor::WatchPlan;

/// A simple watcher to kill a process after a timeout.
///
/// Runs COMMAND as a child process and waits for it under a wall-clock
/// deadline. SIGUSR1 restarts the deadline clock without touching the
/// child; SIGTERM makes the watcher stop supervising and exit with
/// success. The watcher's exit code reports how supervision ended.
#[derive(Parser, Debug)]
#[command(name = "procwatch", version, about)]
pub struct Cli {
    /// Command to run and watch; everything after the first token is
    /// passed to it verbatim
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,

    /// Timeout in ms before killing the process; negative means infinite
    /// (overrides config) [default: 300000]
    #[arg(short, long, value_name = "MS", allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Environment variable for the child as KEY=VALUE; repeatable.
    /// The child sees exactly the entries given here.
    #[arg(short, long, value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Write the watcher's own pid to this file before spawning
    #[arg(short, long, value_name = "FILE")]
    pid_file: Option<PathBuf>,

    /// Do not block: run the watcher itself as a background process
    #[arg(short, long)]
    fork: bool,

    /// Kill the child before exiting when termination is requested
    #[arg(long)]
    kill_on_term: bool,

    /// Config file path
    #[arg(short, long, default_value = "procwatch.toml")]
    config: PathBuf,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (poll decisions, kill attempts)
    #[arg(short, long)]
    verbose: bool,

    /// Suppress everything but errors
    #[arg(short, long)]
    quiet: bool,
}

/// Resolve CLI overrides against the config file.
fn build_plan(cli: &Cli, config: &WatcherConfig) -> WatchPlan {
    WatchPlan {
        command: cli.command.clone(),
        env: cli.env.clone(),
        timeout_ms: cli.timeout.unwrap_or(config.watch.timeout_ms),
        // A zero interval would make the poll timer panic
        poll_interval: Duration::from_millis(config.watch.poll_interval_ms.max(1)),
        kill: config.kill.clone(),
        limits: config.limits.clone(),
        kill_on_term: cli.kill_on_term || config.terminate.kill_child,
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let config = match WatcherConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("procwatch: {e}");
            std::process::exit(Outcome::InvalidArgument.exit_code());
        }
    };
    let plan = build_plan(&cli, &config);

    if cli.dry_run {
        println!("procwatch v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("Command: {:?}", plan.command);
        println!("Timeout: {} ms", plan.timeout_ms);
        println!("Poll interval: {} ms", plan.poll_interval.as_millis());
        println!(
            "Kill: {} attempts, {} ms apart",
            plan.kill.max_attempts, plan.kill.retry_delay_ms
        );
        println!("Kill child on termination: {}", plan.kill_on_term);
        println!("Dry run mode — config validated, not running.");
        return;
    }

    if cli.command.is_empty() {
        eprintln!("procwatch: no command provided");
        std::process::exit(Outcome::InvalidArgument.exit_code());
    }

    // The detach must come before the runtime exists and before the pid
    // file is written, so the file names the process that actually watches.
    if cli.fork {
        match daemon::detach() {
            Ok(daemon::Detach::Parent) => return,
            Ok(daemon::Detach::Child) => {}
            Err(e) => {
                eprintln!("procwatch: failed to start process watcher: {e}");
                std::process::exit(Outcome::SpawnFailed.exit_code());
            }
        }
    }

    if let Some(path) = &cli.pid_file {
        if let Err(e) = pidfile::write(path) {
            eprintln!("procwatch: could not open file {}: {e}", path.display());
            std::process::exit(Outcome::InvalidArgument.exit_code());
        }
    }

    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("procwatch: failed to start runtime: {e}");
            std::process::exit(Outcome::SpawnFailed.exit_code());
        }
    };

    let outcome = runtime.block_on(supervisor::watch(plan));
    tracing::info!(code = outcome.exit_code(), %outcome, "watcher finished");
    std::process::exit(outcome.exit_code());
}
