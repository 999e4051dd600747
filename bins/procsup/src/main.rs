use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use procsup_supervisor::config::parse_duration;
use procsup_supervisor::{
    LaunchSpec, ProcessHandle, SignalAction, StreamType, Supervisor, SupervisorConfig,
    SupervisorError,
};

/// Exit code used when a wait timed out, as in coreutils `timeout`.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// procsup - run child processes under supervision
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", env = "PROCSUP_CONFIG")]
    config: Option<PathBuf>,

    /// Wait timeout for every process, e.g. "500ms", "5s", "2m" (overrides config)
    #[arg(short, long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Command to run, after `--`
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SupervisorConfig::load_from_file(path)?,
        None => SupervisorConfig::default(),
    };

    initialize_logging(args.debug, &config.supervisor.log_level)?;

    let code = run(args, config).await?;
    std::process::exit(code);
}

fn initialize_logging(debug: bool, configured_level: &str) -> Result<()> {
    let level = if debug { "debug" } else { configured_level };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

async fn run(args: Args, config: SupervisorConfig) -> Result<i32> {
    let mut launches: Vec<(LaunchSpec, Option<Duration>)> = config
        .processes
        .iter()
        .map(|p| (p.to_launch_spec(), args.timeout.or(p.wait_timeout)))
        .collect();

    if let Some((program, rest)) = args.command.split_first() {
        launches.push((LaunchSpec::new(program.as_str()).args(rest.iter().cloned()), args.timeout));
    }

    if launches.is_empty() {
        bail!("Nothing to run: pass a command after `--` or configure processes");
    }

    let supervisor = Supervisor::new(config.supervisor.to_options());

    let mut relay = supervisor.signal_relay();
    relay
        .listen_os()
        .context("Failed to install signal handlers")?;
    let relay = relay.spawn(Arc::new(supervisor.clone()));

    info!("Starting {} process(es)", launches.len());

    let mut started = Vec::with_capacity(launches.len());
    for (spec, timeout) in launches {
        match supervisor.start(spec) {
            Ok(handle) => started.push((handle, timeout)),
            Err(e) if supervisor.is_shutting_down() => {
                warn!("Shutdown began while starting processes: {}", e);
                break;
            }
            Err(e) => {
                error!("Failed to start process: {}", e);
                supervisor
                    .shutdown_all(SignalAction::ImmediateStop { exit_code: 1 })
                    .await;
                relay.abort();
                return Err(e.into());
            }
        }
    }

    let echoes: Vec<_> = started
        .iter()
        .flat_map(|(handle, _)| {
            [
                spawn_echo(handle, StreamType::Stdout),
                spawn_echo(handle, StreamType::Stderr),
            ]
        })
        .collect();

    let results = join_all(
        started
            .iter()
            .map(|(handle, timeout)| supervisor.wait(handle, *timeout)),
    )
    .await;
    join_all(echoes).await;

    let mut code = 0;
    for ((handle, _), result) in started.iter().zip(results) {
        match result {
            Ok(exit) => {
                info!(
                    pid = exit.pid,
                    label = %handle.label(),
                    state = %exit.state,
                    code = exit.code,
                    duration = ?exit.duration,
                    "Process finished"
                );
                if code == 0 {
                    code = exit.code;
                }
            }
            Err(SupervisorError::TimeoutExceeded { pid, timeout }) => {
                warn!(pid, label = %handle.label(), "Timed out after {:?}", timeout);
                code = TIMEOUT_EXIT_CODE;
            }
            Err(e) => {
                error!(label = %handle.label(), "Wait failed: {}", e);
                if code == 0 {
                    code = 1;
                }
            }
        }
    }

    if let Some(shutdown_code) = supervisor.shutdown_exit_code() {
        supervisor.wait_for_shutdown().await;
        code = shutdown_code;
    }

    relay.abort();
    Ok(code)
}

/// Echo one piped stream as `[label/stream] line`.
fn spawn_echo(handle: &ProcessHandle, stream: StreamType) -> tokio::task::JoinHandle<()> {
    let label = handle.label().to_string();
    let mut lines = handle.stdio().read_lines(stream);

    tokio::spawn(async move {
        while let Some(line) = lines.next_line().await {
            match stream {
                StreamType::Stderr => eprintln!("[{}/{}] {}", label, stream, line),
                _ => println!("[{}/{}] {}", label, stream, line),
            }
        }
    })
}
