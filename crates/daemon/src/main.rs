// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Procman Daemon (procmand)
//!
//! Background process that supervises the worker fleet on this host.
//!
//! Architecture:
//! - IPC Listener: spawned task handling child connections, emits events
//! - Engine Loop: main task processing events sequentially

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use fs2::FileExt;
use procman_core::{Event, SystemClock};
use procman_daemon::{Config, Procman, ProcmanError, TokioProcessAdapter};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let retcode = run().await.unwrap_or_else(|err| {
        eprintln!("error: {err}");
        1
    });
    std::process::exit(retcode);
}

async fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let mut config = match parse_args(Config::load()?) {
        ParsedArgs::Run(config) => config,
        ParsedArgs::Exit(code) => return Ok(code),
    };
    if config.workers_dirs.is_empty() {
        config.workers_dirs.push(config.state_dir.join("workers"));
    }

    std::fs::create_dir_all(&config.state_dir)?;

    // Rotate the log if it has grown too large, then mark this startup
    // (before tracing setup, so operators can find the attempt in the file)
    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let _log_guard = setup_logging(&config)?;

    info!("starting procman supervisor");

    // Exclusive pid lock: a second instance must not manage the same fleet
    let lock_file = match acquire_lock(&config) {
        Ok(file) => file,
        Err(err) => {
            let pid = std::fs::read_to_string(&config.lock_path).unwrap_or_default();
            eprintln!("procmand is already running");
            if !pid.trim().is_empty() {
                eprintln!("  pid: {}", pid.trim());
            }
            error!(error = %err, "lock acquisition failed");
            return Ok(1);
        }
    };

    let procman = match Procman::startup(config.clone(), TokioProcessAdapter::new(), SystemClock) {
        Ok(procman) => procman,
        Err(err) => {
            write_startup_error(&config, &err);
            error!(error = %err, "startup failed");
            return Ok(1);
        }
    };

    // SIGTERM/SIGINT drain the fleet and exit 0
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown_tx = procman.events();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        let _ = shutdown_tx.send(Event::Shutdown { retcode: 0 });
    });

    info!(socket = %config.socket_path.display(), "supervisor ready");
    println!("READY");

    let retcode = procman.run().await;

    cleanup(&config);
    drop(lock_file);
    info!(retcode, "supervisor exited");
    Ok(retcode)
}

enum ParsedArgs {
    Run(Config),
    Exit(i32),
}

fn parse_args(mut config: Config) -> ParsedArgs {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("procmand {}", env!("CARGO_PKG_VERSION"));
                return ParsedArgs::Exit(0);
            }
            "--help" | "-h" => {
                print_help();
                return ParsedArgs::Exit(0);
            }
            "--workers-dir" => match args.next() {
                Some(dir) => config.workers_dirs.push(PathBuf::from(dir)),
                None => return missing_value(&arg),
            },
            "--meta-defaults" => match args.next() {
                Some(path) => config.meta_defaults_path = Some(PathBuf::from(path)),
                None => return missing_value(&arg),
            },
            "--broker" => match args.next() {
                Some(path) => config.broker_path = Some(PathBuf::from(path)),
                None => return missing_value(&arg),
            },
            "--environment" => match args.next() {
                Some(env) => config.environment = env,
                None => return missing_value(&arg),
            },
            "--core-dump-cmd" => match args.next() {
                Some(cmd) => config.core_dump_cmd = Some(cmd),
                None => return missing_value(&arg),
            },
            "--only" => match args.next() {
                Some(list) => config.only_workers = split_list(&list),
                None => return missing_value(&arg),
            },
            "--skip" => match args.next() {
                Some(list) => config.skip_workers = split_list(&list),
                None => return missing_value(&arg),
            },
            "--default-workers" => match args.next() {
                Some(list) => config.default_workers = split_list(&list),
                None => return missing_value(&arg),
            },
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: procmand [OPTIONS] (see --help)");
                return ParsedArgs::Exit(1);
            }
        }
    }
    ParsedArgs::Run(config)
}

fn missing_value(flag: &str) -> ParsedArgs {
    eprintln!("error: {flag} requires a value");
    ParsedArgs::Exit(1)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_help() {
    println!("procmand {}", env!("CARGO_PKG_VERSION"));
    println!("Procman Daemon - supervises the worker fleet on this host");
    println!();
    println!("USAGE:");
    println!("    procmand [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --workers-dir <DIR>       Directory scanned for workers (repeatable)");
    println!("    --meta-defaults <FILE>    Global manifest defaults document");
    println!("    --broker <FILE>           Broker sibling executable");
    println!("    --environment <NAME>      Deployment environment (production forbids debug)");
    println!("    --core-dump-cmd <CMD>     Core collector run before restart stops");
    println!("    --only <a,b,...>          Start only these workers");
    println!("    --skip <a,b,...>          Do not start these workers");
    println!("    --default-workers <a,b>   Workers enabled unless configured otherwise");
    println!("    -h, --help                Print help information");
    println!("    -V, --version             Print version information");
}

fn acquire_lock(config: &Config) -> std::io::Result<File> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&config.lock_path)?;
    file.try_lock_exclusive()?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

fn cleanup(config: &Config) {
    for path in [&config.socket_path, &config.lock_path] {
        if path.exists() {
            if let Err(err) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %err, "cleanup failed");
            }
        }
    }
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Shift `procman.log` → `.1` → `.2` → `.3`, dropping the oldest.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }
    let base = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let _ = std::fs::rename(format!("{base}.{i}"), format!("{base}.{}", i + 1));
    }
    let _ = std::fs::rename(log_path, format!("{base}.1"));
}

/// Startup marker written to the log before tracing is initialized.
const STARTUP_MARKER_PREFIX: &str = "--- procmand: starting (pid: ";

fn write_startup_marker(config: &Config) -> std::io::Result<()> {
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

/// Synchronous error line for the case where the non-blocking tracing
/// writer would not flush before exit.
fn write_startup_error(config: &Config, error: &ProcmanError) {
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start supervisor: {error}");
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "log path has no parent"))?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "log path has no file name"))?;
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
