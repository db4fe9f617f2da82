// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route decision engine daemon. Events are read from stdin and outputs
//! written to stdout, one JSON document per line.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rde::config::RdeConfig;
use rde::ipc::{RdeEvent, RdeOutput};
use rde::{Rde, SESSION_CTL_QUEUE_MAX};
use rde_common::log::{init_file_logger, init_term_logger};
use slog::{error, info, warn, Logger};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the decision engine.
    Run(Run),
    /// Load and validate a configuration file, then exit.
    Check {
        /// Configuration file
        #[arg(env = "RDED_CONFIG")]
        config: PathBuf,
    },
    /// Print the JSON schema of the event stream.
    Schema,
}

#[derive(Args, Debug)]
struct Run {
    /// Configuration file
    #[arg(env = "RDED_CONFIG")]
    config: PathBuf,

    /// Write bunyan formatted logs to this file instead of the terminal
    #[arg(short, long)]
    log_file: Option<String>,

    /// Bound of the output channel
    #[arg(long, default_value_t = SESSION_CTL_QUEUE_MAX)]
    queue: usize,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    match args.command {
        Commands::Run(r) => run(r),
        Commands::Check { config } => check(config),
        Commands::Schema => schema(),
    }
}

fn check(path: PathBuf) -> Result<()> {
    let config = RdeConfig::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    println!(
        "{}: as {}, {} ribs, {} peers, {} filter rules, {} networks",
        path.display(),
        config.global.asn,
        config.ribs.len(),
        config.peers.len(),
        config.filters.len(),
        config.networks.len(),
    );
    Ok(())
}

fn schema() -> Result<()> {
    let schema = schemars::schema_for!(RdeEvent);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run(r: Run) -> Result<()> {
    let log = match &r.log_file {
        Some(f) => init_file_logger(f)
            .with_context(|| format!("opening log file {f}"))?,
        None => init_term_logger(),
    };
    let config = RdeConfig::load(&r.config)
        .with_context(|| format!("loading {}", r.config.display()))?;
    info!(log, "starting"; "config" => %r.config.display(), "asn" => config.global.asn);

    let (otx, orx) = RdeOutput::channel(r.queue);
    let (etx, erx) = mpsc::channel();
    let rde = Rde::new(config, otx, log.clone()).context("starting engine")?;

    let engine = thread::Builder::new()
        .name("rde".into())
        .spawn(move || rde.run(erx))?;

    let wlog = log.clone();
    let writer = thread::Builder::new()
        .name("rde-out".into())
        .spawn(move || write_outputs(orx, wlog))?;

    read_events(etx, &log)?;

    if engine.join().is_err() {
        error!(log, "engine thread panicked");
    }
    if writer.join().is_err() {
        error!(log, "output thread panicked");
    }
    info!(log, "done");
    Ok(())
}

/// Feed stdin to the engine until it closes, then ask the engine to stop.
fn read_events(tx: mpsc::Sender<RdeEvent>, log: &Logger) -> Result<()> {
    let stdin = std::io::stdin();
    for (n, line) in stdin.lock().lines().enumerate() {
        let line = line.context("reading events")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: RdeEvent = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                warn!(log, "bad event"; "line" => n + 1, "error" => %e);
                continue;
            }
        };
        if tx.send(event).is_err() {
            warn!(log, "engine stopped");
            return Ok(());
        }
    }
    // the engine may already be gone
    let _ = tx.send(RdeEvent::Shutdown);
    Ok(())
}

fn write_outputs(rx: mpsc::Receiver<RdeOutput>, log: Logger) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for o in rx {
        if let Err(e) = write_line(&mut out, &o) {
            error!(log, "writing output"; "error" => %e);
            return;
        }
    }
}

fn write_line<W: Write>(out: &mut W, o: &RdeOutput) -> Result<()> {
    serde_json::to_writer(&mut *out, o)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
