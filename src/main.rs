//! workstat - pre-fork workers with a shared status registry.

use std::net::TcpListener;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};

use workstat::cli::{Cli, Commands, ServeArgs, StatusArgs, WorkerArgs};
use workstat::client::StatusClient;
use workstat::output::{self, TableOptions};
use workstat::server::{self, reporter::SnapshotReporter};
use workstat::store::StatusStore;
use workstat::supervisor::{self, SupervisorConfig};
use workstat::{logging, theme};

fn main() {
    let cli = Cli::parse();

    // Handle no-color flag - affects both owo_colors and comfy_table
    if cli.no_color {
        theme::disable_colors();
    }
    logging::init(cli.log_config());

    let result = match &cli.command {
        Commands::Serve(args) => cmd_serve(&cli, args),
        Commands::Worker(args) => cmd_worker(&cli, args),
        Commands::Status(args) => cmd_status(&cli, args),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Bind the shared listening socket and announce where it ended up.
fn bind(addr: &str) -> Result<TcpListener> {
    let listener =
        TcpListener::bind(addr).with_context(|| format!("Failed to bind {}", addr))?;
    let local = listener.local_addr()?;
    eprintln!("workstat listening on http://{}", local);
    Ok(listener)
}

fn cmd_serve(cli: &Cli, args: &ServeArgs) -> Result<()> {
    let listener = bind(&args.worker.bind)?;
    let config = SupervisorConfig {
        workers: usize::from(args.workers),
        worker: args.worker.worker_config(cli.status_path()),
    };
    supervisor::run(listener, &config)?;
    Ok(())
}

fn cmd_worker(cli: &Cli, args: &WorkerArgs) -> Result<()> {
    let listener = bind(&args.bind)?;
    server::run_worker(listener, &args.worker_config(cli.status_path()))?;
    Ok(())
}

fn cmd_status(cli: &Cli, args: &StatusArgs) -> Result<()> {
    let report = match &args.url {
        Some(url) => StatusClient::new(url.as_str())?
            .fetch()
            .with_context(|| format!("Failed to fetch status from {}", url))?,
        None => {
            let path = cli.status_path();
            let store = StatusStore::existing(&path).context("No status file; is a worker running?")?;
            SnapshotReporter::new(store).report()?
        }
    };

    output::print_report(&report, args.format, TableOptions { ascii: args.ascii });
    Ok(())
}
