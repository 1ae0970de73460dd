//! Command-line interface definitions using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::client::DEFAULT_STATUS_URL;
use crate::logging::{LogConfig, LogFormat};
use crate::output::OutputFormat;
use crate::paths;
use crate::server::{DEFAULT_INTROSPECTION_PATH, WorkerConfig};

/// Pre-fork HTTP workers that publish their status to a shared file.
#[derive(Parser, Debug)]
#[command(name = "workstat")]
#[command(author, version = crate::version::full_version(), about, long_about = None)]
pub struct Cli {
    /// Path to the shared status file.
    #[arg(long, global = true, env = "WORKSTAT_STATUS_FILE", default_value_os_t = paths::default_status_path())]
    pub status_file: PathBuf,

    /// Enable verbose output (-v for info, -vv for debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output. `NO_COLOR` accepts any non-empty value.
    #[arg(long, global = true, env = "NO_COLOR", value_parser = clap::builder::FalseyValueParser::new())]
    pub no_color: bool,

    /// Log format: pretty, compact or json.
    #[arg(long, global = true, value_parser = str::parse::<LogFormat>)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a supervisor that forks and respawns workers.
    Serve(ServeArgs),

    /// Run a single worker in the foreground, without a supervisor.
    Worker(WorkerArgs),

    /// Show the status of all workers.
    Status(StatusArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Options shared by `serve` and `worker`.
#[derive(Parser, Debug, Clone)]
pub struct WorkerArgs {
    /// Address to listen on.
    #[arg(short, long, env = "WORKSTAT_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Path answering the status report for local callers.
    #[arg(long, default_value = DEFAULT_INTROSPECTION_PATH)]
    pub introspection_path: String,

    /// Delay every demo response by this many milliseconds.
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,
}

impl WorkerArgs {
    pub fn worker_config(&self, status_file: PathBuf) -> WorkerConfig {
        WorkerConfig {
            status_file,
            introspection_path: self.introspection_path.clone(),
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

/// Arguments for the serve command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Number of worker processes.
    #[arg(short, long, env = "WORKSTAT_WORKERS", default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    #[command(flatten)]
    pub worker: WorkerArgs,
}

/// Arguments for the status command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Fetch from a running worker instead of reading the status file.
    #[arg(long, env = "WORKSTAT_URL", num_args = 0..=1, default_missing_value = DEFAULT_STATUS_URL)]
    pub url: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Use ASCII table borders instead of Unicode.
    #[arg(long)]
    pub ascii: bool,
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "workstat",
            &mut std::io::stdout(),
        );
    }
}

impl Cli {
    /// Status file path with a leading `~` expanded.
    pub fn status_path(&self) -> PathBuf {
        paths::expand_tilde(&self.status_file)
    }

    /// Logging configuration from flags, then environment.
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::from_verbosity(self.verbose, self.quiet)
            .with_ansi(!self.no_color)
            .with_env_overrides();
        if let Some(format) = self.log_format {
            config = config.with_format(format);
        }
        config
    }
}
