//! Logging setup shared by the supervisor, workers and the status command.
//!
//! # Environment Variables
//!
//! - `WORKSTAT_LOG` - Log filter (overrides RUST_LOG)
//! - `WORKSTAT_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `WORKSTAT_LOG_FORMAT` - Output format: pretty, compact, json
//! - `WORKSTAT_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! File output is written synchronously. Workers are forked from the
//! supervisor after logging is initialised, and a background writer thread
//! would not survive the fork.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-field format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Log rotation for file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration.
///
/// Use the builder methods to customize, then pass to [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: WARN)
    pub level: Level,
    /// Log format (default: Pretty)
    pub format: LogFormat,
    /// Path to log file (None = stderr only)
    pub file_path: Option<PathBuf>,
    /// Log rotation for file output (default: Daily)
    pub rotation: LogRotation,
    /// Log span timing on close
    pub span_events: bool,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// Show target module in logs (default: true)
    pub show_target: bool,
    /// ANSI colors on stderr (default: true)
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: LogRotation::Daily,
            span_events: false,
            filter: None,
            show_target: true,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `-v`/`-vv`/`-q` onto a config.
    ///
    /// An explicit flag becomes the filter, so environment variables cannot
    /// override it later.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => return Self::default(),
            (false, 1) => Level::INFO,
            (false, _) => Level::DEBUG,
        };
        Self::default()
            .with_level(level)
            .with_filter(level.as_str().to_lowercase())
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// `WORKSTAT_LOG`/`RUST_LOG` and `WORKSTAT_LOG_LEVEL` only apply when no
    /// filter was set from the command line.
    pub fn with_env_overrides(mut self) -> Self {
        if self.filter.is_none() {
            if let Ok(filter) = std::env::var("WORKSTAT_LOG") {
                self.filter = Some(filter);
            } else if let Ok(filter) = std::env::var("RUST_LOG") {
                self.filter = Some(filter);
            }
        }

        if self.filter.is_none()
            && let Ok(level_str) = std::env::var("WORKSTAT_LOG_LEVEL")
        {
            self.level = parse_level(&level_str).unwrap_or(self.level);
        }

        if let Ok(format) = std::env::var("WORKSTAT_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        if let Ok(path) = std::env::var("WORKSTAT_LOG_FILE") {
            self.file_path = Some(PathBuf::from(path));
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str().to_lowercase());
        match self.filter {
            Some(ref filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                fallback()
            }),
            None => fallback(),
        }
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let span_events = if config.span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_span_events(span_events)
        .with_target(config.show_target)
        .with_ansi(ansi)
        .with_writer(writer);

    match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.boxed(),
    }
}

fn file_appender(path: &Path, rotation: LogRotation) -> Option<RollingFileAppender> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workstat.log");

    RollingFileAppender::builder()
        .rotation(rotation.into())
        .filename_prefix(prefix)
        .build(dir)
        .inspect_err(|e| eprintln!("Warning: cannot log to {}: {}", path.display(), e))
        .ok()
}

/// Initialize the global tracing subscriber.
///
/// Logs to stderr, and additionally to `config.file_path` when set.
/// Subsequent calls are silently ignored.
pub fn init(config: LogConfig) {
    let mut layers = vec![fmt_layer(&config, std::io::stderr, config.ansi)];
    if let Some(appender) = config
        .file_path
        .as_deref()
        .and_then(|path| file_appender(path, config.rotation))
    {
        layers.push(fmt_layer(&config, appender, false));
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(config.build_filter())
        .try_init();
}
