//! Color theming for `status` output.
//!
//! Worker states map to a small semantic palette shared by `owo_colors`
//! (terminal text) and `comfy_table` (table cells).
//!
//! Colors are disabled globally by `--no-color` or the `NO_COLOR`
//! environment variable, after which every helper returns plain text.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;

use crate::record::WorkerStatus;

/// Global color enable flag (respects NO_COLOR and --no-color).
static COLORS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disable all colors globally.
///
/// Call this early in main() when --no-color is set.
pub fn disable_colors() {
    COLORS_ENABLED.store(false, Ordering::Relaxed);
    owo_colors::set_override(false);
}

pub fn colors_enabled() -> bool {
    COLORS_ENABLED.load(Ordering::Relaxed)
}

/// Semantic color categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    Pid,
    Idle,
    Busy,
    Terminated,
    Count,
    Muted,
}

impl From<WorkerStatus> for Semantic {
    fn from(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Idle => Self::Idle,
            WorkerStatus::Busy => Self::Busy,
            WorkerStatus::Terminated(_) => Self::Terminated,
        }
    }
}

/// The comfy_table color for a semantic category, `None` when colors are off.
pub fn table_color(semantic: Semantic) -> Option<comfy_table::Color> {
    if !colors_enabled() {
        return None;
    }
    Some(match semantic {
        Semantic::Pid => comfy_table::Color::Cyan,
        Semantic::Idle => comfy_table::Color::Green,
        Semantic::Busy => comfy_table::Color::Yellow,
        Semantic::Terminated => comfy_table::Color::Red,
        Semantic::Count => comfy_table::Color::Magenta,
        Semantic::Muted => comfy_table::Color::Reset,
    })
}

/// Extension trait for comfy_table cells with NO_COLOR support.
pub trait ThemedCell {
    fn themed(self, semantic: Semantic) -> Self;
}

impl ThemedCell for comfy_table::Cell {
    fn themed(self, semantic: Semantic) -> Self {
        match table_color(semantic) {
            Some(color) => self.fg(color),
            None => self,
        }
    }
}

fn paint<T: Display>(value: &T, style: impl FnOnce(&T) -> String) -> String {
    if colors_enabled() {
        style(value)
    } else {
        value.to_string()
    }
}

/// Semantic text styles for terminal output.
pub trait Themed: Display + Sized {
    /// Red + bold.
    fn error_style(&self) -> String {
        paint(self, |v| v.red().bold().to_string())
    }

    /// Yellow.
    fn warning(&self) -> String {
        paint(self, |v| v.yellow().to_string())
    }

    /// Bold + underline.
    fn section_header(&self) -> String {
        paint(self, |v| v.bold().underline().to_string())
    }

    /// Yellow field names.
    fn label(&self) -> String {
        paint(self, |v| v.yellow().to_string())
    }

    /// Cyan numbers.
    fn count(&self) -> String {
        paint(self, |v| v.cyan().to_string())
    }
}

impl Themed for String {}
impl Themed for &str {}
impl Themed for u64 {}
impl Themed for usize {}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn reset_colors() {
        COLORS_ENABLED.store(true, Ordering::Relaxed);
        owo_colors::set_override(true);
    }

    #[test]
    #[serial(colors)]
    fn test_disable_colors() {
        reset_colors();
        assert!(colors_enabled());
        disable_colors();
        assert!(!colors_enabled());
        reset_colors();
    }

    #[test]
    #[serial(colors)]
    fn test_themed_with_and_without_colors() {
        reset_colors();
        let colored = "busy".warning();
        assert!(colored.contains("\x1b["), "Expected ANSI escape codes");
        assert!(colored.contains("busy"));

        disable_colors();
        assert_eq!("busy".warning(), "busy");
        assert_eq!("Workers".section_header(), "Workers");
        assert_eq!(42u64.count(), "42");
        assert_eq!("oops".error_style(), "oops");
        reset_colors();
    }

    #[test]
    #[serial(colors)]
    fn test_status_colors() {
        reset_colors();
        assert_eq!(
            table_color(WorkerStatus::Idle.into()),
            Some(comfy_table::Color::Green)
        );
        assert_eq!(
            table_color(WorkerStatus::Terminated(15).into()),
            Some(comfy_table::Color::Red)
        );

        disable_colors();
        assert_eq!(table_color(Semantic::Busy), None);
        reset_colors();
    }
}
