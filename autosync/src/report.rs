//! Tagged console diagnostics
//!
//! Each console line starts with a bracketed category tag so a user can tell
//! repair actions, retries, and manual-fix hints apart at a glance. Every line
//! is mirrored into the tracing log.

use colored::{ColoredString, Colorize};
use tracing::{error, info, warn};

/// Category of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Start,
    Stop,
    Change,
    Sync,
    Git,
    Repair,
    Retry,
    Info,
    Ok,
    Warn,
    Error,
    Hint,
}

impl Tag {
    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Change => "change",
            Self::Sync => "sync",
            Self::Git => "git",
            Self::Repair => "repair",
            Self::Retry => "retry",
            Self::Info => "info",
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Hint => "hint",
        }
    }

    fn styled(self) -> ColoredString {
        let tag = format!("[{}]", self.label());
        match self {
            Self::Ok => tag.green(),
            Self::Warn | Self::Retry => tag.yellow(),
            Self::Error => tag.red().bold(),
            Self::Hint => tag.cyan(),
            Self::Repair => tag.magenta(),
            Self::Change => tag.blue(),
            _ => tag.dimmed(),
        }
    }
}

/// Render a console line without color
pub fn format_line(tag: Tag, message: &str) -> String {
    format!("[{}] {}", tag.label(), message)
}

/// Print a tagged line to the console and record it in the log
pub fn emit(tag: Tag, message: impl AsRef<str>) {
    let message = message.as_ref();
    match tag {
        Tag::Error => error!(tag = tag.label(), "{}", message),
        Tag::Warn => warn!(tag = tag.label(), "{}", message),
        _ => info!(tag = tag.label(), "{}", message),
    }
    println!("{} {}", tag.styled(), message);
}
