//! Stderr logging gated by `CONVTILE_TRACE` (`1`/`basic` or `full`).
//!
//! Lines carry the wall-clock time and the emitting thread, so the two engine
//! streams can be told apart in an interleaved log.

use std::env;
use std::fmt::Arguments;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TraceLevel {
    Off,
    Basic,
    Full,
}

/// Category of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Trace,
    Sync,
    Warning,
    Error,
    Critical,
}

impl LogKind {
    fn label(self) -> &'static str {
        match self {
            LogKind::Trace => "TRACE",
            LogKind::Sync => "SYNC",
            LogKind::Warning => "WARNING",
            LogKind::Error => "ERROR",
            LogKind::Critical => "CRITICAL",
        }
    }

    fn color(self) -> &'static str {
        match self {
            LogKind::Trace => "34",
            LogKind::Sync => "35",
            LogKind::Warning => "33",
            LogKind::Error => "91",
            LogKind::Critical => "31",
        }
    }

    // Handshake lines are one per signal or wait, so they need `full`.
    fn min_level(self) -> TraceLevel {
        match self {
            LogKind::Critical => TraceLevel::Off,
            LogKind::Sync => TraceLevel::Full,
            LogKind::Trace | LogKind::Warning | LogKind::Error => TraceLevel::Basic,
        }
    }
}

static TRACE_LEVEL: OnceLock<TraceLevel> = OnceLock::new();

fn trace_level() -> TraceLevel {
    *TRACE_LEVEL.get_or_init(|| {
        match env::var("CONVTILE_TRACE")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "1" | "basic" => TraceLevel::Basic,
            "full" => TraceLevel::Full,
            _ => TraceLevel::Off,
        }
    })
}

/// Whether a line of `kind` would currently be printed.
pub fn enabled(kind: LogKind) -> bool {
    trace_level() >= kind.min_level()
}

fn clock() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() % 86_400)
        .unwrap_or(0);
    format!("{:02}:{:02}:{:02}", secs / 3_600, secs / 60 % 60, secs % 60)
}

/// Writes one line when the trace level admits `kind`. Called by the macros.
pub fn emit(kind: LogKind, args: Arguments) {
    if !enabled(kind) {
        return;
    }
    let current = std::thread::current();
    eprintln!(
        "{} [\u{001b}[{}m{}\u{001b}[0m] <{}> -- {args}",
        clock(),
        kind.color(),
        kind.label(),
        current.name().unwrap_or("main"),
    );
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogKind::Trace, format_args!($($arg)*))
    };
}

/// Handshake traffic between the engine streams.
#[macro_export]
macro_rules! sync_trace {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogKind::Sync, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogKind::Warning, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogKind::Error, format_args!($($arg)*))
    };
}

/// Printed regardless of `CONVTILE_TRACE`.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogKind::Critical, format_args!($($arg)*))
    };
}
