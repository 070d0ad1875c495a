//! Debug logging with per-module loggers.
//!
//! Selection via the DEBUG environment variable:
//! - `DEBUG=*` - enable every logger
//! - `DEBUG=pegvm` - enable one logger
//! - `DEBUG=pegvm,linker` - enable several
//!
//! Detail messages additionally require `DEBUG_VERBOSITY=2` (default 1).

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

enum Selection {
    All,
    None,
    Named(Vec<String>),
}

struct Config {
    selection: Selection,
    verbosity: u8,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        let selection = match env::var("DEBUG").ok().as_deref() {
            None | Some("") => Selection::None,
            Some("*") | Some("1") | Some("true") => Selection::All,
            Some(value) => {
                let names: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    Selection::None
                } else {
                    Selection::Named(names)
                }
            }
        };
        let verbosity = env::var("DEBUG_VERBOSITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1u8)
            .min(2);
        Config { selection, verbosity }
    })
}

/// A named logger. Cheap to construct; disabled loggers skip all work.
pub struct Logger {
    name: &'static str,
    enabled: bool,
    indent: AtomicUsize,
}

impl Logger {
    pub const fn disabled() -> Self {
        Self { name: "", enabled: false, indent: AtomicUsize::new(0) }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn prefix(&self) -> String {
        let indent = self.indent.load(Ordering::Relaxed);
        format!("{}[{}]", "  ".repeat(indent), self.name)
    }

    #[inline]
    pub fn log(&self, msg: &str) {
        if self.enabled {
            eprintln!("{} {}", self.prefix(), msg);
        }
    }

    #[inline]
    pub fn detail(&self, msg: &str) {
        if self.enabled && config().verbosity >= 2 {
            eprintln!("{} {}", self.prefix(), msg);
        }
    }

    #[inline]
    pub fn success(&self, msg: &str) {
        if self.enabled {
            eprintln!("{} OK: {}", self.prefix(), msg);
        }
    }

    #[inline]
    pub fn fail(&self, msg: &str) {
        if self.enabled {
            eprintln!("{} FAIL: {}", self.prefix(), msg);
        }
    }

    #[inline]
    pub fn push_indent(&self) {
        if self.enabled {
            self.indent.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn pop_indent(&self) {
        if self.enabled {
            let _ = self.indent.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        }
    }
}

/// Create a logger. Enabled iff `name` is selected by the DEBUG variable.
pub fn create_logger(name: &'static str) -> Logger {
    let on = match &config().selection {
        Selection::None => false,
        Selection::All => true,
        Selection::Named(names) => names.iter().any(|n| n == name),
    };
    Logger { name, enabled: on, indent: AtomicUsize::new(0) }
}

// Macros avoid the format! cost when the logger is disabled.

#[macro_export]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.log(&format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_detail {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.detail(&format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_success {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.success(&format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_fail {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.enabled() {
            $logger.fail(&format!($($arg)*));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_is_inert() {
        let log = Logger::disabled();
        assert!(!log.enabled());
        log.log("never printed");
        log.push_indent();
        log.pop_indent();
    }

    #[test]
    fn pop_indent_saturates() {
        let log = Logger::disabled();
        log.pop_indent();
        assert_eq!(log.indent.load(Ordering::Relaxed), 0);
    }
}
