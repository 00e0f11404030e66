#![forbid(unsafe_code)]

//! Colorized console logging on the `log` facade
//!
//! Installs a single process-wide logger that prefixes messages with their
//! level (`Error: `, `Warning: `, `Debug: `) and colors the prefix when the
//! destination stream is an interactive terminal. Info messages are emitted
//! bare so normal output stays unadorned. Warnings and errors go to stderr,
//! everything else to stdout.

use std::io::{self, IsTerminal, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

static LOGGER: ConsoleLogger = ConsoleLogger;
static INIT: std::sync::Once = std::sync::Once::new();

/// Install the console logger at the default `Info` level.
///
/// Safe to call any number of times; only the first call has an effect, so
/// duplicate handlers can never produce duplicate log lines.
pub fn init() {
    init_with_level(LevelFilter::Info);
}

/// Install the console logger with an explicit maximum level.
///
/// Like [`init`], re-invocation is a no-op, including the level argument.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        // set_logger only fails when a logger is already installed, in
        // which case we leave that logger in place.
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    });
}

/// Raise (or lower) the maximum log level until the guard is dropped.
///
/// The previous level is restored on drop, so elevation driven by a
/// `--debug` or `--verbosity` option is scoped to a single invocation.
#[must_use = "the previous level is restored when the guard is dropped"]
pub fn verbosity_override(level: LevelFilter) -> VerbosityGuard {
    let previous = log::max_level();
    log::set_max_level(level);
    VerbosityGuard { previous }
}

/// Restores the prior maximum log level on drop.
#[derive(Debug)]
pub struct VerbosityGuard {
    previous: LevelFilter,
}

impl Drop for VerbosityGuard {
    fn drop(&mut self) {
        log::set_max_level(self.previous);
    }
}

/// Console logger with per-level prefixes and colors.
struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Console writes are best-effort; a closed pipe must not take the
        // program down.
        let _ = emit(record.level(), &record.args().to_string());
    }

    fn flush(&self) {}
}

/// Level prefix and its display color. Info has no prefix.
fn prefix(level: Level) -> Option<(&'static str, Color)> {
    match level {
        Level::Error => Some(("Error", Color::Red)),
        Level::Warn => Some(("Warning", Color::Yellow)),
        Level::Info => None,
        Level::Debug => Some(("Debug", Color::Blue)),
        Level::Trace => Some(("Trace", Color::Blue)),
    }
}

fn color_choice(is_terminal: bool) -> ColorChoice {
    // Auto still honors NO_COLOR and TERM=dumb; Never covers pipes and
    // redirects.
    if is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn emit(level: Level, message: &str) -> io::Result<()> {
    let use_stderr = matches!(level, Level::Error | Level::Warn);

    let mut stream = if use_stderr {
        StandardStream::stderr(color_choice(io::stderr().is_terminal()))
    } else {
        StandardStream::stdout(color_choice(io::stdout().is_terminal()))
    };

    match prefix(level) {
        Some((label, color)) => {
            // Multi-line messages get the prefix on every line.
            for line in message.split('\n') {
                stream.set_color(ColorSpec::new().set_fg(Some(color)))?;
                write!(stream, "{label}: ")?;
                stream.reset()?;
                writeln!(stream, "{line}")?;
            }
        }
        None => writeln!(stream, "{message}")?,
    }

    Ok(())
}

/// Uncolored rendering of a message, one prefixed line per input line.
#[cfg(test)]
fn render_plain(level: Level, message: &str) -> String {
    match prefix(level) {
        Some((label, _)) => message
            .split('\n')
            .map(|line| format!("{label}: {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
        None => message.to_string(),
    }
}
