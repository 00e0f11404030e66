#![forbid(unsafe_code)]

//! clapext: ergonomic extensions for clap-based command-line tools
//!
//! clapext layers three conveniences on top of clap's parse-then-dispatch
//! model without replacing any of it:
//!
//! - Colorized, level-aware console logging on the `log` facade, installed
//!   once per process ([`logging::init`]).
//! - Command aliases within a group, resolved canonical-name-first
//!   ([`Group::resolve`]).
//! - Common options merged into every subcommand of a group at registration
//!   time, including an optional `--debug` flag that raises log verbosity
//!   for a single invocation ([`Group::common_options`],
//!   [`Group::debug_option`]).
//!
//! Argument tokenizing, help rendering, and completion stay with clap.

pub mod command;
pub mod error;
pub mod group;
pub mod logging;

pub use command::{Callback, Command};
pub use error::Error;
pub use group::Group;
