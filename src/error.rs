#![forbid(unsafe_code)]

//! Error taxonomy for group registration and dispatch
//!
//! Configuration errors are programmer mistakes caught while a group is
//! wired up; usage errors are end-user mistakes caught at dispatch time.
//! Only usage errors carry clap's exit-code convention (2).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Static misconfiguration detected at registration time: alias
    /// collisions, duplicate or conflicting option names. Never raised
    /// during dispatch.
    #[error("{0}")]
    Configuration(String),

    /// The command line could not be mapped to a runnable command. The
    /// optional usage text is echoed plainly before the message is logged.
    #[error("{message}")]
    Usage {
        message: String,
        usage: Option<String>,
    },

    /// A command callback failed at runtime.
    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: message.into(),
            usage: None,
        }
    }

    pub fn command(message: impl Into<String>) -> Self {
        Error::Command(message.into())
    }

    /// Process exit code for this error: 2 for usage errors, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage { .. } => 2,
            _ => 1,
        }
    }

    /// Render the error to the console: usage text (if any) goes to stdout
    /// untouched, the message itself goes through the logging pipeline.
    pub(crate) fn report(&self) {
        if let Error::Usage {
            usage: Some(usage), ..
        } = self
        {
            println!("{usage}\n");
        }

        log::error!("{self}");
    }
}
