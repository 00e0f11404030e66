#![forbid(unsafe_code)]

//! Alias-capable command wrapper
//!
//! A [`Command`] bundles a `clap::Command` spec with an alias list and the
//! callback to run when the command is dispatched. Aliases have no effect
//! until the command is registered with a [`crate::Group`].

use std::fmt;

use clap::{Arg, ArgMatches};

use crate::error::Error;

/// Callback invoked with the parsed matches of a dispatched command.
pub type Callback = Box<dyn Fn(&ArgMatches) -> Result<(), Error>>;

/// A named, invocable unit with a parameter list, alias set, and callback.
pub struct Command {
    spec: clap::Command,
    aliases: Vec<String>,
    callback: Option<Callback>,
}

impl Command {
    pub fn new(name: impl Into<clap::builder::Str>) -> Self {
        Command::from_spec(clap::Command::new(name))
    }

    /// Wrap an already-built clap command spec.
    pub fn from_spec(spec: clap::Command) -> Self {
        Command {
            spec,
            aliases: Vec::new(),
            callback: None,
        }
    }

    pub fn about(mut self, text: impl Into<String>) -> Self {
        self.spec = self.spec.about(text.into());
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.spec = self.spec.arg(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
        self.spec = self.spec.args(args);
        self
    }

    /// Hide the command from the group's help listing. Hidden commands are
    /// still resolvable and invocable.
    pub fn hide(mut self, yes: bool) -> Self {
        self.spec = self.spec.hide(yes);
        self
    }

    /// Add an alternate name for this command. Aliases resolve through the
    /// owning group and keep their declaration order in help annotations.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Set the callback to run when this command is dispatched.
    pub fn run<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ArgMatches) -> Result<(), Error> + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn name(&self) -> &str {
        self.spec.get_name()
    }

    /// Aliases in declaration order.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn spec(&self) -> &clap::Command {
        &self.spec
    }

    /// Merge group-level options into this command's parameter list. Called
    /// by the group at registration time, after collision checks.
    pub(crate) fn with_merged_options(mut self, options: impl IntoIterator<Item = Arg>) -> Self {
        self.spec = self.spec.args(options);
        self
    }

    /// Run the callback with parsed matches. A command without a callback
    /// is a no-op success.
    pub(crate) fn invoke(&self, matches: &ArgMatches) -> Result<(), Error> {
        match &self.callback {
            Some(callback) => callback(matches),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name())
            .field("aliases", &self.aliases)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
