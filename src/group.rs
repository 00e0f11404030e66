#![forbid(unsafe_code)]

//! Alias-aware command group with shared option sets
//!
//! A [`Group`] owns an ordered registry of [`Command`]s and drives clap for
//! parsing: it builds the parent `clap::Command`, resolves typed names
//! (canonical first, then aliases), and invokes the resolved command's
//! callback. Shared option sets are merged into each subcommand when it is
//! registered, never at parse time, so every collision is caught while the
//! program is being wired up.

use std::ffi::OsString;
use std::fmt;

use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches};
use log::LevelFilter;

use crate::command::{Callback, Command};
use crate::error::Error;
use crate::logging::{self, VerbosityGuard};

const VERBOSITY_LEVELS: [&str; 6] = ["quiet", "error", "warning", "info", "debug", "trace"];

/// An ordered registry of commands dispatched by name or alias.
///
/// Option sets (`common_options`, `debug_option`, `global_option`,
/// `verbose_option`, `verbosity_option`) must be declared before any
/// command is registered; registration is the point where every option is
/// validated and merged.
///
/// ```no_run
/// use clap::{Arg, ArgAction};
/// use clapext::{Command, Group};
///
/// fn main() -> Result<(), clapext::Error> {
///     let group = Group::new("greeter")
///         .about("Greet people")
///         .common_options([Arg::new("excited")
///             .long("excited")
///             .action(ArgAction::SetTrue)])
///         .debug_option()
///         .register(Command::new("hello").alias("hi").run(|matches| {
///             let bang = matches.get_flag("excited");
///             log::info!("Hello{}", if bang { "!" } else { "." });
///             Ok(())
///         }))?;
///
///     std::process::exit(group.exec());
/// }
/// ```
pub struct Group {
    spec: clap::Command,
    commands: Vec<Command>,
    common_options: Vec<Arg>,
    global_options: Vec<Arg>,
    before_dispatch: Option<Callback>,
    debug: bool,
    verbose: bool,
    verbosity: bool,
}

impl Group {
    pub fn new(name: impl Into<clap::builder::Str>) -> Self {
        Group {
            spec: clap::Command::new(name),
            commands: Vec::new(),
            common_options: Vec::new(),
            global_options: Vec::new(),
            before_dispatch: None,
            debug: false,
            verbose: false,
            verbosity: false,
        }
    }

    pub fn about(mut self, text: impl Into<String>) -> Self {
        self.spec = self.spec.about(text.into());
        self
    }

    pub fn version(mut self, version: impl Into<clap::builder::Str>) -> Self {
        self.spec = self.spec.version(version);
        self
    }

    /// Declare an ordered option set merged into every subsequently
    /// registered subcommand, positioned after the command's own options.
    pub fn common_options(mut self, options: impl IntoIterator<Item = Arg>) -> Self {
        debug_assert!(
            self.commands.is_empty(),
            "group options must be declared before subcommands are registered"
        );
        self.common_options.extend(options);
        self
    }

    /// Append the reserved `--debug` flag to the common option set. When
    /// passed at invocation time the log level is raised to `Debug` for
    /// that single invocation only.
    pub fn debug_option(mut self) -> Self {
        debug_assert!(
            self.commands.is_empty(),
            "group options must be declared before subcommands are registered"
        );
        self.common_options.push(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Show debug statements."),
        );
        self.debug = true;
        self
    }

    /// Declare a group-owned option accepted anywhere on the command line.
    ///
    /// The value is visible to subcommand callbacks through clap's global
    /// argument propagation. A value-taking global option must not be given
    /// a value identical to a command alias; alias rewriting identifies the
    /// typed token textually.
    pub fn global_option(mut self, option: Arg) -> Self {
        debug_assert!(
            self.commands.is_empty(),
            "group options must be declared before subcommands are registered"
        );
        let option = option.global(true);
        self.spec = self.spec.arg(option.clone());
        self.global_options.push(option);
        self
    }

    /// Add a global `-v`/`--verbose` flag that raises the log level to
    /// `Debug` for a single invocation. A coarser switch than
    /// [`Group::verbosity_option`]; `--verbosity` wins when both are given.
    pub fn verbose_option(mut self) -> Self {
        self.verbose = true;
        self.global_option(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Increase output verbosity"),
        )
    }

    /// Add a global `--verbosity <LVL>` option selecting the maximum log
    /// level for a single invocation, from `quiet` to `trace`.
    pub fn verbosity_option(mut self) -> Self {
        self.verbosity = true;
        self.global_option(
            Arg::new("verbosity")
                .long("verbosity")
                .value_name("LVL")
                .value_parser(VERBOSITY_LEVELS)
                .help("Set the output verbosity level"),
        )
    }

    /// Run a hook with the resolved matches before every dispatched
    /// command, after the verbosity options have been applied. A hook
    /// failure skips the command's callback.
    pub fn before_dispatch<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ArgMatches) -> Result<(), Error> + 'static,
    {
        self.before_dispatch = Some(Box::new(hook));
        self
    }

    /// Register a subcommand, validating its name, aliases, and parameters
    /// against everything already declared on the group, then merging the
    /// common option set into its parameter list.
    pub fn register(mut self, command: Command) -> Result<Self, Error> {
        self.validate_option_sets()?;

        let name = command.name().to_string();

        if self.commands.iter().any(|cmd| cmd.name() == name) {
            return Err(Error::configuration(format!(
                "Command '{name}' is already registered"
            )));
        }

        if let Some(owner) = self
            .commands
            .iter()
            .find(|cmd| cmd.aliases().iter().any(|alias| *alias == name))
        {
            return Err(Error::configuration(format!(
                "Command '{name}' conflicts with an alias of command '{}'",
                owner.name()
            )));
        }

        self.validate_aliases(&command, &name)?;
        self.validate_parameters(&command, &name)?;

        let command = command.with_merged_options(self.common_options.iter().cloned());
        self.commands.push(command);

        Ok(self)
    }

    /// Resolve a typed name to its command: exact canonical match first,
    /// then aliases, both in declaration order. No fuzzy matching.
    pub fn resolve(&self, name: &str) -> Result<&Command, Error> {
        if let Some(command) = self.commands.iter().find(|cmd| cmd.name() == name) {
            return Ok(command);
        }

        if let Some(command) = self
            .commands
            .iter()
            .find(|cmd| cmd.aliases().iter().any(|alias| alias == name))
        {
            return Ok(command);
        }

        Err(Error::usage(format!("No such command '{name}'.")))
    }

    /// Parse the process arguments and invoke the resolved command.
    pub fn run(&self) -> Result<(), Error> {
        self.run_from(std::env::args_os())
    }

    /// Parse the given arguments (the first item is the binary name) and
    /// invoke the resolved command.
    pub fn run_from<I, T>(&self, argv: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        self.run_argv(argv, true)
    }

    /// Top-level entry point: run, render any error through the logging
    /// pipeline, and return the conventional exit code.
    pub fn exec(&self) -> i32 {
        logging::init();

        match self.run() {
            Ok(()) => 0,
            Err(err) => {
                err.report();
                err.exit_code()
            }
        }
    }

    /// The group's help text, with aliased commands annotated.
    pub fn render_help(&self) -> String {
        let mut parent = self.build();
        parent.render_help().to_string()
    }

    pub fn name(&self) -> &str {
        self.spec.get_name()
    }

    /// Registered commands in declaration order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn run_argv(&self, argv: Vec<OsString>, resolve_aliases: bool) -> Result<(), Error> {
        let matches = match self.build().try_get_matches_from(argv.iter().cloned()) {
            Ok(matches) => matches,
            Err(err) => return handle_clap_error(err),
        };

        let Some((typed, submatches)) = matches.subcommand() else {
            return Err(Error::usage("Missing command."));
        };

        if let Some(command) = self.commands.iter().find(|cmd| cmd.name() == typed) {
            return self.dispatch(command, submatches);
        }

        if !resolve_aliases {
            return Err(Error::usage(format!("No such command '{typed}'.")));
        }

        // The typed name is not canonical; map it through the alias table
        // and re-parse with the canonical name in place.
        let canonical = self.resolve(typed)?.name().to_string();
        let argv = rewrite_alias(argv, typed, &canonical);
        self.run_argv(argv, false)
    }

    fn dispatch(&self, command: &Command, submatches: &ArgMatches) -> Result<(), Error> {
        let _guard = self.verbosity_guard(submatches);

        if let Some(hook) = &self.before_dispatch {
            hook(submatches)?;
        }

        command.invoke(submatches)
    }

    /// Invocation-scoped log level elevation. `--verbosity` wins over
    /// `--verbose`, which wins over `--debug`; the previous level returns
    /// when the guard drops. Global option values propagate into the
    /// subcommand matches wherever they were typed, so the submatches are
    /// the one place every option can be read from.
    fn verbosity_guard(&self, submatches: &ArgMatches) -> Option<VerbosityGuard> {
        if self.verbosity {
            if let Ok(Some(level)) = submatches.try_get_one::<String>("verbosity") {
                return Some(logging::verbosity_override(parse_level(level)));
            }
        }

        if self.verbose && flag_set(submatches, "verbose") {
            return Some(logging::verbosity_override(LevelFilter::Debug));
        }

        if self.debug && flag_set(submatches, "debug") {
            return Some(logging::verbosity_override(LevelFilter::Debug));
        }

        None
    }

    fn build(&self) -> clap::Command {
        let mut parent = self
            .spec
            .clone()
            .subcommand_required(true)
            .arg_required_else_help(true)
            .allow_external_subcommands(true)
            .external_subcommand_value_parser(clap::value_parser!(OsString));

        for command in &self.commands {
            parent = parent.subcommand(annotated_spec(command));
        }

        parent
    }

    fn validate_aliases(&self, command: &Command, name: &str) -> Result<(), Error> {
        for (position, alias) in command.aliases().iter().enumerate() {
            if alias == name {
                return Err(Error::configuration(format!(
                    "Alias '{alias}' duplicates the name of command '{name}'"
                )));
            }

            if command.aliases()[..position].contains(alias) {
                return Err(Error::configuration(format!(
                    "Alias '{alias}' is declared more than once on command '{name}'"
                )));
            }

            if self.commands.iter().any(|cmd| cmd.name() == *alias) {
                return Err(Error::configuration(format!(
                    "Alias '{alias}' conflicts with the command '{alias}'"
                )));
            }

            if let Some(owner) = self
                .commands
                .iter()
                .find(|cmd| cmd.aliases().contains(alias))
            {
                return Err(Error::configuration(format!(
                    "Alias '{alias}' is already used by command '{}'",
                    owner.name()
                )));
            }
        }

        Ok(())
    }

    fn validate_parameters(&self, command: &Command, name: &str) -> Result<(), Error> {
        for global in &self.global_options {
            if global.get_id().as_str() == name {
                return Err(Error::configuration(format!(
                    "Command '{name}' conflicts with the global option '{}'",
                    global.get_id()
                )));
            }

            for own in command.spec().get_arguments() {
                if let Some(clash) = arg_clash(own, global) {
                    return Err(Error::configuration(format!(
                        "{clash} of command '{name}' conflicts with a global option"
                    )));
                }
            }
        }

        for common in &self.common_options {
            for own in command.spec().get_arguments() {
                if let Some(clash) = arg_clash(own, common) {
                    return Err(Error::configuration(format!(
                        "{clash} of command '{name}' conflicts with a common option"
                    )));
                }
            }
        }

        Ok(())
    }

    /// The declared option sets must not clash among themselves before they
    /// can be merged into a single parameter list.
    fn validate_option_sets(&self) -> Result<(), Error> {
        for (position, global) in self.global_options.iter().enumerate() {
            for earlier in &self.global_options[..position] {
                if let Some(clash) = arg_clash(global, earlier) {
                    return Err(Error::configuration(format!(
                        "{clash} is declared more than once in the global option set"
                    )));
                }
            }
        }

        for (position, common) in self.common_options.iter().enumerate() {
            for earlier in &self.common_options[..position] {
                if let Some(clash) = arg_clash(common, earlier) {
                    return Err(Error::configuration(format!(
                        "{clash} is declared more than once in the common option set"
                    )));
                }
            }

            for global in &self.global_options {
                if let Some(clash) = arg_clash(common, global) {
                    return Err(Error::configuration(format!(
                        "Common {} conflicts with a global option",
                        lowercase_first(&clash)
                    )));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name())
            .field("commands", &self.commands)
            .field("common_options", &self.common_options)
            .field("global_options", &self.global_options)
            .field("before_dispatch", &self.before_dispatch.is_some())
            .finish()
    }
}

fn flag_set(matches: &ArgMatches, id: &str) -> bool {
    matches
        .try_get_one::<bool>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

/// Clone a command's spec for the parent parser, annotating its help line
/// with the alias list.
fn annotated_spec(command: &Command) -> clap::Command {
    let mut spec = command.spec().clone();

    if !command.aliases().is_empty() {
        let joined = command.aliases().join(", ");
        let about = match spec.get_about() {
            Some(text) => format!("{text} [aliases: {joined}]"),
            None => format!("[aliases: {joined}]"),
        };
        spec = spec.about(about);
    }

    spec
}

/// Replace the typed alias token with the canonical command name. The first
/// matching token after the binary name is the one clap treated as the
/// subcommand.
fn rewrite_alias(mut argv: Vec<OsString>, alias: &str, canonical: &str) -> Vec<OsString> {
    if let Some(token) = argv
        .iter_mut()
        .skip(1)
        .find(|token| token.to_str() == Some(alias))
    {
        *token = OsString::from(canonical);
    }

    argv
}

/// Describe how two argument specifications collide, if they do.
fn arg_clash(own: &Arg, other: &Arg) -> Option<String> {
    if own.get_id() == other.get_id() {
        return Some(format!("Option '{}'", own.get_id()));
    }

    if let (Some(own_long), Some(other_long)) = (own.get_long(), other.get_long()) {
        if own_long == other_long {
            return Some(format!("Option string '--{own_long}'"));
        }
    }

    if let (Some(own_short), Some(other_short)) = (own.get_short(), other.get_short()) {
        if own_short == other_short {
            return Some(format!("Option string '-{own_short}'"));
        }
    }

    None
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_level(value: &str) -> LevelFilter {
    match value {
        "quiet" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Help and version requests print and succeed; everything else becomes a
/// usage error whose message line is routed through the logger while the
/// usage text is echoed plainly.
fn handle_clap_error(err: clap::Error) -> Result<(), Error> {
    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            let _ = err.print();
            Ok(())
        }
        _ => Err(usage_from_clap(err)),
    }
}

fn usage_from_clap(err: clap::Error) -> Error {
    let rendered = err.render().to_string();
    let mut lines = rendered.lines();

    let first = lines.next().unwrap_or_default();
    let message = first.strip_prefix("error: ").unwrap_or(first).to_string();

    let rest = lines.collect::<Vec<_>>().join("\n");
    let usage = rest.trim();

    Error::Usage {
        message,
        usage: if usage.is_empty() {
            None
        } else {
            Some(usage.to_string())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> Group {
        Group::new("app")
            .register(Command::new("deploy").alias("d").alias("ship"))
            .unwrap()
            .register(Command::new("status"))
            .unwrap()
    }

    #[test]
    fn test_resolve_canonical_and_aliases_return_same_command() {
        let group = sample_group();

        let canonical = group.resolve("deploy").unwrap();
        for name in ["deploy", "d", "ship"] {
            let resolved = group.resolve(name).unwrap();
            assert!(std::ptr::eq(canonical, resolved));
        }
    }

    #[test]
    fn test_resolve_unknown_name_is_usage_error() {
        let group = sample_group();
        let err = group.resolve("x").unwrap_err();

        assert!(matches!(err, Error::Usage { .. }));
        assert_eq!(err.to_string(), "No such command 'x'.");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_register_rejects_duplicate_command_name() {
        let err = sample_group()
            .register(Command::new("deploy"))
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(err.to_string(), "Command 'deploy' is already registered");
    }

    #[test]
    fn test_register_rejects_command_name_matching_alias() {
        let err = sample_group().register(Command::new("d")).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Command 'd' conflicts with an alias of command 'deploy'"
        );
    }

    #[test]
    fn test_register_rejects_alias_matching_own_name() {
        let err = Group::new("app")
            .register(Command::new("deploy").alias("deploy"))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Alias 'deploy' duplicates the name of command 'deploy'"
        );
    }

    #[test]
    fn test_register_rejects_alias_matching_existing_command() {
        let err = sample_group()
            .register(Command::new("watch").alias("status"))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Alias 'status' conflicts with the command 'status'"
        );
    }

    #[test]
    fn test_register_rejects_alias_matching_existing_alias() {
        let err = sample_group()
            .register(Command::new("watch").alias("ship"))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Alias 'ship' is already used by command 'deploy'"
        );
    }

    #[test]
    fn test_register_rejects_repeated_alias_on_one_command() {
        let err = Group::new("app")
            .register(Command::new("deploy").alias("d").alias("d"))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Alias 'd' is declared more than once on command 'deploy'"
        );
    }

    #[test]
    fn test_register_rejects_common_option_name_collision() {
        let err = Group::new("app")
            .common_options([Arg::new("excited")
                .long("excited")
                .action(ArgAction::SetTrue)])
            .register(
                Command::new("hello")
                    .arg(Arg::new("excited").long("excited").action(ArgAction::SetTrue)),
            )
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Option 'excited' of command 'hello' conflicts with a common option"
        );
    }

    #[test]
    fn test_register_rejects_common_option_string_collision() {
        let err = Group::new("app")
            .common_options([Arg::new("excited")
                .long("excited")
                .action(ArgAction::SetTrue)])
            .register(
                Command::new("hello")
                    .arg(Arg::new("enthusiasm").long("excited").action(ArgAction::SetTrue)),
            )
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Option string '--excited' of command 'hello' conflicts with a common option"
        );
    }

    #[test]
    fn test_register_rejects_global_option_collisions() {
        let group = || Group::new("app").global_option(Arg::new("config").long("config"));

        let err = group().register(Command::new("config")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command 'config' conflicts with the global option 'config'"
        );

        let err = group()
            .register(Command::new("build").arg(Arg::new("config").long("cfg")))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Option 'config' of command 'build' conflicts with a global option"
        );
    }

    #[test]
    fn test_register_rejects_clashing_global_options() {
        let err = Group::new("app")
            .verbose_option()
            .global_option(Arg::new("loud").long("loud").short('v'))
            .register(Command::new("hello"))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Option string '-v' is declared more than once in the global option set"
        );
    }

    #[test]
    fn test_verbose_and_verbosity_options_coexist() {
        let help = Group::new("app")
            .verbose_option()
            .verbosity_option()
            .register(Command::new("hello"))
            .unwrap()
            .render_help();

        assert!(help.contains("--verbose"), "help was:\n{help}");
        assert!(help.contains("--verbosity"), "help was:\n{help}");
    }

    #[test]
    fn test_register_rejects_clashing_common_options() {
        let err = Group::new("app")
            .common_options([
                Arg::new("excited").long("excited").action(ArgAction::SetTrue),
                Arg::new("excited").long("thrilled").action(ArgAction::SetTrue),
            ])
            .register(Command::new("hello"))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Option 'excited' is declared more than once in the common option set"
        );
    }

    #[test]
    fn test_register_merges_common_options_into_subcommands() {
        let group = Group::new("app")
            .common_options([Arg::new("excited")
                .long("excited")
                .action(ArgAction::SetTrue)])
            .debug_option()
            .register(Command::new("hello").arg(Arg::new("name").long("name")))
            .unwrap();

        let ids: Vec<&str> = group.commands()[0]
            .spec()
            .get_arguments()
            .map(|arg| arg.get_id().as_str())
            .collect();

        assert_eq!(ids, ["name", "excited", "debug"]);
    }

    #[test]
    fn test_help_annotates_aliases_in_declaration_order() {
        let help = sample_group().render_help();

        assert!(help.contains("[aliases: d, ship]"), "help was:\n{help}");
    }

    #[test]
    fn test_help_without_aliases_has_no_annotation() {
        let help = Group::new("app")
            .register(Command::new("status"))
            .unwrap()
            .render_help();

        assert!(!help.contains("aliases"), "help was:\n{help}");
    }

    #[test]
    fn test_hidden_commands_are_resolvable_but_unlisted() {
        let group = Group::new("app")
            .register(Command::new("internal").hide(true))
            .unwrap()
            .register(Command::new("status"))
            .unwrap();

        assert!(group.resolve("internal").is_ok());
        assert!(!group.render_help().contains("internal"));
    }

    #[test]
    fn test_rewrite_alias_replaces_only_the_typed_token() {
        let argv = vec![
            OsString::from("app"),
            OsString::from("d"),
            OsString::from("--target"),
            OsString::from("d"),
        ];

        let rewritten = rewrite_alias(argv, "d", "deploy");

        assert_eq!(rewritten[1], OsString::from("deploy"));
        assert_eq!(rewritten[3], OsString::from("d"));
    }

    #[test]
    fn test_parse_level_maps_all_choices() {
        assert_eq!(parse_level("quiet"), LevelFilter::Off);
        assert_eq!(parse_level("error"), LevelFilter::Error);
        assert_eq!(parse_level("warning"), LevelFilter::Warn);
        assert_eq!(parse_level("info"), LevelFilter::Info);
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("trace"), LevelFilter::Trace);
    }

    #[test]
    fn test_usage_from_clap_splits_message_and_usage() {
        let err = clap::Command::new("app")
            .arg(Arg::new("n").long("n"))
            .try_get_matches_from(["app", "--bogus"])
            .unwrap_err();

        let converted = usage_from_clap(err);

        match converted {
            Error::Usage { message, usage } => {
                assert!(message.contains("--bogus"), "message was: {message}");
                assert!(!message.starts_with("error:"));
                assert!(usage.is_some_and(|text| text.contains("Usage:")));
            }
            other => panic!("expected usage error, got {other:?}"),
        }
    }
}
