//! Command resolution, flag parsing, and argument validation.

use std::collections::{BTreeMap, VecDeque};

use once_cell::sync::Lazy;

use crate::client::{CliError, CliResult};
use crate::help::{HelpText, OptionDescriptor};
use crate::registry::{CommandDescriptor, CommandRegistry};
use crate::session::Session;

pub(crate) const HELP_COMMAND: &str = "help";

/// Options accepted by every command.
static GLOBAL_OPTIONS: Lazy<Vec<OptionDescriptor>> =
    Lazy::new(|| HelpText::extract(GLOBAL_OPTIONS_HELP).options());

const GLOBAL_OPTIONS_HELP: &str = "\
# -a, --app APP        # app to run command against
# -r, --remote REMOTE  # git remote of app to run command against
#     --confirm APP    # confirm a destructive action
# -h, --help           # show help for the command
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OptionValue {
    Flag,
    Value(String),
}

/// A resolved command together with its parsed arguments.
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    pub(crate) registry: &'a CommandRegistry,
    pub(crate) command: &'a CommandDescriptor,
    args: VecDeque<String>,
    options: BTreeMap<String, OptionValue>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        registry: &'a CommandRegistry,
        command: &'a CommandDescriptor,
        args: Vec<String>,
        options: BTreeMap<String, OptionValue>,
    ) -> Self {
        Self {
            registry,
            command,
            args: args.into(),
            options,
        }
    }

    /// Consume the next positional argument.
    pub(crate) fn shift_argument(&mut self) -> Option<String> {
        self.args.pop_front()
    }

    /// Consume every remaining positional argument.
    pub(crate) fn take_arguments(&mut self) -> Vec<String> {
        self.args.drain(..).collect()
    }

    /// Fail when positional arguments remain unconsumed.
    pub(crate) fn validate_arguments(&self) -> CliResult<()> {
        if self.args.is_empty() {
            return Ok(());
        }
        let quoted: Vec<String> = self.args.iter().map(|arg| format!("\"{arg}\"")).collect();
        let message = match quoted.split_last() {
            Some((last, [])) => format!("Invalid argument: {last}"),
            Some((last, rest)) => format!("Invalid arguments: {} and {last}", rest.join(", ")),
            None => String::new(),
        };
        Err(CliError::usage(format!(
            "{message}\nUsage: pebbles {}",
            self.command.banner
        )))
    }

    /// Value of a value-taking option.
    pub(crate) fn option(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(OptionValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Whether an option was given at all.
    pub(crate) fn flag(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }
}

/// Turns a command line into an [`Invocation`] and runs its handler.
#[derive(Debug)]
pub(crate) struct Dispatcher<'a> {
    registry: &'a CommandRegistry,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(registry: &'a CommandRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `name` (one alias hop) and parse `tokens` against the command's
    /// declared options plus the global ones.
    pub(crate) fn prepare(&self, name: &str, tokens: &[String]) -> CliResult<Invocation<'a>> {
        let command = self.registry.resolve(name).ok_or_else(|| {
            CliError::usage(format!(
                "`{name}` is not a pebbles command.\nSee `pebbles help` for a list of available commands."
            ))
        })?;

        let declared: Vec<&OptionDescriptor> = command
            .options
            .iter()
            .chain(GLOBAL_OPTIONS.iter())
            .collect();
        let (args, options) = parse_tokens(&declared, tokens)?;
        Ok(Invocation::new(self.registry, command, args, options))
    }

    pub(crate) fn dispatch(
        &self,
        session: &mut Session,
        name: &str,
        tokens: &[String],
    ) -> CliResult<()> {
        let mut invocation = self.prepare(name, tokens)?;
        if invocation.flag("help") && invocation.command.command != HELP_COMMAND {
            invocation = self.prepare(HELP_COMMAND, &[name.to_string()])?;
        }
        tracing::debug!(
            command = %invocation.command.command,
            group = %invocation.command.group,
            method = %invocation.command.method,
            requested = name,
            "dispatching command"
        );
        (invocation.command.handler)(session, &mut invocation)
    }
}

type Parsed = (Vec<String>, BTreeMap<String, OptionValue>);

/// Split tokens into positionals and declared options. `--` ends option
/// parsing; undeclared dash tokens stay positional.
fn parse_tokens(declared: &[&OptionDescriptor], tokens: &[String]) -> CliResult<Parsed> {
    let find = |spelling: &str| declared.iter().copied().find(|option| option.matches(spelling));
    let mut args = Vec::new();
    let mut options = BTreeMap::new();
    let mut rest = tokens.iter();

    while let Some(token) = rest.next() {
        if token == "--" {
            args.extend(rest.by_ref().cloned());
            break;
        }

        if let Some(long) = token.strip_prefix("--").filter(|long| !long.is_empty()) {
            let (flag, inline) = match long.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (long, None),
            };
            let spelling = format!("--{flag}");
            let Some(option) = find(spelling.as_str()) else {
                args.push(token.clone());
                continue;
            };
            let value = match inline {
                Some(value) => OptionValue::Value(value.to_string()),
                None if option.takes_value => {
                    OptionValue::Value(rest.next().cloned().ok_or_else(|| missing(&spelling))?)
                }
                None => OptionValue::Flag,
            };
            options.insert(option.name.clone(), value);
            continue;
        }

        if let Some(short) = short_spelling(token)
            && let Some(option) = find(short)
        {
            let attached = &token[short.len()..];
            if option.takes_value {
                let value = if attached.is_empty() {
                    rest.next().cloned().ok_or_else(|| missing(short))?
                } else {
                    attached.to_string()
                };
                options.insert(option.name.clone(), OptionValue::Value(value));
                continue;
            }
            if attached.is_empty() {
                options.insert(option.name.clone(), OptionValue::Flag);
                continue;
            }
        }

        args.push(token.clone());
    }

    Ok((args, options))
}

/// `-x` prefix of a single-dash token.
fn short_spelling(token: &str) -> Option<&str> {
    if token.starts_with("--") {
        return None;
    }
    let mut chars = token.char_indices();
    match (chars.next(), chars.next()) {
        (Some((_, '-')), Some((index, letter))) => Some(&token[..index + letter.len_utf8()]),
        _ => None,
    }
}

fn missing(spelling: &str) -> CliError {
    CliError::usage(format!("missing argument: {spelling}"))
}
