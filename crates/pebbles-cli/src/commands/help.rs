use crate::client::{CliError, CliResult};
use crate::dispatch::{HELP_COMMAND, Invocation};
use crate::registry::{CommandDescriptor, CommandRegistry, NamespaceDescriptor, RegistryBuilder};
use crate::session::Session;

/// Namespaces listed first in the root help, when registered.
const PRIMARY_NAMESPACES: [&str; 10] = [
    "auth", "apps", "ps", "run", "addons", "config", "releases", "domains", "logs", "sharing",
];

/// Namespaces registered for internal use only.
const EXCLUDED_NAMESPACES: [&str; 1] = ["app"];

const HELP: &str = "\
# list commands and display help
#
";

const HELP_INDEX: &str = "\
# help [COMMAND]
#
# list available commands or display help for a specific command
#
#Examples:
#
# $ pebbles help
# Usage: pebbles COMMAND [--app APP] [command-specific-options]
#
# $ pebbles help apps
# Usage: pebbles apps
";

pub(crate) fn register(builder: &mut RegistryBuilder) {
    builder
        .group("Help", HELP)
        .command("index", HELP_INDEX, index)
        .alias("-h", HELP_COMMAND)
        .alias("--help", HELP_COMMAND);
}

fn index(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    match invocation.shift_argument() {
        Some(command) => help_for_command(session, invocation.registry, &command),
        None => help_for_root(session, invocation.registry),
    }
}

fn help_for_root(session: &mut Session, registry: &CommandRegistry) -> CliResult<()> {
    let (primary, additional): (Vec<&NamespaceDescriptor>, Vec<&NamespaceDescriptor>) = registry
        .namespaces()
        .filter(|namespace| !EXCLUDED_NAMESPACES.contains(&namespace.name.as_str()))
        .partition(|namespace| PRIMARY_NAMESPACES.contains(&namespace.name.as_str()));

    let output = &mut session.output;
    output.display("Usage: pebbles COMMAND [--app APP] [command-specific-options]")?;
    output.display("")?;
    output.display("Primary help topics, type \"pebbles help TOPIC\" for more details:")?;
    output.display("")?;
    for line in summary_for_namespaces(&primary) {
        output.display(&line)?;
    }
    output.display("")?;
    output.display("Additional topics:")?;
    output.display("")?;
    for line in summary_for_namespaces(&additional) {
        output.display(&line)?;
    }
    output.display("")
}

/// Usage and help body for one command, followed by the rest of its namespace.
/// An alias is reported and followed one hop.
pub(crate) fn help_for_command(
    session: &mut Session,
    registry: &CommandRegistry,
    name: &str,
) -> CliResult<()> {
    let output = &mut session.output;
    let mut name = name;
    if let Some(target) = registry.alias_target(name) {
        output.display(&format!("Alias: {name} redirects to {target}"))?;
        name = target;
    }

    let command = registry.command(name);
    if let Some(command) = command {
        output.display(&format!("Usage: pebbles {}", command.banner))?;
        if !command.help.trim().is_empty() {
            let body: Vec<&str> = command
                .help
                .split('\n')
                .filter(|line| !line.contains("HIDDEN"))
                .skip(1)
                .collect();
            output.display(&body.join("\n"))?;
        }
        output.display("")?;
    }

    let namespace_commands: Vec<&CommandDescriptor> = registry
        .commands_for_namespace(name)
        .into_iter()
        .filter(|command| !command.help.contains("DEPRECATED"))
        .collect();
    if namespace_commands.is_empty() {
        if command.is_none() {
            return Err(CliError::usage(format!(
                "{name} is not a pebbles command. See `pebbles help`."
            )));
        }
        return Ok(());
    }

    output.display("Additional commands, type \"pebbles help COMMAND\" for more details:")?;
    output.display("")?;
    for line in summary_for_commands(&namespace_commands) {
        output.display(&line)?;
    }
    output.display("")
}

fn summary_for_namespaces(namespaces: &[&NamespaceDescriptor]) -> Vec<String> {
    let size = namespaces
        .iter()
        .map(|namespace| namespace.name.len())
        .max()
        .unwrap_or(0);
    let mut sorted = namespaces.to_vec();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
        .into_iter()
        .filter(|namespace| !skip_namespace(namespace))
        .map(|namespace| format!("  {:<size$}  # {}", namespace.name, namespace.description))
        .collect()
}

fn summary_for_commands(commands: &[&CommandDescriptor]) -> Vec<String> {
    let size = commands
        .iter()
        .map(|command| command.banner.len())
        .max()
        .unwrap_or(0);
    let mut sorted = commands.to_vec();
    sorted.sort_by(|a, b| a.banner.cmp(&b.banner));
    sorted
        .into_iter()
        .filter(|command| !skip_command(command))
        .map(|command| format!("  {:<size$}  # {}", command.banner, command_summary(command)))
        .collect()
}

/// The declared summary, or the first description line after the banner for
/// help blocks too short to carry one.
fn command_summary(command: &CommandDescriptor) -> &str {
    if !command.summary.is_empty() {
        return &command.summary;
    }
    command
        .description
        .split('\n')
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
}

fn skip_namespace(namespace: &NamespaceDescriptor) -> bool {
    namespace.description.contains("DEPRECATED:") || namespace.description.contains("HIDDEN:")
}

fn skip_command(command: &CommandDescriptor) -> bool {
    command.help.contains("DEPRECATED:")
        || command
            .help
            .split('\n')
            .any(|line| line.starts_with(" HIDDEN:"))
}
