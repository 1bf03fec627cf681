//! Namespace, command and alias tables.
//!
//! # Design
//! - Commands are declared statically by each command module through
//!   [`RegistryBuilder`]; nothing is discovered at runtime.
//! - The build runs in two phases: every canonical command is registered first,
//!   then aliases are resolved, so declaration order never matters.
//! - The built [`CommandRegistry`] is immutable for the rest of the process.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::client::CliResult;
use crate::dispatch::Invocation;
use crate::help::{HelpText, OptionDescriptor};
use crate::session::Session;

/// Signature shared by every command handler.
pub(crate) type Handler = fn(&mut Session, &mut Invocation<'_>) -> CliResult<()>;

/// Handler name that maps to the bare namespace command.
const DEFAULT_ACTION: &str = "index";

/// Errors raised while assembling the command table.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RegistryError {
    /// Two handlers resolved to the same canonical name.
    #[error("duplicate command: {command}")]
    DuplicateCommand {
        /// Canonical name registered twice.
        command: String,
    },
    /// An alias pointed at a command that was never registered.
    #[error("no such command: {target} (alias {alias})")]
    UnknownAliasTarget {
        /// Alternate spelling being registered.
        alias: String,
        /// Canonical name the alias should redirect to.
        target: String,
    },
    /// An alias reused the name of a canonical command.
    #[error("alias {alias} shadows a command of the same name")]
    AliasShadowsCommand {
        /// Alternate spelling being registered.
        alias: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NamespaceDescriptor {
    pub(crate) name: String,
    pub(crate) description: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CommandDescriptor {
    /// Declared identity of the owning command group, e.g. `Apps`.
    pub(crate) group: String,
    /// Handler identity within the group, e.g. `index` or `info`.
    pub(crate) method: String,
    pub(crate) namespace: String,
    /// Canonical name: `namespace:method`, or the namespace for `index`.
    pub(crate) command: String,
    pub(crate) banner: String,
    pub(crate) help: String,
    pub(crate) summary: String,
    pub(crate) description: String,
    pub(crate) options: Vec<OptionDescriptor>,
    pub(crate) handler: Handler,
}

/// Immutable command table consulted by the dispatcher and the help command.
#[derive(Debug, Default)]
pub(crate) struct CommandRegistry {
    namespaces: BTreeMap<String, NamespaceDescriptor>,
    commands: BTreeMap<String, CommandDescriptor>,
    aliases: BTreeMap<String, String>,
}

impl CommandRegistry {
    /// Replace `name` with its alias target, if it is an alias. Exactly one hop.
    pub(crate) fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    /// Look up a command by canonical name or alias.
    pub(crate) fn resolve(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(self.resolve_alias(name))
    }

    pub(crate) fn command(&self, canonical: &str) -> Option<&CommandDescriptor> {
        self.commands.get(canonical)
    }

    pub(crate) fn alias_target(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub(crate) fn namespaces(&self) -> impl Iterator<Item = &NamespaceDescriptor> {
        self.namespaces.values()
    }

    /// Commands in `name` other than the namespace's own default command.
    pub(crate) fn commands_for_namespace(&self, name: &str) -> Vec<&CommandDescriptor> {
        self.commands
            .values()
            .filter(|command| command.namespace == name && command.command != name)
            .collect()
    }
}

/// Collects declarations before the two-phase build.
#[derive(Debug, Default)]
pub(crate) struct RegistryBuilder {
    namespaces: Vec<NamespaceDescriptor>,
    commands: Vec<CommandDescriptor>,
    aliases: Vec<(String, String)>,
}

impl RegistryBuilder {
    /// Begin declaring a command group. The namespace is the lowercased identity;
    /// its description comes from the first registration of that namespace.
    pub(crate) fn group(&mut self, identity: &str, help: &str) -> GroupBuilder<'_> {
        let namespace = identity.to_lowercase();
        if !self.namespaces.iter().any(|ns| ns.name == namespace) {
            let description = HelpText::extract(help).banner().unwrap_or_default();
            self.namespaces.push(NamespaceDescriptor {
                name: namespace.clone(),
                description,
            });
        }
        GroupBuilder {
            builder: self,
            identity: identity.to_string(),
            namespace,
        }
    }

    /// Queue an alias. Targets must be canonical commands and alias names must
    /// not be; both are checked in [`RegistryBuilder::build`].
    pub(crate) fn alias_command(&mut self, alias: &str, target: &str) {
        self.aliases.push((alias.to_string(), target.to_string()));
    }

    pub(crate) fn build(self) -> Result<CommandRegistry, RegistryError> {
        let mut registry = CommandRegistry::default();
        for namespace in self.namespaces {
            registry
                .namespaces
                .entry(namespace.name.clone())
                .or_insert(namespace);
        }

        for command in self.commands {
            if registry.commands.contains_key(&command.command) {
                return Err(RegistryError::DuplicateCommand {
                    command: command.command,
                });
            }
            registry.commands.insert(command.command.clone(), command);
        }

        for (alias, target) in self.aliases {
            if !registry.commands.contains_key(&target) {
                return Err(RegistryError::UnknownAliasTarget { alias, target });
            }
            if registry.commands.contains_key(&alias) {
                return Err(RegistryError::AliasShadowsCommand { alias });
            }
            registry.aliases.insert(alias, target);
        }

        tracing::debug!(
            namespaces = registry.namespaces.len(),
            commands = registry.commands.len(),
            aliases = registry.aliases.len(),
            "command registry built"
        );
        Ok(registry)
    }
}

pub(crate) struct GroupBuilder<'a> {
    builder: &'a mut RegistryBuilder,
    identity: String,
    namespace: String,
}

impl GroupBuilder<'_> {
    /// Register a handler. Handlers with `_` in their name also answer to the
    /// hyphenated spelling.
    pub(crate) fn command(&mut self, method: &str, help: &str, handler: Handler) -> &mut Self {
        let text = HelpText::extract(help);
        let command = if method == DEFAULT_ACTION {
            self.namespace.clone()
        } else {
            format!("{}:{method}", self.namespace)
        };

        if command.contains('_') {
            self.builder
                .alias_command(&command.replace('_', "-"), &command);
        }

        self.builder.commands.push(CommandDescriptor {
            group: self.identity.clone(),
            method: method.to_string(),
            namespace: self.namespace.clone(),
            banner: text.banner().unwrap_or_else(|| command.clone()),
            help: text.raw(),
            summary: text.summary(),
            description: text.description(),
            options: text.options(),
            command,
            handler,
        });
        self
    }

    pub(crate) fn alias(&mut self, alias: &str, target: &str) -> &mut Self {
        self.builder.alias_command(alias, target);
        self
    }
}
