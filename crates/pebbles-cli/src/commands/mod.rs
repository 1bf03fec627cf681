//! Command handlers grouped by namespace, and the registry that wires them up.

pub(crate) mod apps;
pub(crate) mod auth;
pub(crate) mod config;
pub(crate) mod help;

use serde_json::Value;

use crate::registry::{CommandRegistry, RegistryBuilder, RegistryError};

/// Every command the client ships with.
pub(crate) fn registry() -> Result<CommandRegistry, RegistryError> {
    let mut builder = RegistryBuilder::default();
    apps::register(&mut builder);
    auth::register(&mut builder);
    config::register(&mut builder);
    help::register(&mut builder);
    builder.build()
}

/// Render a JSON scalar the way it is shown to users: strings unquoted, null empty.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
