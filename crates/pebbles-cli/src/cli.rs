use std::env;
use std::error::Error as _;

use clap::Parser;
use pebbles_telemetry::{LogFormat, LoggingConfig, init_logging};
use uuid::Uuid;

use crate::client::CliError;
use crate::commands;
use crate::config::{Cli, Settings, user_agent};
use crate::dispatch::{Dispatcher, HELP_COMMAND};
use crate::netrc::CredentialStore;
use crate::output::Output;
use crate::prompt::{TerminalPrompt, install_interrupt_handler};
use crate::registry::CommandRegistry;
use crate::session::Session;

const INTERNAL_ERROR: &str = "Pebblescape client internal error.";
const CANCELLED: &str = "Command cancelled.";

/// Parses the environment and command line, runs one command, and returns the
/// process exit code.
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let trace_id = Uuid::new_v4().to_string();
    let settings = Settings::from_cli(&cli, &trace_id);
    let log_format = cli
        .log_format
        .as_deref()
        .map_or(LogFormat::Compact, LogFormat::from_name);
    let logging = LoggingConfig::for_cli(settings.debug, &trace_id).with_format(log_format);
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: logging unavailable: {err:#}");
    }
    install_interrupt_handler();

    let registry = match commands::registry() {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!(" !    {err}");
            return 1;
        }
    };
    let store = CredentialStore::default_path().map(CredentialStore::new);
    let mut session = Session::new(settings, store, Box::new(TerminalPrompt), Output::stdio());
    execute(&mut session, &registry, &cli.argv)
}

/// Run `argv` (command name first, `help` when absent) and render any failure.
pub(crate) fn execute(session: &mut Session, registry: &CommandRegistry, argv: &[String]) -> i32 {
    let (name, tokens) = match argv.split_first() {
        Some((name, tokens)) if !name.trim().is_empty() => (name.trim(), tokens),
        _ => (HELP_COMMAND, argv.get(1..).unwrap_or_default()),
    };

    let result = Dispatcher::new(registry).dispatch(session, name, tokens);
    if let Err(err) = session.display_warnings() {
        tracing::debug!(error = %err, "failed to print warnings");
    }

    let Err(err) = result else {
        return 0;
    };
    tracing::debug!(command = name, error = %err, "command failed");
    let exit_code = err.exit_code();
    if let Err(output_err) = report(session, &err, argv) {
        tracing::debug!(error = %output_err, "failed to report error");
    }
    exit_code
}

fn report(session: &mut Session, err: &CliError, argv: &[String]) -> Result<(), CliError> {
    session.output.fail_action()?;
    match err {
        CliError::Usage(message) | CliError::Aborted(message) => session.output.error(message),
        CliError::Interrupted(message) => {
            if message.is_empty() {
                session.output.error(CANCELLED)
            } else {
                session.output.error(message)
            }
        }
        CliError::AuthenticationFailed => Ok(()),
        CliError::Api(_) | CliError::Failure(_) => {
            if session.settings.debug {
                session.output.warn(&error_chain(err))
            } else {
                session
                    .output
                    .warn(&format_error(err, argv, &session.settings))
            }
        }
    }
}

/// The failure and every source beneath it, one per line.
fn error_chain(err: &CliError) -> String {
    let mut lines = vec![format!("error: {err}")];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines.join("\n")
}

/// Bang-prefixed internal-error report with enough context for a bug report.
fn format_error(err: &CliError, argv: &[String], settings: &Settings) -> String {
    let (kind, request_id) = match err {
        CliError::Api(error) => (
            error.kind.to_string(),
            error.request_id().unwrap_or(&settings.request_id),
        ),
        _ => ("Failure".to_string(), settings.request_id.as_str()),
    };
    let command = argv
        .iter()
        .map(|arg| {
            if arg.contains(' ') {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut lines = vec![
        format!(" !    {INTERNAL_ERROR}"),
        String::new(),
        format!("    Error:       {} ({kind})", err.display_message()),
        format!("    Command:     pebbles {command}"),
        format!("    Request ID:  {request_id}"),
    ];
    if !settings.is_default_host() {
        lines.push(format!("    Host:        {}", settings.host));
    }
    if let Some(proxy) = proxy_from_env(&["http_proxy", "HTTP_PROXY"]) {
        lines.push(format!("    HTTP Proxy:  {proxy}"));
    }
    if let Some(proxy) = proxy_from_env(&["https_proxy", "HTTPS_PROXY"]) {
        lines.push(format!("    HTTPS Proxy: {proxy}"));
    }
    lines.push(format!("    Version:     {}", user_agent()));
    lines.push(String::new());
    lines.join("\n")
}

fn proxy_from_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::session_for;
    use crate::session::tests::session_with;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use serde_json::json;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| (*arg).to_string()).collect()
    }

    fn registry() -> CommandRegistry {
        commands::registry().expect("registry builds")
    }

    #[test]
    fn missing_command_shows_root_help() {
        let (mut session, out, _) = session_with(Settings::for_host("example.test"), None, &[]);
        assert_eq!(execute(&mut session, &registry(), &[]), 0);
        assert!(out.contents().starts_with("Usage: pebbles COMMAND"));
    }

    #[test]
    fn usage_errors_are_bang_prefixed() {
        let (mut session, out, err) = session_with(Settings::for_host("example.test"), None, &[]);
        let code = execute(&mut session, &registry(), &argv(&["apps:bogus"]));
        assert_eq!(code, 1);
        assert!(out.contents().is_empty());
        assert_eq!(
            err.contents(),
            " !    `apps:bogus` is not a pebbles command.\n !    See `pebbles help` for a list of available commands.\n"
        );
    }

    #[test]
    fn command_name_is_trimmed() {
        let (mut session, out, _) = session_with(Settings::for_host("example.test"), None, &[]);
        assert_eq!(execute(&mut session, &registry(), &argv(&[" help "])), 0);
        assert!(out.contents().starts_with("Usage: pebbles COMMAND"));
    }

    #[test]
    fn api_failures_render_the_internal_error_report() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps");
            then.status(503).json_body(json!({"error": "Down for maintenance."}));
        });
        let (mut session, _, err) = session_for(&server, &[]);
        let code = execute(&mut session, &registry(), &argv(&["apps", "--app", "my app"]));
        assert_eq!(code, 1);
        let report = err.contents();
        assert!(report.starts_with(" !    Pebblescape client internal error.\n\n"));
        assert!(report.contains("    Error:       Down for maintenance. (RequestFailed)\n"));
        assert!(report.contains("    Command:     pebbles apps --app \"my app\"\n"));
        assert!(report.contains("    Request ID:  test-request\n"));
        assert!(report.contains(&format!("    Host:        {}\n", server.base_url())));
        assert!(report.contains("    Version:     pebbles-cli/"));
    }

    #[test]
    fn failed_action_line_is_closed_before_reporting() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo");
            then.status(200).json_body(json!({"name": "demo"}));
        });
        server.mock(|when, then| {
            when.method(DELETE).path("/apps/demo");
            then.status(423).json_body(json!({"error": "App is locked."}));
        });
        let (mut session, out, err) = session_for(&server, &[]);
        let code = execute(
            &mut session,
            &registry(),
            &argv(&["destroy", "demo", "--confirm", "demo"]),
        );
        assert_eq!(code, 1);
        assert_eq!(
            out.contents(),
            "Destroying demo (including all add-ons)... failed\n"
        );
        assert!(err.contents().contains("App is locked. (Locked)"));
    }

    #[test]
    fn warnings_print_even_when_the_command_succeeds() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps");
            then.status(200)
                .header("X-Pebbles-Warning", "scheduled maintenance")
                .json_body(json!([]));
        });
        let (mut session, out, err) = session_for(&server, &[]);
        assert_eq!(execute(&mut session, &registry(), &argv(&["apps"])), 0);
        assert_eq!(out.contents(), "You have no apps.\n");
        assert_eq!(err.contents(), "WARNING: scheduled maintenance\n");
    }
}
