//! Environment overrides and the resolved per-process settings.

use clap::Parser;
use url::Url;

use crate::client::{CliError, CliResult};

pub(crate) const DEFAULT_HOST: &str = "pebblesinspace.com";
pub(crate) const SSL_VERIFY_DISABLE: &str = "disable";

/// Subdomains that receive a credential entry for the configured host.
pub(crate) const SUBDOMAINS: [&str; 2] = ["api", "git"];

/// Raw invocation. Every override is a hidden flag bound to its environment
/// variable; the command and its arguments are captured verbatim for the
/// dispatcher.
#[derive(Parser, Debug)]
#[command(
    name = "pebbles",
    about = "Pebblescape command-line client",
    disable_help_flag = true,
    disable_version_flag = true,
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[arg(long, env = "PEBBLES_API_KEY", hide = true, hide_env_values = true)]
    pub(crate) api_key: Option<String>,
    #[arg(long, env = "PEBBLES_HOST", hide = true)]
    pub(crate) host: Option<String>,
    #[arg(long, env = "PEBBLES_GIT_HOST", hide = true)]
    pub(crate) git_host: Option<String>,
    #[arg(long, env = "PEBBLES_HTTP_GIT_HOST", hide = true)]
    pub(crate) http_git_host: Option<String>,
    #[arg(long, env = "PEBBLES_DEBUG", hide = true)]
    pub(crate) debug: Option<String>,
    #[arg(long, env = "PEBBLES_SSL_VERIFY", hide = true)]
    pub(crate) ssl_verify: Option<String>,
    #[arg(long = "default-app", env = "PEBBLES_APP", hide = true)]
    pub(crate) default_app: Option<String>,
    #[arg(long = "log-format", env = "PEBBLES_LOG_FORMAT", hide = true)]
    pub(crate) log_format: Option<String>,
    /// Command name followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) argv: Vec<String>,
}

/// Settings resolved once at startup and shared by every component.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) host: String,
    pub(crate) git_host: Option<String>,
    pub(crate) http_git_host: Option<String>,
    pub(crate) api_key: Option<String>,
    pub(crate) debug: bool,
    pub(crate) ssl_verify_disabled: bool,
    pub(crate) default_app: Option<String>,
    pub(crate) request_id: String,
}

impl Settings {
    pub(crate) fn from_cli(cli: &Cli, request_id: &str) -> Self {
        Self {
            host: non_empty(cli.host.as_deref()).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            git_host: non_empty(cli.git_host.as_deref()),
            http_git_host: non_empty(cli.http_git_host.as_deref()),
            api_key: non_empty(cli.api_key.as_deref()),
            debug: cli.debug.is_some(),
            ssl_verify_disabled: cli.ssl_verify.as_deref() == Some(SSL_VERIFY_DISABLE),
            default_app: non_empty(cli.default_app.as_deref()),
            request_id: request_id.to_string(),
        }
    }

    pub(crate) fn is_default_host(&self) -> bool {
        self.host == DEFAULT_HOST
    }

    /// A host starting with `http` is used verbatim; otherwise the API lives on
    /// the `api.` subdomain.
    pub(crate) fn full_host(&self) -> String {
        if self.host.starts_with("http") {
            self.host.clone()
        } else {
            let scheme = if self.debug { "http" } else { "https" };
            format!("{scheme}://api.{}", self.host)
        }
    }

    pub(crate) fn api_url(&self) -> CliResult<Url> {
        let full = self.full_host();
        Url::parse(&full)
            .map_err(|err| CliError::failure(anyhow::anyhow!("invalid API host '{full}': {err}")))
    }

    /// Last two labels of the API host, or the host itself when it has one label.
    pub(crate) fn base_host(&self) -> Option<String> {
        let url = self.api_url().ok()?;
        let host = url.host_str()?;
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() == 1 {
            return Some(host.to_string());
        }
        Some(labels[labels.len() - 2..].join("."))
    }

    /// Peer verification is only enforced against the production domain.
    pub(crate) fn verify_ssl(&self) -> bool {
        !self.ssl_verify_disabled && self.base_host().as_deref() == Some(DEFAULT_HOST)
    }

    pub(crate) fn machine_names(&self) -> Vec<String> {
        SUBDOMAINS
            .iter()
            .map(|sub| format!("{sub}.{}", self.host))
            .collect()
    }

    pub(crate) fn api_machine(&self) -> String {
        format!("api.{}", self.host)
    }

    pub(crate) fn git_host(&self) -> &str {
        self.git_host.as_deref().unwrap_or(&self.host)
    }

    pub(crate) fn http_git_host(&self) -> String {
        self.http_git_host
            .clone()
            .unwrap_or_else(|| format!("git.{}", self.host))
    }
}

pub(crate) fn user_agent() -> String {
    format!(
        "pebbles-cli/{} ({}-{}) rust",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
