use super::help::help_for_command;
use crate::client::CliResult;
use crate::dispatch::Invocation;
use crate::registry::RegistryBuilder;
use crate::session::Session;

const AUTH: &str = "\
# authentication (login, logout)
#
";

const AUTH_INDEX: &str = "\
# auth
#
# Authenticate, display token and current user
";

const AUTH_LOGIN: &str = "\
# auth:login
#
# log in with your Pebblescape credentials
#
#Example:
#
# $ pebbles auth:login
# Enter your Pebblescape credentials.
# Email: email@example.com
# Password (typing will be hidden):
# Authentication successful.
";

const AUTH_LOGOUT: &str = "\
# auth:logout
#
# clear local authentication credentials
#
#Example:
#
# $ pebbles auth:logout
# Local credentials cleared.
";

const AUTH_TOKEN: &str = "\
# auth:token
#
# display your api token
#
#Example:
#
# $ pebbles auth:token
# ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789ABCD
";

const AUTH_WHOAMI: &str = "\
# auth:whoami
#
# display your Pebblescape email address
#
#Example:
#
# $ pebbles auth:whoami
# email@example.com
";

pub(crate) fn register(builder: &mut RegistryBuilder) {
    builder
        .group("Auth", AUTH)
        .command("index", AUTH_INDEX, index)
        .command("login", AUTH_LOGIN, login)
        .alias("login", "auth:login")
        .command("logout", AUTH_LOGOUT, logout)
        .alias("logout", "auth:logout")
        .command("token", AUTH_TOKEN, token)
        .command("whoami", AUTH_WHOAMI, whoami);
}

fn index(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    help_for_command(session, invocation.registry, &invocation.command.command)
}

fn login(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    session.auth.login(session.prompt.as_mut())?;
    session.output.display("Authentication successful.")
}

fn logout(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    session.auth.logout();
    session.output.display("Local credentials cleared.")
}

fn token(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    let api_key = session.auth.api_key(session.prompt.as_mut())?;
    session.output.display(&api_key)
}

fn whoami(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    let user = session.auth.user(session.prompt.as_mut())?;
    session.output.display(&user)
}

#[cfg(test)]
mod tests {
    use crate::auth::Credential;
    use crate::client::CliError;
    use crate::commands::tests::{run, session_with_store};
    use crate::config::Settings;
    use crate::netrc::CredentialStore;
    use crate::session::tests::session_with;
    use anyhow::Result;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn stored(settings: &Settings, dir: &TempDir) -> Result<CredentialStore> {
        let store = CredentialStore::new(dir.path().join(".netrc"));
        store.save(
            &settings.machine_names(),
            &Credential {
                user: "user@example.test".into(),
                api_key: "stored-key".into(),
            },
        )?;
        Ok(store)
    }

    #[test]
    fn whoami_and_token_read_the_store() -> Result<()> {
        let dir = TempDir::new()?;
        let settings = Settings::for_host("example.test");
        let store = stored(&settings, &dir)?;
        let (mut session, out, _) = session_with_store(settings, store);
        run(&mut session, &["auth:whoami"])?;
        run(&mut session, &["auth:token"])?;
        assert_eq!(out.contents(), "user@example.test\nstored-key\n");
        Ok(())
    }

    #[test]
    fn logout_clears_the_store() -> Result<()> {
        let dir = TempDir::new()?;
        let settings = Settings::for_host("example.test");
        let store = stored(&settings, &dir)?;
        let path = store.path().to_path_buf();
        let (mut session, out, _) = session_with_store(settings.clone(), store);
        run(&mut session, &["logout"])?;
        assert_eq!(out.contents(), "Local credentials cleared.\n");
        let remaining = CredentialStore::new(path).load(&settings.api_machine())?;
        assert!(remaining.is_none());
        Ok(())
    }

    #[test]
    fn login_prompts_and_saves() -> Result<()> {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST)
                .path("/login")
                .query_param("username", "user@example.test")
                .query_param("password", "hunter2");
            then.status(200).json_body(json!({"api_key": "fresh-key"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/user").query_param("api_key", "fresh-key");
            then.status(200).json_body(json!({"email": "user@example.test"}));
        });
        let dir = TempDir::new()?;
        let settings = Settings::for_host(&server.base_url());
        let store = CredentialStore::new(dir.path().join(".netrc"));
        let (mut session, out, _) = session_with(
            settings.clone(),
            Some(store),
            &["user@example.test", "hunter2"],
        );
        run(&mut session, &["login"])?;
        login.assert();
        assert_eq!(out.contents(), "Authentication successful.\n");

        let saved = CredentialStore::new(dir.path().join(".netrc")).load(&settings.api_machine())?;
        assert_eq!(saved.map(|credential| credential.api_key).as_deref(), Some("fresh-key"));
        Ok(())
    }

    #[test]
    fn auth_index_shows_namespace_help() -> Result<()> {
        let (mut session, out, _) = session_with(Settings::for_host("example.test"), None, &[]);
        run(&mut session, &["auth"])?;
        let contents = out.contents();
        assert!(contents.starts_with("Usage: pebbles auth\n"));
        assert!(contents.contains("  auth:login   # log in with your Pebblescape credentials"));
        Ok(())
    }

    #[test]
    fn auth_commands_reject_extra_arguments() {
        let (mut session, _, _) = session_with(Settings::for_host("example.test"), None, &[]);
        let err = run(&mut session, &["logout", "now"]).expect_err("extra");
        assert!(matches!(err, CliError::Usage(_)));
    }
}
