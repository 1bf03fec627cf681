use serde_json::{Map, Value};

use super::display_value;
use crate::client::{ApiClient, ApiErrorKind, CliError, CliResult};
use crate::dispatch::Invocation;
use crate::registry::RegistryBuilder;
use crate::session::Session;

const CURRENT_RELEASE: &str = "current";

const CONFIG: &str = "\
# manage app config vars
#
";

const CONFIG_INDEX: &str = "\
# config
#
# display the config vars for an app
#
# -s, --shell  # output config vars in shell format
#
#Examples:
#
# $ pebbles config
# A: one
# B: two
#
# $ pebbles config --shell
# A=one
# B=two
";

const CONFIG_GET: &str = "\
# config:get KEY
#
# display a config value for an app
#
#Examples:
#
# $ pebbles config:get A
# one
";

const CONFIG_SET: &str = "\
# config:set KEY1=VALUE1 [KEY2=VALUE2 ...]
#
# set one or more config vars
#
#Example:
#
# $ pebbles config:set A=one
# Setting config vars and restarting example... done, v123
# A: one
";

const CONFIG_UNSET: &str = "\
# config:unset KEY1 [KEY2 ...]
#
# unset one or more config vars
#
# $ pebbles config:unset A
# Unsetting A and restarting example... done, v123
";

pub(crate) fn register(builder: &mut RegistryBuilder) {
    builder
        .group("Config", CONFIG)
        .command("index", CONFIG_INDEX, index)
        .command("get", CONFIG_GET, get)
        .command("set", CONFIG_SET, set)
        .alias("config:add", "config:set")
        .command("unset", CONFIG_UNSET, unset)
        .alias("config:remove", "config:unset");
}

fn index(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    let app = session.app(invocation)?;
    let api = session.api()?;
    let shell = invocation.flag("shell");
    let vars = if shell {
        api.get_config_vars(&app)?
    } else {
        api.get_symbolic_config_vars(&app)?
    };

    if vars.is_empty() {
        return session.output.display(&format!("{app} has no config vars."));
    }
    if shell {
        for (key, value) in &vars {
            session
                .output
                .display(&format!("{key}={}", display_value(value)))?;
        }
        return Ok(());
    }
    session.output.styled_header(&format!("{app} Config Vars"))?;
    session.output.styled_hash(&pairs(&vars))
}

fn get(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    let Some(key) = invocation.shift_argument() else {
        return Err(CliError::usage(
            "Usage: pebbles config:get KEY\nMust specify KEY.",
        ));
    };
    invocation.validate_arguments()?;
    let app = session.app(invocation)?;
    let vars = session.api()?.get_config_vars(&app)?;
    let value = vars.get(&key).map(display_value).unwrap_or_default();
    session.output.display(&value)
}

fn set(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    let args = invocation.take_arguments();
    let assignments: Option<Vec<(&str, &str)>> =
        args.iter().map(|arg| arg.split_once('=')).collect();
    let Some(assignments) = assignments.filter(|pairs| !pairs.is_empty()) else {
        return Err(CliError::usage(
            "Usage: pebbles config:set KEY1=VALUE1 [KEY2=VALUE2 ...]\nMust specify KEY and VALUE to set.",
        ));
    };
    let mut vars = Map::new();
    for (key, value) in assignments {
        vars.insert(key.to_string(), Value::String(value.to_string()));
    }

    let app = session.app(invocation)?;
    let api = session.api()?;
    session.action(
        &format!("Setting config vars and restarting {app}"),
        |_| {
            api.put_config_vars(&app, &vars)?;
            current_release(&api, &app)
        },
    )?;
    session.output.styled_hash(&pairs(&vars))
}

fn unset(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    let keys = invocation.take_arguments();
    if keys.is_empty() {
        return Err(CliError::usage(
            "Usage: pebbles config:unset KEY1 [KEY2 ...]\nMust specify KEY to unset.",
        ));
    }

    let app = session.app(invocation)?;
    let api = session.api()?;
    for key in &keys {
        session.action(&format!("Unsetting {key} and restarting {app}"), |_| {
            api.delete_config_var(&app, key)?;
            current_release(&api, &app)
        })?;
    }
    Ok(())
}

/// Name of the app's current release. A release lookup the platform refuses
/// is not an error for the change that preceded it.
fn current_release(api: &ApiClient, app: &str) -> CliResult<Option<String>> {
    match api.get_release(app, CURRENT_RELEASE) {
        Ok(release) => Ok(release
            .get("name")
            .filter(|name| !name.is_null())
            .map(display_value)),
        Err(err) if err.api_kind() == Some(ApiErrorKind::RequestFailed) => Ok(None),
        Err(err) => Err(err),
    }
}

fn pairs(vars: &Map<String, Value>) -> Vec<(String, String)> {
    vars.iter()
        .map(|(key, value)| (key.clone(), display_value(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{run, session_for};
    use anyhow::Result;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn index_shows_symbolic_vars() -> Result<()> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/apps/demo/config_vars")
                .query_param("symbolic", "true");
            then.status(200)
                .json_body(json!({"DATABASE_URL": "postgres://db", "A": "one"}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["config", "-a", "demo"])?;
        mock.assert();
        assert_eq!(
            out.contents(),
            "=== demo Config Vars\nA:            one\nDATABASE_URL: postgres://db\n"
        );
        Ok(())
    }

    #[test]
    fn index_shell_prints_assignments() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo/config_vars");
            then.status(200).json_body(json!({"B": "two", "A": "one"}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["config", "--app", "demo", "--shell"])?;
        assert_eq!(out.contents(), "A=one\nB=two\n");
        Ok(())
    }

    #[test]
    fn index_without_vars_says_so() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo/config_vars");
            then.status(200).json_body(json!({}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["config", "--app", "demo"])?;
        assert_eq!(out.contents(), "demo has no config vars.\n");
        Ok(())
    }

    #[test]
    fn get_prints_value_or_blank() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo/config_vars");
            then.status(200).json_body(json!({"A": "one"}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["config:get", "A", "--app", "demo"])?;
        run(&mut session, &["config:get", "MISSING", "--app", "demo"])?;
        assert_eq!(out.contents(), "one\n\n");
        Ok(())
    }

    #[test]
    fn get_requires_a_key() {
        let server = MockServer::start();
        let (mut session, _, _) = session_for(&server, &[]);
        let err = run(&mut session, &["config:get", "--app", "demo"]).expect_err("no key");
        assert_eq!(
            err.display_message(),
            "Usage: pebbles config:get KEY\nMust specify KEY."
        );
    }

    #[test]
    fn set_reports_release_name() -> Result<()> {
        let server = MockServer::start();
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path("/apps/demo/config_vars")
                .json_body(json!({"A": "one", "B": "x=y"}));
            then.status(200).json_body(json!({"A": "one", "B": "x=y"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo/releases/current");
            then.status(200).json_body(json!({"name": "v12"}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["config:add", "A=one", "B=x=y", "--app", "demo"])?;
        put.assert();
        assert_eq!(
            out.contents(),
            "Setting config vars and restarting demo... done, v12\nA: one\nB: x=y\n"
        );
        Ok(())
    }

    #[test]
    fn set_tolerates_refused_release_lookup() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/apps/demo/config_vars");
            then.status(200).json_body(json!({"A": "one"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo/releases/current");
            then.status(422).json_body(json!({"error": "No releases yet."}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["config:set", "A=one", "--app", "demo"])?;
        assert_eq!(
            out.contents(),
            "Setting config vars and restarting demo... done\nA: one\n"
        );
        Ok(())
    }

    #[test]
    fn set_rejects_arguments_without_value() {
        let server = MockServer::start();
        let (mut session, _, _) = session_for(&server, &[]);
        for argv in [
            &["config:set", "--app", "demo"][..],
            &["config:set", "A=one", "B", "--app", "demo"][..],
        ] {
            let err = run(&mut session, argv).expect_err("usage");
            assert!(matches!(err, CliError::Usage(_)));
            assert!(err.display_message().ends_with("Must specify KEY and VALUE to set."));
        }
    }

    #[test]
    fn unset_runs_one_action_per_key() -> Result<()> {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(DELETE).path("/apps/demo/config_vars/A");
            then.status(200);
        });
        let second = server.mock(|when, then| {
            when.method(DELETE).path("/apps/demo/config_vars/B");
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo/releases/current");
            then.status(200).json_body(json!({"name": "v3"}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["config:remove", "A", "B", "--app", "demo"])?;
        first.assert();
        second.assert();
        assert_eq!(
            out.contents(),
            "Unsetting A and restarting demo... done, v3\n\
             Unsetting B and restarting demo... done, v3\n"
        );
        Ok(())
    }

    #[test]
    fn unset_failure_closes_the_action_line() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/apps/demo/config_vars/A");
            then.status(403).json_body(json!({"error": "Access denied."}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        let err = run(&mut session, &["config:unset", "A", "--app", "demo"]).expect_err("denied");
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Forbidden));
        assert_eq!(out.contents(), "Unsetting A and restarting demo... failed\n");
    }
}
