use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde_json::{Map, Value};

use super::display_value;
use crate::client::{CliError, CliResult};
use crate::dispatch::Invocation;
use crate::output::format_bytes;
use crate::registry::RegistryBuilder;
use crate::session::Session;

const CREATE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_COMPLETE: &str = "complete";

const APPS: &str = "\
# manage apps (create, destroy)
#
";

const APPS_INDEX: &str = "\
# apps
#
# list your apps
#
#Example:
#
# $ pebbles apps
# === My Apps
# example
# example2
";

const APPS_INFO: &str = "\
# apps:info
#
# show detailed app information
#
# -s, --shell  # output more shell friendly key/value pairs
#     --ssh-git  # use SSH git protocol for the git url
#
#Examples:
#
# $ pebbles apps:info
# === example
# Git URL:   https://git.pebblesinspace.com/example.git
# Repo Size: 5M
";

const APPS_CREATE: &str = "\
# apps:create [NAME]
#
# create a new app
#
# -b, --buildpack BUILDPACK  # a buildpack url to use for this app
# -t, --timeout TIMEOUT      # seconds to wait for the app to be ready, 0 waits forever
#     --ssh-git              # use SSH git protocol
#
#Examples:
#
# $ pebbles apps:create example
# Creating example... done
# http://example.pebblesinspace.com/ | https://git.pebblesinspace.com/example.git
";

const APPS_DESTROY: &str = "\
# apps:destroy --app APP
#
# permanently destroy an app
#
#Example:
#
# $ pebbles apps:destroy -a example --confirm example
# Destroying example (including all add-ons)... done
";

pub(crate) fn register(builder: &mut RegistryBuilder) {
    builder
        .group("Apps", APPS)
        .command("index", APPS_INDEX, index)
        .alias("list", "apps")
        .command("info", APPS_INFO, info)
        .alias("info", "apps:info")
        .command("create", APPS_CREATE, create)
        .alias("create", "apps:create")
        .command("destroy", APPS_DESTROY, destroy)
        .alias("destroy", "apps:destroy")
        .alias("apps:delete", "apps:destroy");
}

fn index(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    let apps = session.api()?.get_apps()?;
    if apps.is_empty() {
        return session.output.display("You have no apps.");
    }
    let names: Vec<String> = apps.iter().map(|app| display_value(&app["name"])).collect();
    session.output.styled_header("My Apps")?;
    session.output.styled_array(&names)
}

fn info(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    invocation.validate_arguments()?;
    let app = session.app(invocation)?;
    let data = match session.api()?.get_app(&app)? {
        Value::Object(data) => data,
        other => {
            return Err(CliError::failure(anyhow!(
                "unexpected app record: {other}"
            )));
        }
    };
    let name = data.get("name").map_or_else(|| app.clone(), display_value);

    if invocation.flag("shell") {
        for line in shell_lines(data, session.git_url(invocation, &name)?) {
            session.output.display(&line)?;
        }
        return Ok(());
    }

    let mut pairs = Vec::new();
    if let Some(status) = data.get("create_status").filter(|status| !status.is_null())
        && status != STATUS_COMPLETE
    {
        pairs.push(("Create Status".to_string(), display_value(status)));
    }
    pairs.push(("Git URL".to_string(), session.git_url(invocation, &name)?));
    if let Some(owner) = data.get("owner").filter(|owner| owner.is_object()) {
        pairs.push(("Owner Email".to_string(), display_value(&owner["email"])));
        pairs.push(("Owner".to_string(), display_value(&owner["name"])));
    }
    for (field, label) in [("repo_size", "Repo Size"), ("build_size", "Build Size")] {
        if let Some(size) = data.get(field).and_then(Value::as_u64) {
            pairs.push((label.to_string(), format_bytes(size)));
        }
    }
    pairs.push((
        "Web URL".to_string(),
        data.get("web_url").map(display_value).unwrap_or_default(),
    ));

    session.output.styled_header(&name)?;
    session.output.styled_hash(&pairs)
}

/// `key=value` lines, sorted, with `owner` flattened to `owner_<field>`
/// (minus its id) and the domain reduced to its name.
fn shell_lines(mut data: Map<String, Value>, git_url: String) -> Vec<String> {
    data.insert("git_url".into(), Value::String(git_url));
    if let Some(domain) = data.get("domain_name").and_then(|domain| domain.get("domain")) {
        let domain = domain.clone();
        data.insert("domain_name".into(), domain);
    }
    if let Some(Value::Object(mut owner)) = data.remove("owner") {
        owner.remove("id");
        for (key, value) in owner {
            data.insert(format!("owner_{key}"), value);
        }
    }

    let mut lines: Vec<String> = data
        .iter()
        .map(|(key, value)| format!("{key}={}", display_value(value)))
        .collect();
    lines.sort();
    lines
}

fn create(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    let name = invocation
        .shift_argument()
        .or_else(|| invocation.option("app").map(str::to_string))
        .or_else(|| session.settings.default_app.clone())
        .filter(|name| !name.trim().is_empty());
    invocation.validate_arguments()?;
    let budget = timeout_budget(invocation.option("timeout"))?;

    let api = session.api()?;
    let params: Vec<(&str, &str)> = name.iter().map(|name| ("name", name.as_str())).collect();
    let created = api.post_app(&params)?;
    let app = created
        .get("name")
        .map(display_value)
        .or(name)
        .unwrap_or_default();

    session.output.begin_action(&format!("Creating {app}"))?;
    let ready = if created["create_status"] == "creating" {
        poll_until(CREATE_POLL_INTERVAL, budget, || {
            Ok(api.get_app(&app)?["create_status"] == STATUS_COMPLETE)
        })?
    } else {
        true
    };
    if !ready {
        tracing::debug!(app = %app, "gave up waiting for app creation");
        return session
            .output
            .display("Timed Out! Run `pebbles status` to check for known platform issues.");
    }
    session.output.finish_action(None)?;

    if let Some(buildpack) = invocation.option("buildpack") {
        let mut vars = Map::new();
        vars.insert("BUILDPACK_URL".into(), Value::String(buildpack.to_string()));
        api.put_config_vars(&app, &vars)?;
        session.output.display(&format!("BUILDPACK_URL={buildpack}"))?;
    }

    let web_url = created.get("web_url").map(display_value).unwrap_or_default();
    let git_url = session.git_url(invocation, &app)?;
    session.output.display(&format!("{web_url} | {git_url}"))
}

/// `--timeout` in seconds; absent or zero means wait without limit.
fn timeout_budget(raw: Option<&str>) -> CliResult<Option<Duration>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let seconds: u64 = raw
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("Invalid timeout: {raw}")))?;
    Ok((seconds > 0).then(|| Duration::from_secs(seconds)))
}

/// Call `ready` every `interval` until it reports true or `budget` runs out.
/// Returns whether the condition was met.
pub(crate) fn poll_until<F>(
    interval: Duration,
    budget: Option<Duration>,
    mut ready: F,
) -> CliResult<bool>
where
    F: FnMut() -> CliResult<bool>,
{
    let started = Instant::now();
    loop {
        if ready()? {
            return Ok(true);
        }
        let pause = match budget {
            Some(budget) => {
                let Some(remaining) = budget
                    .checked_sub(started.elapsed())
                    .filter(|left| !left.is_zero())
                else {
                    return Ok(false);
                };
                remaining.min(interval)
            }
            None => interval,
        };
        thread::sleep(pause);
    }
}

fn destroy(session: &mut Session, invocation: &mut Invocation<'_>) -> CliResult<()> {
    let app = invocation
        .shift_argument()
        .or_else(|| invocation.option("app").map(str::to_string))
        .or_else(|| invocation.option("confirm").map(str::to_string));
    invocation.validate_arguments()?;
    let Some(app) = app.filter(|app| !app.trim().is_empty()) else {
        return Err(CliError::usage(
            "Usage: pebbles apps:destroy --app APP\nMust specify APP to destroy.",
        ));
    };

    let api = session.api()?;
    api.get_app(&app)?;

    let message = format!(
        "WARNING: Potentially Destructive Action\nThis command will destroy {app} (including all add-ons)."
    );
    session.confirm_command(invocation, &app, &message)?;
    session.action(&format!("Destroying {app} (including all add-ons)"), |_| {
        api.delete_app(&app)?;
        Ok(None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiErrorKind;
    use crate::commands::tests::{run, session_for};
    use anyhow::Result;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use serde_json::json;

    fn demo_app() -> Value {
        json!({
            "name": "demo",
            "create_status": "complete",
            "owner": {"id": 7, "email": "owner@example.test", "name": "Owner"},
            "domain_name": {"domain": "demo.example.test"},
            "repo_size": 5 * 1024 * 1024,
            "build_size": null,
            "web_url": "http://demo.example.test/"
        })
    }

    #[test]
    fn index_lists_sorted_app_names() -> Result<()> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/apps").query_param("api_key", "secret");
            then.status(200)
                .json_body(json!([{"name": "zeta"}, {"name": "alpha"}]));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["list"])?;
        mock.assert();
        assert_eq!(out.contents(), "=== My Apps\nalpha\nzeta\n\n");
        Ok(())
    }

    #[test]
    fn index_without_apps_says_so() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps");
            then.status(200).json_body(json!([]));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["apps"])?;
        assert_eq!(out.contents(), "You have no apps.\n");
        Ok(())
    }

    #[test]
    fn info_renders_styled_hash() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo");
            then.status(200).json_body(demo_app());
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["info", "-a", "demo"])?;
        assert_eq!(
            out.contents(),
            "=== demo\n\
             Git URL:     https://git.example.test/demo.git\n\
             Owner:       Owner\n\
             Owner Email: owner@example.test\n\
             Repo Size:   5M\n\
             Web URL:     http://demo.example.test/\n"
        );
        Ok(())
    }

    #[test]
    fn info_shell_flattens_owner() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo");
            then.status(200).json_body(demo_app());
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["apps:info", "--app", "demo", "--shell"])?;
        let contents = out.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            [
                "build_size=",
                "create_status=complete",
                "domain_name=demo.example.test",
                "git_url=https://git.example.test/demo.git",
                "name=demo",
                "owner_email=owner@example.test",
                "owner_name=Owner",
                "repo_size=5242880",
                "web_url=http://demo.example.test/",
            ]
        );
        Ok(())
    }

    #[test]
    fn create_waits_for_completion() -> Result<()> {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST).path("/apps").query_param("app[name]", "demo");
            then.status(201).json_body(json!({
                "name": "demo",
                "create_status": "creating",
                "web_url": "http://demo.example.test/"
            }));
        });
        let poll = server.mock(|when, then| {
            when.method(GET).path("/apps/demo");
            then.status(200).json_body(demo_app());
        });
        let buildpack = server.mock(|when, then| {
            when.method(PUT)
                .path("/apps/demo/config_vars")
                .json_body(json!({"BUILDPACK_URL": "https://example.test/bp.git"}));
            then.status(200).json_body(json!({}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(
            &mut session,
            &["create", "demo", "-b", "https://example.test/bp.git"],
        )?;
        post.assert();
        poll.assert();
        buildpack.assert();
        assert_eq!(
            out.contents(),
            "Creating demo... done\n\
             BUILDPACK_URL=https://example.test/bp.git\n\
             http://demo.example.test/ | https://git.example.test/demo.git\n"
        );
        Ok(())
    }

    #[test]
    fn create_rejects_non_numeric_timeout() {
        let server = MockServer::start();
        let (mut session, _, _) = session_for(&server, &[]);
        let err =
            run(&mut session, &["create", "demo", "--timeout", "soon"]).expect_err("bad timeout");
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn polling_stops_when_budget_runs_out() -> CliResult<()> {
        let mut calls = 0;
        let ready = poll_until(
            Duration::from_millis(5),
            Some(Duration::from_millis(20)),
            || {
                calls += 1;
                Ok(false)
            },
        )?;
        assert!(!ready);
        assert!(calls >= 2);

        let mut remaining = 3;
        let ready = poll_until(Duration::from_millis(1), None, || {
            remaining -= 1;
            Ok(remaining == 0)
        })?;
        assert!(ready);
        Ok(())
    }

    #[test]
    fn destroy_with_confirm_deletes() -> Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo");
            then.status(200).json_body(demo_app());
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/apps/demo");
            then.status(200).json_body(json!({}));
        });
        let (mut session, out, _) = session_for(&server, &[]);
        run(&mut session, &["destroy", "--confirm", "demo"])?;
        delete.assert();
        assert_eq!(
            out.contents(),
            "Destroying demo (including all add-ons)... done\n"
        );
        Ok(())
    }

    #[test]
    fn destroy_aborts_on_wrong_typed_confirmation() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/demo");
            then.status(200).json_body(demo_app());
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/apps/demo");
            then.status(200);
        });
        let (mut session, out, _) = session_for(&server, &["other"]);
        let err = run(&mut session, &["apps:delete", "demo"]).expect_err("aborted");
        assert!(matches!(err, CliError::Aborted(_)));
        assert_eq!(delete.calls(), 0);
        assert!(out.contents().contains(" !    WARNING: Potentially Destructive Action"));
    }

    #[test]
    fn destroy_requires_an_app() {
        let server = MockServer::start();
        let (mut session, _, _) = session_for(&server, &[]);
        let err = run(&mut session, &["destroy"]).expect_err("no app");
        assert_eq!(
            err.display_message(),
            "Usage: pebbles apps:destroy --app APP\nMust specify APP to destroy."
        );
    }

    #[test]
    fn destroy_fails_fast_on_missing_app() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/apps/ghost");
            then.status(404).json_body(json!({"error": "App not found."}));
        });
        let (mut session, _, _) = session_for(&server, &[]);
        let err = run(&mut session, &["destroy", "--app", "ghost"]).expect_err("missing");
        assert_eq!(err.api_kind(), Some(ApiErrorKind::NotFound));
    }
}
