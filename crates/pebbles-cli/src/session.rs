//! Per-process context threaded through the dispatcher and every handler.

use std::rc::Rc;

use crate::auth::AuthManager;
use crate::client::{ApiClient, CliError, CliResult, Warnings};
use crate::config::Settings;
use crate::dispatch::Invocation;
use crate::netrc::CredentialStore;
use crate::output::{Output, format_with_bang};
use crate::prompt::Prompt;

pub(crate) struct Session {
    pub(crate) settings: Settings,
    pub(crate) auth: AuthManager,
    pub(crate) prompt: Box<dyn Prompt>,
    pub(crate) output: Output,
    pub(crate) warnings: Warnings,
}

impl Session {
    pub(crate) fn new(
        settings: Settings,
        store: Option<CredentialStore>,
        prompt: Box<dyn Prompt>,
        output: Output,
    ) -> Self {
        let warnings = Warnings::default();
        let auth = AuthManager::new(settings.clone(), store, warnings.clone());
        Self {
            settings,
            auth,
            prompt,
            output,
            warnings,
        }
    }

    /// The authenticated API client, prompting for credentials when needed.
    pub(crate) fn api(&mut self) -> CliResult<Rc<ApiClient>> {
        self.auth.api(self.prompt.as_mut())
    }

    /// The app a command targets: `--confirm`, then `--app`, then
    /// `PEBBLES_APP`. An empty name is rejected before any request is built.
    pub(crate) fn app(&self, invocation: &Invocation<'_>) -> CliResult<String> {
        let app = invocation.option("app");
        let resolved = if let Some(confirm) = invocation.option("confirm") {
            if app.is_some_and(|app| app != confirm) {
                return Err(CliError::usage("Mismatch between --app and --confirm"));
            }
            Some(confirm.to_string())
        } else {
            app.map(str::to_string)
                .or_else(|| self.settings.default_app.clone())
        };

        resolved
            .filter(|app| !app.trim().is_empty())
            .ok_or_else(|| {
                CliError::usage("No app specified.\nSpecify which app to use with --app APP.")
            })
    }

    pub(crate) fn git_url(&self, invocation: &Invocation<'_>, app: &str) -> CliResult<String> {
        if invocation.flag("ssh-git") {
            return Ok(format!("git@{}:{app}.git", self.settings.git_host()));
        }
        if !self.auth.has_http_git_entry() {
            return Err(CliError::aborted(
                "WARNING: Incomplete credentials detected, git may not work with Pebblescape. Run `pebbles login` to update your credentials.",
            ));
        }
        Ok(format!("https://{}/{app}.git", self.settings.http_git_host()))
    }

    /// Require `--confirm APP` or a typed confirmation before a destructive action.
    pub(crate) fn confirm_command(
        &mut self,
        invocation: &Invocation<'_>,
        app: &str,
        message: &str,
    ) -> CliResult<()> {
        if let Some(confirmed) = invocation.option("confirm") {
            if confirmed != app {
                return Err(CliError::usage(format!(
                    "Confirmed app {confirmed} did not match the selected app {app}."
                )));
            }
            return Ok(());
        }

        let message = format!(
            "{message}\nTo proceed, type \"{app}\" or re-run this command with --confirm {app}"
        );
        self.output.display("")?;
        self.output.display(&format_with_bang(&message))?;
        self.output.display("")?;
        let answer = self.prompt.ask("> ")?;
        if answer.to_lowercase() == app {
            Ok(())
        } else {
            Err(CliError::aborted(format!(
                "Confirmation did not match {app}. Aborted."
            )))
        }
    }

    /// Run `work` between `message... ` and `done[, status]`, closing the line
    /// with `failed` when it errors.
    pub(crate) fn action<F>(&mut self, message: &str, work: F) -> CliResult<()>
    where
        F: FnOnce(&mut Self) -> CliResult<Option<String>>,
    {
        self.output.begin_action(message)?;
        match work(self) {
            Ok(status) => self.output.finish_action(status.as_deref()),
            Err(err) => {
                self.output.fail_action()?;
                Err(err)
            }
        }
    }

    /// Print and clear warnings collected from API responses.
    pub(crate) fn display_warnings(&mut self) -> CliResult<()> {
        for warning in self.warnings.drain() {
            self.output.warn(&format!("WARNING: {warning}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::output::tests::CaptureBuffer;
    use crate::prompt::tests::ScriptedPrompt;

    /// Session with captured output and scripted answers.
    pub(crate) fn session_with(
        settings: Settings,
        store: Option<CredentialStore>,
        answers: &[&str],
    ) -> (Session, CaptureBuffer, CaptureBuffer) {
        let (output, out, err) = Output::capture();
        let prompt = Box::new(ScriptedPrompt::with_answers(answers));
        (Session::new(settings, store, prompt, output), out, err)
    }

    #[test]
    fn action_reports_failure_and_propagates() {
        let (mut session, out, _) = session_with(Settings::for_host("example.test"), None, &[]);
        let result = session.action("Destroying demo", |_| Err(CliError::usage("boom")));
        assert!(matches!(result, Err(CliError::Usage(_))));
        assert_eq!(out.contents(), "Destroying demo... failed\n");
    }

    #[test]
    fn warnings_are_drained_to_stderr() -> CliResult<()> {
        let (mut session, _, err) = session_with(Settings::for_host("example.test"), None, &[]);
        session.warnings.extend(["maintenance tonight".to_string()]);
        session.display_warnings()?;
        session.display_warnings()?;
        assert_eq!(err.contents(), "WARNING: maintenance tonight\n");
        Ok(())
    }
}
