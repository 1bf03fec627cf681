//! Credential resolution and the interactive login flow.
//!
//! # Design
//! - Credentials come from `PEBBLES_API_KEY`, then the credential store entry
//!   for `api.<host>`, then an interactive prompt.
//! - The resolved credential and the API client built from it are cached for
//!   the rest of the process; logout and failed verification clear both.
//! - Only an Unauthorized verification is retried, at most three attempts in
//!   total per process.

use std::fmt;
use std::rc::Rc;

use anyhow::anyhow;

use crate::client::{ApiClient, ApiErrorKind, CliError, CliResult, Warnings};
use crate::config::Settings;
use crate::netrc::CredentialStore;
use crate::prompt::Prompt;

pub(crate) const MAX_LOGIN_ATTEMPTS: u32 = 3;
const KEY_PREFIX_LEN: usize = 6;

/// Identifier and API key. The identifier is empty for a raw API key.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Credential {
    pub(crate) user: String,
    pub(crate) api_key: String,
}

impl Credential {
    /// First characters of the key, safe for logs.
    pub(crate) fn key_prefix(&self) -> &str {
        let end = self
            .api_key
            .char_indices()
            .nth(KEY_PREFIX_LEN)
            .map_or(self.api_key.len(), |(index, _)| index);
        &self.api_key[..end]
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("user", &self.user)
            .field("api_key", &format_args!("{}...", self.key_prefix()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthState {
    NoCredentials,
    Authenticating,
    Authenticated,
}

/// Owns the credential and API client caches for one process.
#[derive(Debug)]
pub(crate) struct AuthManager {
    settings: Settings,
    store: Option<CredentialStore>,
    warnings: Warnings,
    credentials: Option<Credential>,
    api: Option<Rc<ApiClient>>,
    state: AuthState,
    login_attempts: u32,
}

impl AuthManager {
    pub(crate) fn new(settings: Settings, store: Option<CredentialStore>, warnings: Warnings) -> Self {
        Self {
            settings,
            store,
            warnings,
            credentials: None,
            api: None,
            state: AuthState::NoCredentials,
            login_attempts: 0,
        }
    }

    /// The authenticated client, resolving credentials on first use.
    pub(crate) fn api(&mut self, prompt: &mut dyn Prompt) -> CliResult<Rc<ApiClient>> {
        if let Some(api) = &self.api {
            return Ok(Rc::clone(api));
        }
        let credential = self.credentials(prompt)?;
        self.client_for(&credential)
    }

    pub(crate) fn credentials(&mut self, prompt: &mut dyn Prompt) -> CliResult<Credential> {
        if let Some(credential) = &self.credentials {
            return Ok(credential.clone());
        }
        let credential = match self.read_credentials()? {
            Some(credential) => credential,
            None => self.ask_for_and_save_credentials(prompt)?,
        };
        self.credentials = Some(credential.clone());
        self.state = AuthState::Authenticated;
        Ok(credential)
    }

    pub(crate) fn user(&mut self, prompt: &mut dyn Prompt) -> CliResult<String> {
        Ok(self.credentials(prompt)?.user)
    }

    pub(crate) fn api_key(&mut self, prompt: &mut dyn Prompt) -> CliResult<String> {
        Ok(self.credentials(prompt)?.api_key)
    }

    /// Discard any cached credential and run the full prompt flow.
    pub(crate) fn login(&mut self, prompt: &mut dyn Prompt) -> CliResult<Credential> {
        self.delete_credentials();
        self.credentials(prompt)
    }

    pub(crate) fn logout(&mut self) {
        self.delete_credentials();
    }

    /// Environment key first, then the credential store.
    pub(crate) fn read_credentials(&self) -> CliResult<Option<Credential>> {
        if let Some(api_key) = &self.settings.api_key {
            return Ok(Some(Credential {
                user: String::new(),
                api_key: api_key.clone(),
            }));
        }
        let Some(store) = &self.store else {
            return Ok(None);
        };
        store
            .load(&self.settings.api_machine())
            .map_err(|err| CliError::aborted(err.to_string()))
    }

    /// Prompt for an identifier and secret and exchange them for an API key.
    pub(crate) fn ask_for_credentials(&self, prompt: &mut dyn Prompt) -> CliResult<Credential> {
        prompt.notify("Enter your Pebblescape credentials.");
        let user = prompt.ask("Email: ")?;
        let password = prompt.ask_secret("Password (typing will be hidden): ")?;

        let anonymous = ApiClient::new(&self.settings, None, self.warnings.clone())?;
        let api_key = anonymous.post_login(&user, &password)?;
        Ok(Credential { user, api_key })
    }

    pub(crate) fn ask_for_and_save_credentials(
        &mut self,
        prompt: &mut dyn Prompt,
    ) -> CliResult<Credential> {
        loop {
            self.state = AuthState::Authenticating;
            match self.attempt_login(prompt) {
                Ok(credential) => {
                    self.state = AuthState::Authenticated;
                    return Ok(credential);
                }
                Err(err) if err.api_kind() == Some(ApiErrorKind::Unauthorized) => {
                    self.delete_credentials();
                    prompt.notify("Authentication failed.");
                    if self.settings.api_key.is_some() {
                        prompt.warn("WARNING: PEBBLES_API_KEY is set to an invalid key.");
                    }
                    self.login_attempts += 1;
                    if self.login_attempts >= MAX_LOGIN_ATTEMPTS {
                        return Err(CliError::AuthenticationFailed);
                    }
                }
                Err(err) => {
                    self.delete_credentials();
                    return Err(err);
                }
            }
        }
    }

    fn attempt_login(&mut self, prompt: &mut dyn Prompt) -> CliResult<Credential> {
        let credential = self.ask_for_credentials(prompt)?;
        tracing::debug!(
            user = %credential.user,
            "Logged in with key: {}...",
            credential.key_prefix()
        );
        self.credentials = Some(credential.clone());
        self.write_credentials(&credential)?;
        self.client_for(&credential)?.get_user()?;
        Ok(credential)
    }

    fn write_credentials(&self, credential: &Credential) -> CliResult<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| CliError::failure(anyhow!("unable to locate the credential store")))?;
        store
            .save(&self.settings.machine_names(), credential)
            .map_err(|err| CliError::aborted(err.to_string()))
    }

    /// Clear both caches and best-effort remove the store entries. Never fails.
    pub(crate) fn delete_credentials(&mut self) {
        if let Some(store) = &self.store
            && let Err(err) = store.remove(&self.settings.machine_names())
        {
            tracing::warn!(error = %err, "failed to remove stored credentials");
        }
        self.credentials = None;
        self.api = None;
        self.state = AuthState::NoCredentials;
    }

    fn client_for(&mut self, credential: &Credential) -> CliResult<Rc<ApiClient>> {
        tracing::debug!(state = ?self.state, "Using API with key: {}...", credential.key_prefix());
        let api = Rc::new(ApiClient::new(
            &self.settings,
            Some(credential.api_key.clone()),
            self.warnings.clone(),
        )?);
        self.api = Some(Rc::clone(&api));
        Ok(api)
    }

    /// Whether the store holds credentials for the HTTP git host. Always true
    /// when an API key comes from the environment.
    pub(crate) fn has_http_git_entry(&self) -> bool {
        if self.settings.api_key.is_some() {
            return true;
        }
        self.store
            .as_ref()
            .and_then(|store| store.read().ok().flatten())
            .is_some_and(|netrc| netrc.contains(&self.settings.http_git_host()))
    }
}
