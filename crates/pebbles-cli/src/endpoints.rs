//! Typed wrappers for the platform routes used by the commands.

use anyhow::anyhow;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::{ApiClient, ApiRequest, CliError, CliResult};

impl ApiClient {
    pub(crate) fn get_apps(&self) -> CliResult<Vec<Value>> {
        let body = self.request(ApiRequest::get(&["apps"]))?.into_json();
        match body {
            Value::Array(apps) => Ok(apps),
            Value::Null => Ok(Vec::new()),
            other => Err(unexpected("GET /apps", &other)),
        }
    }

    pub(crate) fn get_app(&self, app: &str) -> CliResult<Value> {
        Ok(self.request(ApiRequest::get(&["apps", app]))?.into_json())
    }

    /// Create an app. Fields are sent as `app[<field>]` query parameters.
    pub(crate) fn post_app(&self, params: &[(&str, &str)]) -> CliResult<Value> {
        let request = params
            .iter()
            .fold(ApiRequest::post(&["apps"]), |request, (key, value)| {
                request.query(format!("app[{key}]"), *value)
            });
        Ok(self.request(request)?.into_json())
    }

    pub(crate) fn delete_app(&self, app: &str) -> CliResult<()> {
        self.request(ApiRequest::delete(&["apps", app])).map(drop)
    }

    pub(crate) fn get_config_vars(&self, app: &str) -> CliResult<Map<String, Value>> {
        self.config_vars(ApiRequest::get(&["apps", app, "config_vars"]))
    }

    /// Config vars with `symbolic` references left unresolved.
    pub(crate) fn get_symbolic_config_vars(&self, app: &str) -> CliResult<Map<String, Value>> {
        self.config_vars(ApiRequest::get(&["apps", app, "config_vars"]).query("symbolic", "true"))
    }

    pub(crate) fn put_config_vars(
        &self,
        app: &str,
        vars: &Map<String, Value>,
    ) -> CliResult<Map<String, Value>> {
        self.config_vars(
            ApiRequest::put(&["apps", app, "config_vars"]).json(Value::Object(vars.clone())),
        )
    }

    pub(crate) fn delete_config_var(&self, app: &str, key: &str) -> CliResult<()> {
        self.request(ApiRequest::delete(&["apps", app, "config_vars", key]))
            .map(drop)
    }

    pub(crate) fn get_release(&self, app: &str, release: &str) -> CliResult<Value> {
        Ok(self
            .request(ApiRequest::get(&["apps", app, "releases", release]))?
            .into_json())
    }

    pub(crate) fn get_user(&self) -> CliResult<Value> {
        Ok(self.request(ApiRequest::get(&["user"]))?.into_json())
    }

    /// Exchange an identifier and secret for an API key. Sent without
    /// authentication when called on an anonymous client.
    pub(crate) fn post_login(&self, username: &str, password: &str) -> CliResult<String> {
        let body = self
            .request(
                ApiRequest::post(&["login"])
                    .query("username", username)
                    .query("password", password),
            )?
            .into_json();
        let login: LoginResponse = serde_json::from_value(body).map_err(|err| {
            CliError::failure(anyhow!("login response did not include an api_key: {err}"))
        })?;
        Ok(login.api_key)
    }

    fn config_vars(&self, request: ApiRequest) -> CliResult<Map<String, Value>> {
        match self.request(request)?.into_json() {
            Value::Object(vars) => Ok(vars),
            Value::Null => Ok(Map::new()),
            other => Err(unexpected("config vars", &other)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    api_key: String,
}

fn unexpected(what: &str, body: &Value) -> CliError {
    CliError::failure(anyhow!("unexpected response for {what}: {body}"))
}
