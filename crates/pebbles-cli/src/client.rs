//! API request pipeline, error taxonomy, and the CLI-level error type.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::io::{self, Read};
use std::rc::Rc;

use anyhow::anyhow;
use flate2::read::GzDecoder;
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, HeaderMap, HeaderValue, USER_AGENT,
};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{Settings, user_agent};

pub(crate) const HEADER_WARNING: &str = "x-pebbles-warning";
pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const API_KEY_PARAM: &str = "api_key";
pub(crate) const ACCEPT_VERSION: &str = "application/vnd.pebblescape+json; version=1";
const GZIP: &str = "gzip";

/// CLI-level error type. Every variant maps to exit status 1; the variant only
/// decides how the failure is rendered.
#[derive(Debug)]
pub(crate) enum CliError {
    /// Bad or missing arguments, unknown command.
    Usage(String),
    /// The user declined or mistyped a confirmation.
    Aborted(String),
    /// Classified API failure.
    Api(Box<ApiError>),
    /// Broken pipe or Ctrl-C.
    Interrupted(String),
    /// Login attempts exhausted.
    AuthenticationFailed,
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub(crate) fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_)
            | Self::Aborted(_)
            | Self::Api(_)
            | Self::Interrupted(_)
            | Self::AuthenticationFailed
            | Self::Failure(_) => 1,
        }
    }

    /// The classified API error kind, if this is one.
    pub(crate) fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::Api(error) => Some(error.kind),
            _ => None,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Usage(message) | Self::Aborted(message) | Self::Interrupted(message) => {
                message.clone()
            }
            Self::Api(error) => error.message(),
            Self::AuthenticationFailed => "Authentication failed.".to_string(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.display_message())
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(error) => Some(&**error),
            Self::Failure(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<ApiError> for CliError {
    fn from(error: ApiError) -> Self {
        Self::Api(Box::new(error))
    }
}

impl From<io::Error> for CliError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::BrokenPipe {
            Self::Interrupted(error.to_string())
        } else {
            Self::Failure(error.into())
        }
    }
}

/// Classification of a non-2xx response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    Unauthorized,
    VerificationRequired,
    Forbidden,
    /// 404 on a request whose app segment was empty.
    NilApp,
    NotFound,
    Timeout,
    RequestFailed,
    Locked,
    RateLimitExceeded,
    ErrorWithResponse,
}

impl ApiErrorKind {
    pub(crate) fn classify(status: u16, path: &str) -> Self {
        match status {
            401 => Self::Unauthorized,
            402 => Self::VerificationRequired,
            403 => Self::Forbidden,
            404 if path.contains("/apps//") => Self::NilApp,
            404 => Self::NotFound,
            408 => Self::Timeout,
            422 | 500..=599 => Self::RequestFailed,
            423 => Self::Locked,
            429 => Self::RateLimitExceeded,
            _ => Self::ErrorWithResponse,
        }
    }

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::VerificationRequired => "VerificationRequired",
            Self::Forbidden => "Forbidden",
            Self::NilApp => "NilApp",
            Self::NotFound => "NotFound",
            Self::Timeout => "Timeout",
            Self::RequestFailed => "RequestFailed",
            Self::Locked => "Locked",
            Self::RateLimitExceeded => "RateLimitExceeded",
            Self::ErrorWithResponse => "ErrorWithResponse",
        }
    }
}

impl Display for ApiErrorKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    /// JSON payload, or `Null` for empty and text bodies.
    pub(crate) fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Empty | Self::Text(_) => Value::Null,
        }
    }
}

/// A classified API failure. Created only by [`ApiClient::request`].
#[derive(Debug, Error)]
#[error("{message} ({kind})", message = self.message())]
pub(crate) struct ApiError {
    pub(crate) kind: ApiErrorKind,
    pub(crate) status: u16,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: ResponseBody,
}

impl ApiError {
    /// Request id echoed by the platform, for support reports.
    pub(crate) fn request_id(&self) -> Option<&str> {
        self.headers
            .get(HEADER_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
    }

    /// Server-provided message when the body carries one, otherwise a
    /// description of the failed exchange.
    pub(crate) fn message(&self) -> String {
        let server = match &self.body {
            ResponseBody::Json(value) => ["error", "message"]
                .iter()
                .find_map(|field| value.get(*field).and_then(Value::as_str))
                .map(str::to_string),
            ResponseBody::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        };
        server.unwrap_or_else(|| {
            format!(
                "{} {} failed with status {}",
                self.method, self.path, self.status
            )
        })
    }
}

/// One logical API call.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    /// Path segments are percent-encoded individually; an empty segment is kept.
    pub(crate) fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|segment| (*segment).to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub(crate) fn get(segments: &[&str]) -> Self {
        Self::new(Method::GET, segments)
    }

    pub(crate) fn post(segments: &[&str]) -> Self {
        Self::new(Method::POST, segments)
    }

    pub(crate) fn put(segments: &[&str]) -> Self {
        Self::new(Method::PUT, segments)
    }

    pub(crate) fn delete(segments: &[&str]) -> Self {
        Self::new(Method::DELETE, segments)
    }

    #[must_use]
    pub(crate) fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub(crate) fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Warning lines collected from responses, drained after each command.
#[derive(Debug, Clone, Default)]
pub(crate) struct Warnings(Rc<RefCell<Vec<String>>>);

impl Warnings {
    pub(crate) fn extend(&self, lines: impl IntoIterator<Item = String>) {
        self.0.borrow_mut().extend(lines);
    }

    pub(crate) fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Blocking client for the platform API.
#[derive(Debug)]
pub(crate) struct ApiClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    warnings: Warnings,
}

impl ApiClient {
    pub(crate) fn new(
        settings: &Settings,
        api_key: Option<String>,
        warnings: Warnings,
    ) -> CliResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VERSION));
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(GZIP));
        let agent = HeaderValue::from_str(&user_agent())
            .map_err(|_| CliError::failure(anyhow!("user agent contains invalid characters")))?;
        default_headers.insert(USER_AGENT, agent);
        let request_id = HeaderValue::from_str(&settings.request_id).map_err(|_| {
            CliError::failure(anyhow!("trace identifier contains invalid characters"))
        })?;
        default_headers.insert(HEADER_REQUEST_ID, request_id);

        let http = Client::builder()
            .default_headers(default_headers)
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(!settings.verify_ssl())
            .build()
            .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: settings.api_url()?,
            api_key,
            warnings,
        })
    }

    /// Execute one request: authenticate, send, decode, classify.
    pub(crate) fn request(&self, request: ApiRequest) -> CliResult<ResponseBody> {
        let ApiRequest {
            method,
            segments,
            mut query,
            body,
        } = request;

        if let Some(key) = &self.api_key
            && !query.iter().any(|(name, _)| name == API_KEY_PARAM)
        {
            query.insert(0, (API_KEY_PARAM.to_string(), key.clone()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CliError::failure(anyhow!("API base URL cannot carry a path")))?
            .clear()
            .extend(&segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(&query);
        }
        let path = url.path().to_string();

        let mut builder = self.http.request(method.clone(), url);
        if let Some(body) = &body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .map_err(|err| CliError::failure(anyhow!("request to {path} failed: {err}")))?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .map_err(|err| CliError::failure(anyhow!("failed to read response from {path}: {err}")))?;
        tracing::debug!(%method, path = %path, status = status.as_u16(), "api request");

        if !status.is_success() {
            let body = decode_body(&headers, &bytes).unwrap_or_else(|err| {
                tracing::debug!(error = %err, path = %path, "keeping undecodable error body");
                ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned())
            });
            let kind = ApiErrorKind::classify(status.as_u16(), &path);
            return Err(ApiError {
                kind,
                status: status.as_u16(),
                method,
                path,
                headers,
                body,
            }
            .into());
        }

        let body = decode_body(&headers, &bytes)?;
        self.collect_warnings(&headers);
        Ok(body)
    }

    fn collect_warnings(&self, headers: &HeaderMap) {
        let lines = headers
            .get_all(HEADER_WARNING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(warning_lines)
            .collect::<Vec<_>>();
        self.warnings.extend(lines);
    }
}

fn warning_lines(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split('\n')
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Inflate gzip payloads, then parse JSON, falling back to text.
fn decode_body(headers: &HeaderMap, bytes: &[u8]) -> CliResult<ResponseBody> {
    if bytes.is_empty() {
        return Ok(ResponseBody::Empty);
    }

    let gzipped = headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case(GZIP));
    let payload: Cow<'_, [u8]> = if gzipped {
        let mut buffer = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut buffer)
            .map_err(|err| CliError::failure(anyhow!("failed to inflate gzip response: {err}")))?;
        Cow::Owned(buffer)
    } else {
        Cow::Borrowed(bytes)
    };

    if payload.is_empty() {
        return Ok(ResponseBody::Empty);
    }
    Ok(serde_json::from_slice::<Value>(&payload).map_or_else(
        |_| ResponseBody::Text(String::from_utf8_lossy(&payload).into_owned()),
        ResponseBody::Json,
    ))
}
