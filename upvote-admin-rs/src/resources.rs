//! Declarative REST resource bindings.
//!
//! A binding maps named actions onto a URL template such as
//! `/api/web/hosts/:id`. `:name` placeholders are filled from the call
//! params; everything else rides along in the query string. A param value of
//! `@field` reads the value from the request payload.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::ApiError;

const XSRF_HEADER: &str = "X-XSRF-TOKEN";
const JSON_XSSI_PREFIX: &str = ")]}'";
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

/// Where an action param takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    /// `@field`: copied from the payload.
    Field(&'static str),
    Literal(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: &'static str,
    pub method: Method,
    /// Template override for this action only.
    pub url: Option<String>,
    pub params: Vec<(&'static str, ParamSource)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub url: String,
    actions: Vec<Action>,
}

pub type Params = BTreeMap<String, String>;

impl ResourceBinding {
    /// A binding with the stock `get` and `query` actions.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            actions: vec![
                Action {
                    name: "get",
                    method: Method::Get,
                    url: None,
                    params: Vec::new(),
                },
                Action {
                    name: "query",
                    method: Method::Get,
                    url: None,
                    params: Vec::new(),
                },
            ],
        }
    }

    pub fn action(
        self,
        name: &'static str,
        method: Method,
        params: &[(&'static str, ParamSource)],
    ) -> Self {
        self.insert_action(Action {
            name,
            method,
            url: None,
            params: params.to_vec(),
        })
    }

    pub fn action_at(
        self,
        name: &'static str,
        method: Method,
        url: impl Into<String>,
        params: &[(&'static str, ParamSource)],
    ) -> Self {
        self.insert_action(Action {
            name,
            method,
            url: Some(url.into()),
            params: params.to_vec(),
        })
    }

    fn insert_action(mut self, action: Action) -> Self {
        self.actions.retain(|existing| existing.name != action.name);
        self.actions.push(action);
        self
    }

    pub fn find(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|action| action.name == name)
    }

    /// Expands an action into a concrete request. Call params win over the
    /// action's declared params.
    pub fn build(
        &self,
        action_name: &str,
        params: &Params,
        payload: Option<&Value>,
    ) -> Result<ApiRequest, ApiError> {
        let action = self
            .find(action_name)
            .ok_or_else(|| ApiError::UnknownAction(action_name.to_string()))?;

        let mut merged = BTreeMap::new();
        for (key, source) in &action.params {
            let value = match source {
                ParamSource::Literal(value) => Some((*value).to_string()),
                ParamSource::Field(field) => payload
                    .and_then(|body| body.get(*field))
                    .and_then(param_string),
            };
            if let Some(value) = value {
                merged.insert((*key).to_string(), value);
            }
        }
        for (key, value) in params {
            merged.insert(key.clone(), value.clone());
        }

        let template = action.url.as_deref().unwrap_or(&self.url);
        let (segments, used) = expand_template(template, &merged);
        let query = merged
            .into_iter()
            .filter(|(key, _)| !used.contains(key))
            .collect::<Vec<_>>();

        let body = match action.method {
            Method::Post | Method::Put => payload.cloned(),
            Method::Get => None,
        };

        Ok(ApiRequest {
            method: action.method,
            segments,
            query,
            body,
        })
    }
}

fn param_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Splits a template into filled path segments. Placeholders without a value
/// drop their whole segment. Returns the placeholder names that were consumed.
fn expand_template(template: &str, params: &Params) -> (Vec<String>, Vec<String>) {
    let mut segments = Vec::new();
    let mut used = Vec::new();

    for raw in template.split('/').filter(|segment| !segment.is_empty()) {
        let Some(name) = raw.strip_prefix(':') else {
            segments.push(raw.to_string());
            continue;
        };
        used.push(name.to_string());
        match params.get(name) {
            Some(value) if !value.is_empty() => segments.push(value.clone()),
            _ => {}
        }
    }

    (segments, used)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Unencoded path segments; the transport percent-encodes them.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method.as_str(), self.path())?;
        for (idx, (key, value)) in self.query.iter().enumerate() {
            let sep = if idx == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

/// Transport backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    session_cookie: Option<String>,
    xsrf_token: Option<String>,
}

impl HttpTransport {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&cfg.api_base_url)
            .with_context(|| format!("invalid api_base_url {}", cfg.api_base_url))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_seconds))
            .build()
            .context("failed to create Upvote HTTP client")?;

        Ok(Self {
            client,
            base_url,
            session_cookie: non_empty(&cfg.session_cookie),
            xsrf_token: non_empty(&cfg.xsrf_token),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| ApiError::Transport {
                path: request.path(),
                message: format!("base url {} cannot carry a path", self.base_url),
            })?;
            path.pop_if_empty();
            path.extend(request.segments.iter());
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let path = request.path();
        let url = self.url_for(&request)?;
        debug!("{request}");

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
        };
        if let Some(cookie) = &self.session_cookie {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        if let Some(token) = &self.xsrf_token {
            builder = builder.header(XSRF_HEADER, token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| ApiError::Transport {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|err| ApiError::Transport {
            path: path.clone(),
            message: err.to_string(),
        })?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path,
                body: truncate(&text, ERROR_BODY_LIMIT),
            });
        }

        decode_body(&path, &text)
    }
}

/// Parses a JSON response body, tolerating the `)]}'` XSSI guard line.
pub fn decode_body(path: &str, text: &str) -> Result<Value, ApiError> {
    let trimmed = text.trim_start();
    let json = match trimmed.strip_prefix(JSON_XSSI_PREFIX) {
        Some(rest) => rest.trim_start_matches(',').trim_start(),
        None => trimmed,
    };
    if json.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(json).map_err(|err| ApiError::Decode {
        path: path.to_string(),
        message: err.to_string(),
    })
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Joins the web API prefix and a relative template.
pub fn api_path(prefix: &str, rest: &str) -> String {
    format!(
        "/{}/{}",
        prefix.trim_matches('/'),
        rest.trim_start_matches('/')
    )
}

pub fn blockable_resource(prefix: &str) -> ResourceBinding {
    use ParamSource::{Field, Literal};

    ResourceBinding::new(api_path(prefix, "blockables/:id"))
        .action(
            "save",
            Method::Post,
            &[
                ("id", Field("id")),
                ("type", Field("type")),
                ("fileName", Field("fileName")),
                ("publisher", Field("publisher")),
                ("flagged", Field("flagged")),
            ],
        )
        .action(
            "reset",
            Method::Post,
            &[("id", Field("id")), ("reset", Literal("reset"))],
        )
        .action(
            "update",
            Method::Post,
            &[("id", Field("id")), ("isCompiler", Field("isCompiler"))],
        )
}

pub fn blockable_query_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "blockables/:platform/:type"))
}

/// The backend reads host edits from request params only. Directory regexes
/// are passed as call params by the page that edits them, and the
/// transitive flag has its own route on [`host_service_resource`].
pub fn host_resource(prefix: &str) -> ResourceBinding {
    use ParamSource::Field;

    ResourceBinding::new(api_path(prefix, "hosts/:id")).action(
        "update",
        Method::Post,
        &[
            ("id", Field("id")),
            ("clientMode", Field("clientMode")),
            ("clientModeLock", Field("clientModeLock")),
            ("shouldUploadLogs", Field("shouldUploadLogs")),
        ],
    )
}

pub fn host_query_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "hosts/query/santa/:platform"))
}

/// Host endpoints used by the user-facing host list.
pub fn host_service_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "hosts/:id"))
        .action_at(
            "associated",
            Method::Get,
            api_path(prefix, "hosts/associated"),
            &[],
        )
        .action_at(
            "setHidden",
            Method::Put,
            api_path(prefix, "hosts/:id/hidden/:value"),
            &[],
        )
        .action_at(
            "setTransitive",
            Method::Put,
            api_path(prefix, "hosts/:id/transitive/:value"),
            &[],
        )
}

pub fn exemption_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "exemptions/:id")).action_at(
        "cancel",
        Method::Post,
        api_path(prefix, "exemptions/:id/cancel"),
        &[],
    )
}

pub fn event_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "events/:id"))
}

pub fn event_query_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "events/query"))
}

pub fn user_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "users/:id")).action("getSelf", Method::Get, &[])
}

pub fn settings_resource(prefix: &str) -> ResourceBinding {
    ResourceBinding::new(api_path(prefix, "settings/:setting"))
}
