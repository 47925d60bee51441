use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use conduit_types::{resolve, resolve_map, GlobalState, Result};

// ---------------------------------------------------------------------------
// HttpStep — configuration of one httpinvoke step
// ---------------------------------------------------------------------------

/// Configuration body of an `httpinvoke` step. The `url`, `headers`,
/// `params`, and `data` fields may be reference strings resolved against the
/// state at call time; `options` is resolved per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpStep {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

/// Per-call options extracted from a step's resolved `options` map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeOptions {
    pub timeout: Option<Duration>,
    pub proxy: Option<String>,
    pub validation_rules: Option<Map<String, Value>>,
}

impl InvokeOptions {
    pub fn from_resolved(options: &Map<String, Value>) -> Self {
        Self {
            timeout: options
                .get("timeout")
                .and_then(Value::as_u64)
                .map(Duration::from_millis),
            proxy: options
                .get("proxy")
                .and_then(Value::as_str)
                .map(str::to_string),
            validation_rules: options
                .get("validationRules")
                .and_then(Value::as_object)
                .cloned(),
        }
    }
}

/// Whether `status` is accepted under the configured validation rules.
///
/// With rules present, the status-specific entry wins when it maps to
/// `true`; otherwise the `"default"` entry decides, and absence rejects.
/// Without rules, the 2xx range is the accepted set.
pub fn status_accepted(status: u16, rules: Option<&Map<String, Value>>) -> bool {
    match rules {
        Some(rules) => {
            let specific = rules
                .get(&status.to_string())
                .and_then(Value::as_bool)
                .unwrap_or(false);
            specific
                || rules
                    .get("default")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
        }
        None => (200..300).contains(&status),
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Classification of a failed HTTP call, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server responded with a status outside the accepted set.
    Response,
    /// The request was sent but no response arrived.
    Request,
    /// The request could not be constructed or sent at all.
    Setup,
}

impl FailureKind {
    fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Response => "response",
            FailureKind::Request => "request",
            FailureKind::Setup => "setup",
        }
    }
}

fn failure_value(
    kind: FailureKind,
    message: String,
    status: Option<u16>,
    body: Option<Value>,
    duration_ms: u64,
) -> Value {
    let mut error = Map::new();
    error.insert("kind".into(), Value::String(kind.as_str().into()));
    error.insert("message".into(), Value::String(message));
    error.insert("duration".into(), Value::from(duration_ms));
    if let Some(status) = status {
        error.insert("statusCode".into(), Value::from(status));
    }
    if let Some(body) = body {
        error.insert("body".into(), body);
    }
    json!({ "error": error })
}

// ---------------------------------------------------------------------------
// Header construction
// ---------------------------------------------------------------------------

/// Build the outbound header map from the resolved `headers` value, injecting
/// the bearer token last so it overwrites any configured authorization.
fn build_header_map(
    headers: &Value,
    token: Option<&str>,
) -> std::result::Result<HeaderMap, String> {
    let mut map = HeaderMap::new();
    if let Value::Object(entries) = headers {
        for (name, value) in entries {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name '{name}': {e}"))?;
            let text = string_form(value);
            let header_value = HeaderValue::from_str(&text)
                .map_err(|e| format!("invalid value for header '{name}': {e}"))?;
            map.insert(header_name, header_value);
        }
    }
    if let Some(token) = token {
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| format!("invalid bearer token: {e}"))?;
        map.insert(AUTHORIZATION, bearer);
    }
    Ok(map)
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// HttpInvoker
// ---------------------------------------------------------------------------

struct ResolvedCall {
    method: String,
    url: Value,
    headers: Value,
    params: Value,
    data: Option<Value>,
    options: InvokeOptions,
    token: Option<String>,
}

pub struct HttpInvoker {
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Perform the call described by `step`, resolving its parts against
    /// `state`.
    ///
    /// Returns a success document `{statusCode, headers, payload, duration}`
    /// or a structured `{error}` document; transport failures never surface
    /// as `Err`, so the pipeline continues with the failure as the step's
    /// output. Only an unresolvable reference path is fatal.
    pub async fn invoke(
        &self,
        step: &HttpStep,
        step_name: &str,
        state: &GlobalState,
    ) -> Result<Value> {
        let call = self.resolve_call(step, state)?;
        Ok(self.send(step_name, call).await)
    }

    fn resolve_call(&self, step: &HttpStep, state: &GlobalState) -> Result<ResolvedCall> {
        let url = resolve(&Value::String(step.url.clone()), state)?;
        let headers = match &step.headers {
            Some(headers) => resolve(headers, state)?,
            None => Value::Null,
        };
        let params = match &step.params {
            Some(params) => resolve(params, state)?,
            None => Value::Null,
        };
        let data = match &step.data {
            Some(data) => Some(resolve(data, state)?),
            None => None,
        };
        let options = InvokeOptions::from_resolved(&resolve_map(&step.options, state)?);
        let token = state
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ResolvedCall {
            method: step.method.clone(),
            url,
            headers,
            params,
            data,
            options,
            token,
        })
    }

    async fn send(&self, step_name: &str, call: ResolvedCall) -> Value {
        let started = Instant::now();
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        // Setup phase: everything that can fail before the wire.
        let method = match reqwest::Method::from_bytes(call.method.to_uppercase().as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return failure_value(
                    FailureKind::Setup,
                    format!("invalid HTTP method '{}'", call.method),
                    None,
                    None,
                    elapsed(started),
                )
            }
        };
        let url = match &call.url {
            Value::String(s) => s.clone(),
            other => {
                return failure_value(
                    FailureKind::Setup,
                    format!("resolved URL is not a string: {other}"),
                    None,
                    None,
                    elapsed(started),
                )
            }
        };
        let header_map = match build_header_map(&call.headers, call.token.as_deref()) {
            Ok(map) => map,
            Err(message) => {
                return failure_value(FailureKind::Setup, message, None, None, elapsed(started))
            }
        };
        let proxied;
        let client = match &call.options.proxy {
            Some(proxy) => {
                match reqwest::Proxy::all(proxy)
                    .and_then(|p| reqwest::Client::builder().proxy(p).build())
                {
                    Ok(client) => {
                        proxied = client;
                        &proxied
                    }
                    Err(e) => {
                        return failure_value(
                            FailureKind::Setup,
                            format!("invalid proxy '{proxy}': {e}"),
                            None,
                            None,
                            elapsed(started),
                        )
                    }
                }
            }
            None => &self.client,
        };

        let mut request = client.request(method.clone(), &url).headers(header_map);
        if let Value::Object(params) = &call.params {
            let pairs: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| (k.clone(), string_form(v)))
                .collect();
            request = request.query(&pairs);
        }
        if let Some(data) = &call.data {
            request = request.json(data);
        }
        if let Some(timeout) = call.options.timeout {
            request = request.timeout(timeout);
        }

        let sent_at = chrono::Utc::now();
        tracing::debug!(step = %step_name, method = %method, url = %url, sent_at = %sent_at, "Sending HTTP request");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = if e.is_builder() {
                    FailureKind::Setup
                } else {
                    FailureKind::Request
                };
                tracing::error!(step = %step_name, error = %e, "HTTP call failed without a response");
                return failure_value(kind, e.to_string(), None, None, elapsed(started));
            }
        };

        let status = response.status().as_u16();
        let response_headers = headers_to_value(response.headers());
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(step = %step_name, error = %e, "Failed to read HTTP response body");
                return failure_value(
                    FailureKind::Request,
                    e.to_string(),
                    Some(status),
                    None,
                    elapsed(started),
                );
            }
        };
        let duration = elapsed(started);
        let payload = match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(_) => Value::String(text),
        };

        if !status_accepted(status, call.options.validation_rules.as_ref()) {
            tracing::error!(step = %step_name, status, "HTTP response status rejected");
            return failure_value(
                FailureKind::Response,
                format!("status {status} outside the accepted set"),
                Some(status),
                Some(payload),
                duration,
            );
        }

        tracing::debug!(step = %step_name, status, duration_ms = duration, "HTTP response");
        json!({
            "statusCode": status,
            "headers": response_headers,
            "payload": payload,
            "duration": duration,
        })
    }
}

impl Default for HttpInvoker {
    fn default() -> Self {
        Self::new()
    }
}

fn headers_to_value(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        let text = value.to_str().unwrap_or_default().to_string();
        map.insert(name.as_str().to_string(), Value::String(text));
    }
    Value::Object(map)
}
