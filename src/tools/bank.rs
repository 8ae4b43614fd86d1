//! HTTP client for the bank REST endpoints
//!
//! One pooled client per process. Calls never fail from the caller's point
//! of view: transport errors and non-JSON bodies come back as
//! `{ "error": ..., "text": ... }` so the conversation keeps going.

use crate::config::Settings;
use crate::models::RequestContext;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, ORIGIN, USER_AGENT};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";

/// One outgoing call, built by a tool from its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct BankRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl BankRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds the parameter only when present
    pub fn query_opt<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub struct BankApiClient {
    client: Client,
    base_url: String,
    fallback_cookie: Option<String>,
}

impl BankApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        fallback_cookie: Option<String>,
    ) -> crate::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        if let Ok(origin) = HeaderValue::from_str(base_url) {
            headers.insert(ORIGIN, origin);
        }

        let client = Client::builder()
            .default_headers(headers)
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback_cookie,
        })
    }

    pub fn from_settings(settings: &Settings) -> crate::Result<Self> {
        Self::new(
            &settings.bank_base_url,
            settings.tool_timeout,
            settings.fallback_cookie.clone(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send(&self, request: BankRequest, ctx: &RequestContext) -> Value {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .query(&request.query);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(cookie) = ctx.cookie.as_deref().or(self.fallback_cookie.as_deref()) {
            builder = builder.header(COOKIE, cookie);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, path = %request.path, "Calling bank API");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %request.path, error = %e, "Bank API request failed");
                return error_object(e.to_string(), String::new());
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %request.path, error = %e, "Bank API body could not be read");
                return error_object(e.to_string(), String::new());
            }
        };

        if !status.is_success() {
            warn!(path = %request.path, %status, "Bank API returned an error status");
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %request.path, error = %e, "Bank API returned a non-JSON body");
                error_object(e.to_string(), text)
            }
        }
    }
}

fn error_object(error: String, text: String) -> Value {
    json!({ "error": error, "text": text })
}

/// True when a response is the `{error, text}` failure object
pub fn is_error_object(value: &Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key("error") && obj.contains_key("text") && obj.len() == 2)
        .unwrap_or(false)
}
