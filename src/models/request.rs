use std::collections::HashMap;

use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A single logical call to the protected upstream.
///
/// The same request is replayed for every retry attempt.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub cancellation: Option<CancellationToken>,
}

impl LlmRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            headers: HashMap::new(),
            body: None,
            cancellation: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("authorization", format!("Bearer {}", token))
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}
