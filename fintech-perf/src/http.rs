//! HTTP transport for journey steps.
use crate::EngineError;
use fintech_perf_core::constants::http::{JSON, USER_AGENT};
use fintech_perf_core::journey::RenderedRequest;
use fintech_perf_core::{Method, StepError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// A shared client bound to the API base URL.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
}

impl Transport {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        Url::parse(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a rendered request and return its status and body text.
    pub async fn send(
        &self,
        request: &RenderedRequest,
        timeout: Option<Duration>,
    ) -> Result<(u16, String), StepError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(step_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(step_error)?;
        Ok((status, body))
    }
}

fn step_error(err: reqwest::Error) -> StepError {
    if err.is_timeout() {
        StepError::Timeout
    } else {
        StepError::Transport(err.to_string())
    }
}
