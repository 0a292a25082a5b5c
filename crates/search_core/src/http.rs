use async_trait::async_trait;
use reqwest::Client;
use shared::{domain::Payload, error::FetchError};
use url::Url;

use crate::{
    config::{ConfigError, Settings},
    LookupTransport,
};

const ERROR_BODY_SNIPPET_LEN: usize = 200;

/// Base URL plus the static credential that every lookup carries.
#[derive(Clone)]
pub struct Endpoint {
    base_url: Url,
    api_key: String,
}

impl Endpoint {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ConfigError> {
        let base_url = base_url.trim();
        let parsed = Url::parse(base_url).map_err(|err| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        Ok(Self {
            base_url: parsed,
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>?apikey=<key>&t=<term>`, appended to any query the base already has.
    pub fn request_url(&self, term: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("apikey", &self.api_key)
            .append_pair("t", term);
        url
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

pub struct HttpLookup {
    http: Client,
    endpoint: Endpoint,
}

impl HttpLookup {
    pub fn new(http: Client, endpoint: Endpoint) -> Self {
        Self { http, endpoint }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let endpoint = settings.endpoint()?;
        let http = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;
        Ok(Self::new(http, endpoint))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl LookupTransport for HttpLookup {
    async fn lookup(&self, term: &str) -> Result<Payload, FetchError> {
        let response = self
            .http
            .get(self.endpoint.request_url(term))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::status(
                status.as_u16(),
                status_message(status, &body),
            ));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&body)
            .map_err(|err| FetchError::decode(format!("response body is not a JSON object: {err}")))
    }
}

// The request URL carries the credential, so it never reaches the message.
fn map_transport_error(err: reqwest::Error) -> FetchError {
    let timed_out = err.is_timeout();
    let err = err.without_url();
    if timed_out {
        FetchError::transport(format!("request timed out: {err}"))
    } else {
        FetchError::transport(err.to_string())
    }
}

fn status_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("remote service returned {status}");
    }
    let snippet: String = body.chars().take(ERROR_BODY_SNIPPET_LEN).collect();
    format!("remote service returned {status}: {snippet}")
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
