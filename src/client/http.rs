use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use ::http::{
    HeaderValue, Method, Request, StatusCode, Uri,
    header::{AUTHORIZATION, CONTENT_TYPE},
    uri::{InvalidUri, PathAndQuery},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use super::MetricClient;
use crate::gcp::CreateTimeSeriesRequest;

pub const MONITORING_URL: &str = "https://monitoring.googleapis.com";

const fn default_timeout_secs() -> u64 {
    60
}

fn default_endpoint() -> String {
    MONITORING_URL.to_string()
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    #[snafu(display("Failed to build HTTP client: {source}"))]
    BuildClient { source: reqwest::Error },
    #[snafu(display("Invalid endpoint {endpoint:?}: {source}"))]
    InvalidEndpoint { endpoint: String, source: InvalidUri },
    #[snafu(display("Endpoint {endpoint:?} has no scheme or host"))]
    IncompleteEndpoint { endpoint: String },
    #[snafu(display("Invalid API key, only letters, digits and `-._~` are allowed"))]
    InvalidApiKey,
    #[snafu(display("Invalid bearer token"))]
    InvalidToken,
    #[snafu(display("Failed to encode request: {source}"))]
    Encode { source: serde_json::Error },
    #[snafu(display("Failed to build request: {source}"))]
    BuildRequest { source: ::http::Error },
    #[snafu(display("Failed to send request: {source}"))]
    Send { source: reqwest::Error },
    #[snafu(display("Server responded with {status}: {body}"))]
    Status { status: StatusCode, body: String },
    #[snafu(display("Client is closed"))]
    Closed,
}

/// Connection settings of [`HttpMetricClient`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HttpClientConfig {
    /// Base URL of the Monitoring API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// An API key, sent as the `key` query parameter.
    #[serde(default)]
    pub api_key: Option<String>,

    /// An OAuth access token, sent as a bearer token.
    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            bearer_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpClientConfig {
    pub fn build(&self) -> Result<HttpMetricClient, HttpError> {
        let endpoint = self.endpoint.trim_end_matches('/');
        let uri: Uri = endpoint.parse().context(InvalidEndpointSnafu { endpoint })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(HttpError::IncompleteEndpoint {
                endpoint: endpoint.to_string(),
            });
        }

        if let Some(api_key) = &self.api_key
            && (api_key.is_empty() || !api_key.bytes().all(is_unreserved))
        {
            return Err(HttpError::InvalidApiKey);
        }

        let authorization = self
            .bearer_token
            .as_ref()
            .map(|token| {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| HttpError::InvalidToken)?;
                value.set_sensitive(true);
                Ok(value)
            })
            .transpose()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .context(BuildClientSnafu)?;

        Ok(HttpMetricClient {
            client,
            endpoint: endpoint.to_string(),
            api_key: self.api_key.clone(),
            authorization,
            closed: AtomicBool::new(false),
        })
    }
}

/// The key goes into the query string as is, so it must not need percent-encoding.
const fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// A [`MetricClient`] speaking the JSON flavour of the Monitoring v3 REST API.
#[derive(Debug)]
pub struct HttpMetricClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    authorization: Option<HeaderValue>,
    closed: AtomicBool,
}

impl HttpMetricClient {
    fn uri(&self, name: &str) -> Result<Uri, HttpError> {
        let uri = format!("{}/v3/{name}/timeSeries", self.endpoint);
        let mut uri: Uri = uri
            .parse()
            .context(InvalidEndpointSnafu { endpoint: &self.endpoint })?;
        if let Some(api_key) = &self.api_key {
            let mut parts = uri.into_parts();
            let path = parts
                .path_and_query
                .as_ref()
                .map_or("/", PathAndQuery::path);
            let path_and_query = format!("{path}?key={api_key}");
            parts.path_and_query = Some(
                path_and_query
                    .parse()
                    .context(InvalidEndpointSnafu { endpoint: &self.endpoint })?,
            );
            uri = Uri::from_parts(parts).map_err(|_| HttpError::IncompleteEndpoint {
                endpoint: self.endpoint.clone(),
            })?;
        }
        Ok(uri)
    }

    fn build_request(
        &self,
        request: &CreateTimeSeriesRequest,
    ) -> Result<reqwest::Request, HttpError> {
        let body = serde_json::to_vec(request).context(EncodeSnafu)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.uri(&request.name)?)
            .header(CONTENT_TYPE, "application/json");
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }
        let request = builder.body(body).context(BuildRequestSnafu)?;
        reqwest::Request::try_from(request).context(SendSnafu)
    }

    async fn send(&self, request: CreateTimeSeriesRequest) -> Result<(), HttpError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HttpError::Closed);
        }

        let request = self.build_request(&request)?;
        let response = self.client.execute(request).await.context(SendSnafu)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(HttpError::Status { status, body })
    }
}

#[async_trait]
impl MetricClient for HttpMetricClient {
    async fn create_time_series(&self, request: CreateTimeSeriesRequest) -> crate::Result<()> {
        self.send(request).await.map_err(Into::into)
    }

    async fn close(&self) -> crate::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(HttpError::Closed.into());
        }
        Ok(())
    }
}
