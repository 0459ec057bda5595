//! Network seam of the client
//!
//! The orchestrator only needs `request -> (status, JSON)`. [`HttpTransport`]
//! provides that over `reqwest`; tests substitute scripted transports.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method, Url,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::policy::Persistence;
use crate::{Error, Result};

/// Default content type sent with every request
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Caller-supplied request options.
///
/// Everything except `persistence` participates in the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOptions {
    /// HTTP method (defaults to GET)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Query parameters
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    /// Extra headers, merged over the defaults
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// JSON body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Explicit durable persistence choice, overriding the route policy
    #[serde(skip)]
    pub persistence: Option<Persistence>,
}

impl RequestOptions {
    /// Empty options (GET, no parameters)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the JSON body
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Force or forbid durable persistence for this request
    #[must_use]
    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Split an inline query string off `endpoint` and merge it into the
    /// query parameters, so `/a?x=1` and `/a` with `x=1` are one request.
    ///
    /// Parameters set on the options win over inline ones of the same name.
    #[must_use]
    pub fn normalized(&self, endpoint: &str) -> (String, Self) {
        let mut options = self.clone();
        let endpoint = endpoint.split_once('#').map_or(endpoint, |(head, _)| head);
        let Some((path, query)) = endpoint.split_once('?') else {
            return (endpoint.to_string(), options);
        };

        // Only the query matters; the base is there to make the URL absolute
        match Url::parse(&format!("http://localhost/?{query}")) {
            Ok(url) => {
                for (key, value) in url.query_pairs().into_owned() {
                    options.query.entry(key).or_insert(value);
                }
                (path.to_string(), options)
            }
            Err(_) => (endpoint.to_string(), options),
        }
    }

    /// Build the wire request for `endpoint`
    #[must_use]
    pub fn to_request(&self, endpoint: &str) -> ApiRequest {
        let mut headers = BTreeMap::new();
        if !self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"))
        {
            headers.insert(
                "Content-Type".to_string(),
                DEFAULT_CONTENT_TYPE.to_string(),
            );
        }
        headers.extend(self.headers.clone());

        ApiRequest {
            method: self.method.clone().unwrap_or_else(|| "GET".to_string()),
            endpoint: endpoint.to_string(),
            query: self.query.clone(),
            headers,
            body: self.body.clone(),
        }
    }
}

/// A request ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: String,
    /// Endpoint relative to the API base URL, possibly with a query string
    pub endpoint: String,
    /// Query parameters
    pub query: BTreeMap<String, String>,
    /// Headers, defaults included
    pub headers: BTreeMap<String, String>,
    /// JSON body
    pub body: Option<Value>,
}

impl ApiRequest {
    /// A bare GET request
    #[must_use]
    pub fn get(endpoint: &str) -> Self {
        RequestOptions::new().to_request(endpoint)
    }
}

/// A received response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body (`null` for empty or non-2xx bodies)
    pub body: Value,
}

impl ApiResponse {
    /// Return `true` for 2xx statuses
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can carry an [`ApiRequest`] to the API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the response, whatever its status
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// `reqwest`-backed transport rooted at an API base URL
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for an endpoint
    #[must_use]
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        }
    }

    fn build_headers(headers: &BTreeMap<String, String>) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                map.insert(name, value);
            }
        }
        map
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request
            .method
            .parse::<Method>()
            .map_err(|e| Error::Config(format!("Invalid HTTP method '{}': {e}", request.method)))?;
        let url = self.url(&request.endpoint);

        let mut builder = self
            .client
            .request(method, &url)
            .headers(Self::build_headers(&request.headers));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        debug!(url = %url, status, "API response");

        if !response.status().is_success() {
            return Ok(ApiResponse {
                status,
                body: Value::Null,
            });
        }

        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(ApiResponse { status, body })
    }
}
