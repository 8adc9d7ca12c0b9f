//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with exponential
//! backoff retries and uniform JSON response handling.

use reqwest::{
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

/// Retries applied to transient failures (connect errors, 5xx, 429).
const MAX_RETRIES: u32 = 3;

/// A standardized container for API responses.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized response body on success. An empty body decodes as JSON `null`.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// A flexible asynchronous HTTP client.
///
/// Handles the base URL, the bearer token and automatic retries.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient` with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL, with a trailing slash (e.g. "https://keep.googleapis.com/").
    /// * `auth_token` - An optional bearer token for the Authorization header.
    ///
    /// # Errors
    /// Fails if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str, auth_token: Option<String>) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid base URL {:?} (must be absolute): {}", base_url, e))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs an HTTP request and decodes the response.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb.
    /// * `path` - The path relative to the base URL.
    /// * `query` - Query string pairs.
    /// * `headers` - Optional additional headers for this request.
    /// * `body` - Optional serializable object sent as the JSON body.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining, the network call, or decoding
    /// a successful body fails. Non-2xx answers are not errors here; they come
    /// back with `success == false` and the raw `error_body`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(h) = headers {
            req = req.headers(h);
        }
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            // DELETE endpoints answer with an empty body.
            let bytes = response.bytes().await?;
            let data = if bytes.iter().all(u8::is_ascii_whitespace) {
                serde_json::from_slice(b"null")?
            } else {
                serde_json::from_slice(&bytes)?
            };
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// `GET` with query parameters and no body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<ApiResponse<T>> {
        self.request::<T, ()>(Method::GET, path, query, None, None).await
    }

    /// `DELETE` with no body; the response body is discarded.
    pub async fn delete(&self, path: &str) -> anyhow::Result<ApiResponse<serde_json::Value>> {
        self.request::<serde_json::Value, ()>(Method::DELETE, path, &[], None, None)
            .await
    }
}
