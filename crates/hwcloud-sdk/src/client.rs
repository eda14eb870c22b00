//! HuaweiCloud REST client
//!
//! [`ProviderClient`] owns the HTTP connection pool and the auth token and is
//! shared between every service. [`ServiceClient`] binds it to one service
//! endpoint and knows how to build that service's URLs.

use crate::catalog::ServiceEntry;
use crate::error::{ResponseDetail, Result, SdkError};
use crate::request::{QueryParams, RequestBody};
use reqwest::Method;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Backoff applied when a service answers HTTP 429
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(30 * 60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Shared, immutable HTTP client carrying the credentials
pub struct ProviderClient {
    http: reqwest::Client,
    auth_token: String,
    user_agent: String,
    retry: RetryConfig,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ProviderClient {
    /// Create a client authenticating with `auth_token`
    pub fn new(auth_token: impl Into<String>, insecure: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(SdkError::ClientBuild)?;

        Ok(Self::from_http(http, auth_token))
    }

    /// Wrap an existing `reqwest::Client`
    pub fn from_http(http: reqwest::Client, auth_token: impl Into<String>) -> Self {
        Self {
            http,
            auth_token: auth_token.into(),
            user_agent: format!("hwcloud/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Options for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    body: Option<Value>,
    ok_codes: Option<Vec<u16>>,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl RequestOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `body` as the JSON request body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Validate and serialize `body` through [`RequestBody::to_body`]
    pub fn body<B: RequestBody>(self, body: &B) -> Result<Self> {
        Ok(self.json(body.to_body()?))
    }

    /// Replace the per-method default accepted status codes
    pub fn ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = Some(codes.to_vec());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn query_params<Q: QueryParams>(mut self, params: &Q) -> Result<Self> {
        self.query.extend(params.to_query()?);
        Ok(self)
    }
}

/// Status codes accepted when a request does not name its own
pub fn default_ok_codes(method: &Method) -> Vec<u16> {
    match *method {
        Method::GET | Method::HEAD => vec![200],
        Method::POST | Method::PUT => vec![200, 201, 202],
        Method::PATCH | Method::DELETE => vec![200, 202, 204],
        _ => vec![200],
    }
}

/// An accepted response with its body already read
#[derive(Debug, Clone)]
pub struct Response {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Response {
    /// Deserialize the whole body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Deserialize the value stored under the top-level `key`
    pub fn extract<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let mut body: Value = self.json()?;
        let value = body
            .get_mut(key)
            .map(Value::take)
            .ok_or_else(|| SdkError::MissingKey(key.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// A provider client bound to one service endpoint
#[derive(Debug, Clone)]
pub struct ServiceClient {
    provider: Arc<ProviderClient>,
    endpoint: String,
    resource_base: String,
    project_id: Option<String>,
}

impl ServiceClient {
    /// Bind `provider` to an endpoint. Both URLs gain a trailing `/` if they
    /// lack one.
    pub fn new(
        provider: Arc<ProviderClient>,
        endpoint: impl Into<String>,
        resource_base: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            endpoint: with_trailing_slash(endpoint.into()),
            resource_base: with_trailing_slash(resource_base.into()),
            project_id: None,
        }
    }

    /// Build the client for a catalog entry on `endpoint`
    pub fn for_service(
        provider: Arc<ProviderClient>,
        entry: &ServiceEntry,
        endpoint: impl Into<String>,
        project_id: Option<String>,
    ) -> Result<Self> {
        let endpoint = with_trailing_slash(endpoint.into());
        let resource_base = entry.resource_base(&endpoint, project_id.as_deref())?;
        Ok(Self {
            provider,
            endpoint,
            resource_base,
            project_id,
        })
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn resource_base(&self) -> &str {
        &self.resource_base
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Join `path` onto the service endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path.trim_start_matches('/'))
    }

    /// Join `parts` onto the resource base
    pub fn resource_url(&self, parts: &[&str]) -> String {
        let path: Vec<&str> = parts.iter().map(|p| p.trim_matches('/')).collect();
        format!("{}{}", self.resource_base, path.join("/"))
    }

    /// Send a request and check its status code.
    ///
    /// HTTP 429 is retried according to the provider's [`RetryConfig`];
    /// every other failure is returned as is.
    pub async fn request(&self, method: Method, url: &str, opts: RequestOpts) -> Result<Response> {
        let mut target =
            reqwest::Url::parse(url).map_err(|e| SdkError::InvalidUrl(format!("{url}: {e}")))?;
        if !opts.query.is_empty() {
            target.query_pairs_mut().extend_pairs(opts.query.iter());
        }
        let ok_codes = opts
            .ok_codes
            .clone()
            .unwrap_or_else(|| default_ok_codes(&method));

        let retry = &self.provider.retry;
        let mut attempt = 0;
        loop {
            let mut builder = self
                .provider
                .http
                .request(method.clone(), target.clone())
                .header(ACCEPT, "application/json")
                .header(USER_AGENT, &self.provider.user_agent)
                .header(AUTH_TOKEN_HEADER, &self.provider.auth_token);
            if let Some(body) = &opts.body {
                builder = builder.json(body);
            }
            for (name, value) in &opts.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            debug!(method = %method, url = %target, "sending request");
            let response = builder.send().await.map_err(|source| SdkError::Transport {
                url: target.to_string(),
                source,
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|source| SdkError::Transport {
                url: target.to_string(),
                source,
            })?;
            debug!(method = %method, url = %target, status, "received response");

            if ok_codes.contains(&status) {
                return Ok(Response {
                    method: method.to_string(),
                    url: target.to_string(),
                    status,
                    body,
                });
            }

            if status == 429 && attempt < retry.max_retries {
                let delay = retry.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    url = %target,
                    attempt,
                    max_retries = retry.max_retries,
                    "rate limited, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let detail = ResponseDetail {
                method: method.to_string(),
                url: target.to_string(),
                status,
                body,
            };
            return Err(SdkError::from_response(detail, ok_codes));
        }
    }

    pub async fn get(&self, url: &str, opts: RequestOpts) -> Result<Response> {
        self.request(Method::GET, url, opts).await
    }

    pub async fn post(&self, url: &str, opts: RequestOpts) -> Result<Response> {
        self.request(Method::POST, url, opts).await
    }

    pub async fn put(&self, url: &str, opts: RequestOpts) -> Result<Response> {
        self.request(Method::PUT, url, opts).await
    }

    pub async fn patch(&self, url: &str, opts: RequestOpts) -> Result<Response> {
        self.request(Method::PATCH, url, opts).await
    }

    pub async fn delete(&self, url: &str, opts: RequestOpts) -> Result<Response> {
        self.request(Method::DELETE, url, opts).await
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ServiceClient {
        let provider = Arc::new(ProviderClient::from_http(reqwest::Client::new(), "token"));
        ServiceClient::new(
            provider,
            "https://dcs.cn-north-4.myhuaweicloud.com",
            "https://dcs.cn-north-4.myhuaweicloud.com/v2/0123/",
        )
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::from_secs(60));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(120));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_secs(960));
        assert_eq!(retry.delay_for_attempt(5), Duration::from_secs(1800));
        assert_eq!(retry.delay_for_attempt(9), Duration::from_secs(1800));
    }

    #[test]
    fn test_default_ok_codes() {
        assert_eq!(default_ok_codes(&Method::GET), vec![200]);
        assert_eq!(default_ok_codes(&Method::POST), vec![200, 201, 202]);
        assert_eq!(default_ok_codes(&Method::DELETE), vec![200, 202, 204]);
    }

    #[test]
    fn test_url_joining() {
        let c = client();
        assert_eq!(c.endpoint(), "https://dcs.cn-north-4.myhuaweicloud.com/");
        assert_eq!(
            c.url("/v2/0123/instances"),
            "https://dcs.cn-north-4.myhuaweicloud.com/v2/0123/instances"
        );
        assert_eq!(
            c.resource_url(&["instances", "abc", "resize"]),
            "https://dcs.cn-north-4.myhuaweicloud.com/v2/0123/instances/abc/resize"
        );
    }

    #[test]
    fn test_extract_key() {
        let response = Response {
            method: "POST".to_string(),
            url: "https://ga.myhuaweicloud.com/v1/accelerators".to_string(),
            status: 200,
            body: r#"{"accelerator":{"id":"acc-1"},"request_id":"r"}"#.to_string(),
        };
        let id: String = response
            .extract::<Value>("accelerator")
            .map(|v| v["id"].as_str().unwrap_or_default().to_string())
            .unwrap();
        assert_eq!(id, "acc-1");
        assert!(matches!(
            response.extract::<Value>("missing"),
            Err(SdkError::MissingKey(_))
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let provider = ProviderClient::from_http(reqwest::Client::new(), "super-secret");
        assert!(!format!("{:?}", provider).contains("super-secret"));
    }
}
