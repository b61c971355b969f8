use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, StatusCode, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{
    COMPLETION_DURATION, COMPLETION_REQUEST_ERRORS, COMPLETION_REQUESTS,
};
use crate::types::{ChatCompletion, ChatCompletionParams};

/// Default endpoint for OpenAI-compatible chat completions.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A service that turns an ordered conversation into a completion.
///
/// This is the seam between the session pipeline and the model provider;
/// tests substitute scripted implementations.
#[async_trait::async_trait]
pub trait Completer: Send + Sync {
    /// Runs one completion request.
    async fn complete(&self, params: ChatCompletionParams) -> Result<ChatCompletion>;
}

/// Client for an OpenAI-compatible chat-completion API.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAi")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAi {
    /// Create a new client for the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// `base_url` must name the API root (it gets `chat/completions`
    /// appended); a missing trailing slash is added.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::authentication("API key is empty"));
        }
        HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            Error::authentication("API key contains characters not allowed in a header")
        })?;

        let mut base = base_url.unwrap_or(DEFAULT_API_URL).to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// The API root requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        match response.text().await {
            Ok(body) => classify_error(status, &body, retry_after),
            Err(e) => Error::http_client(
                format!("Failed to read error response: {}", e),
                Some(Box::new(e)),
            ),
        }
    }

    /// Send a chat-completion request and wait for the full response.
    pub async fn send(&self, params: &ChatCompletionParams) -> Result<ChatCompletion> {
        let url = self.base_url.join("chat/completions")?;

        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(params)
            .send()
            .await
            .map_err(|e| Error::from_transport(e, Some(self.timeout.as_secs_f64())))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }
}

#[async_trait::async_trait]
impl Completer for OpenAi {
    async fn complete(&self, params: ChatCompletionParams) -> Result<ChatCompletion> {
        COMPLETION_REQUESTS.click();
        let start = Instant::now();
        let result = self.send(&params).await;
        COMPLETION_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            COMPLETION_REQUEST_ERRORS.click();
        }
        result
    }
}

/// Maps an unsuccessful HTTP status and its body onto an [`Error`].
pub(crate) fn classify_error(status: StatusCode, body: &str, retry_after: Option<u64>) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error);
    let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
    let error_param = detail.as_ref().and_then(|e| e.param.clone());
    let error_message = detail
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        400 => Error::bad_request(error_message, error_param),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        code => Error::api(code, error_type, error_message),
    }
}
