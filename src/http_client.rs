use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

/// Request timeout for every outbound call
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP method enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    GET,
    POST,
}

/// A very simple version that only holds response data
#[derive(Debug, Clone)]
pub struct SimpleHttpResponse {
    /// HTTP status code
    status_code: u16,
    /// Response body
    body: String,
}

impl SimpleHttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status_code: status,
            body: body.into(),
        }
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// Get a reference to the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Check if successful (2xx status)
    pub fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}

/// Headers carrying `Authorization: Bearer <token>`
pub fn bearer_headers(token: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    headers
}

/// Trait for HTTP client operations, allowing for mocking
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform HTTP GET request and return a SimpleHttpResponse
    async fn get(&self, url: &str, headers: HashMap<String, String>) -> Result<SimpleHttpResponse>;

    /// Perform HTTP POST request and return a SimpleHttpResponse
    async fn post(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<SimpleHttpResponse>;
}

/// Implementation of HttpClient using reqwest
pub struct ReqwestHttpClient {
    /// Internal reqwest client
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient with a request timeout
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Create a new client with custom configuration
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: HashMap<String, String>) -> Result<SimpleHttpResponse> {
        let mut request = self.client.get(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(SimpleHttpResponse::new(status, body))
    }

    async fn post(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<SimpleHttpResponse> {
        let mut request = self.client.post(url).body(body);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(SimpleHttpResponse::new(status, body))
    }
}

/// Mock implementation of HttpClient for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A request observed by the mock
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub url: String,
        pub method: HttpMethod,
        pub headers: HashMap<String, String>,
        pub body: Option<String>,
    }

    /// A mock HTTP client that returns predefined responses
    #[derive(Default)]
    pub struct MockHttpClient {
        /// Map of URLs to responses
        responses: Arc<Mutex<HashMap<String, SimpleHttpResponse>>>,
        /// Record of requests made
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl MockHttpClient {
        /// Create a new mock client
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a mock response for a URL
        pub fn mock_response(&self, url: impl Into<String>, status: u16, body: impl Into<String>) {
            let response = SimpleHttpResponse::new(status, body);
            self.responses.lock().unwrap().insert(url.into(), response);
        }

        /// Mock a successful JSON response (status 200)
        pub fn mock_success_json<T: serde::Serialize>(
            &self,
            url: impl Into<String>,
            data: &T,
        ) -> Result<()> {
            let body = serde_json::to_string(data)?;
            self.mock_response(url, 200, body);
            Ok(())
        }

        /// Get the list of recorded requests
        pub fn get_requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn record_request(
            &self,
            url: &str,
            method: HttpMethod,
            headers: HashMap<String, String>,
            body: Option<String>,
        ) {
            self.requests.lock().unwrap().push(RecordedRequest {
                url: url.to_string(),
                method,
                headers,
                body,
            });
        }

        /// Get mock response for URL (cloned)
        fn get_response_for(&self, url: &str) -> Result<SimpleHttpResponse> {
            let responses = self.responses.lock().unwrap();
            responses
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("No mock response configured for URL: {}", url))
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for MockHttpClient {
        async fn get(
            &self,
            url: &str,
            headers: HashMap<String, String>,
        ) -> Result<SimpleHttpResponse> {
            self.record_request(url, HttpMethod::GET, headers, None);
            self.get_response_for(url)
        }

        async fn post(
            &self,
            url: &str,
            headers: HashMap<String, String>,
            body: String,
        ) -> Result<SimpleHttpResponse> {
            self.record_request(url, HttpMethod::POST, headers, Some(body));
            self.get_response_for(url)
        }
    }
}
