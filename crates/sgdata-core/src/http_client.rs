use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Authentication applied to outgoing requests.
///
/// data.gov.sg accepts an optional key in the `x-api-key` header; requests
/// without one are still served under the anonymous quota.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HttpAuth {
    #[default]
    None,
    Header { name: String, value: String },
}

impl HttpAuth {
    pub fn api_key(value: impl Into<String>) -> Self {
        Self::Header {
            name: String::from("x-api-key"),
            value: value.into(),
        }
    }

    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::None => {}
            Self::Header { name, value } => {
                headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }
    }
}

/// GET request issued by the fetcher.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self.headers);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Full URL with the query string percent-encoded.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }

        let query = self
            .query
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url)
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

// Headers can carry the API key, keep it out of debug output.
impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
    retryable: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Other,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Timeout,
            ..Self::new(message)
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Connect,
            ..Self::new(message)
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(message)
        }
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract used by the fetcher.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("sgdata/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(request.full_url())
                .timeout(Duration::from_millis(request.timeout_ms));

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::connect(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("timeout reading response body: {e}"))
                } else {
                    HttpError::new(format!("failed to read response body: {e}"))
                }
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

#[derive(Debug)]
struct FixtureRoute {
    url_fragment: String,
    responses: VecDeque<FixtureReply>,
}

#[derive(Debug, Clone)]
enum FixtureReply {
    Respond(Result<HttpResponse, HttpError>),
    Delay(Duration, Result<HttpResponse, HttpError>),
}

#[derive(Debug, Default)]
struct FixtureState {
    routes: Vec<FixtureRoute>,
    requests: Vec<HttpRequest>,
}

/// Deterministic offline transport.
///
/// Responses are queued per URL fragment and served in order; the last
/// response of a route keeps being served once the queue drains. Every
/// request is recorded for later inspection.
#[derive(Debug, Clone, Default)]
pub struct FixtureHttpClient {
    state: Arc<Mutex<FixtureState>>,
}

impl FixtureHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url_fragment: impl Into<String>, response: HttpResponse) -> Self {
        self.push(url_fragment.into(), FixtureReply::Respond(Ok(response)))
    }

    pub fn respond_json(self, url_fragment: impl Into<String>, body: &serde_json::Value) -> Self {
        self.respond(url_fragment, HttpResponse::ok_json(body.to_string()))
    }

    pub fn fail(self, url_fragment: impl Into<String>, error: HttpError) -> Self {
        self.push(url_fragment.into(), FixtureReply::Respond(Err(error)))
    }

    /// Serves `response` only after `delay` has elapsed.
    pub fn respond_after(
        self,
        url_fragment: impl Into<String>,
        delay: Duration,
        response: HttpResponse,
    ) -> Self {
        self.push(url_fragment.into(), FixtureReply::Delay(delay, Ok(response)))
    }

    /// Recorded requests, in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, url_fragment: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.url.contains(url_fragment))
            .count()
    }

    fn push(self, url_fragment: String, reply: FixtureReply) -> Self {
        {
            let mut state = self.lock();
            match state
                .routes
                .iter_mut()
                .find(|route| route.url_fragment == url_fragment)
            {
                Some(route) => route.responses.push_back(reply),
                None => state.routes.push(FixtureRoute {
                    url_fragment,
                    responses: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    fn next_reply(&self, request: &HttpRequest) -> FixtureReply {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let url = request.full_url();
        let route = state
            .routes
            .iter_mut()
            .find(|route| url.contains(route.url_fragment.as_str()));

        match route {
            Some(route) if route.responses.len() > 1 => route
                .responses
                .pop_front()
                .unwrap_or_else(|| not_found(&url)),
            Some(route) => route
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| not_found(&url)),
            None => not_found(&url),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixtureState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn not_found(url: &str) -> FixtureReply {
    FixtureReply::Respond(Ok(HttpResponse::with_status(
        404,
        format!("{{\"error\":\"no fixture for {url}\"}}"),
    )))
}

impl HttpClient for FixtureHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let reply = self.next_reply(&request);
        Box::pin(async move {
            match reply {
                FixtureReply::Respond(result) => result,
                FixtureReply::Delay(delay, result) => {
                    tokio::time::sleep(delay).await;
                    result
                }
            }
        })
    }
}
