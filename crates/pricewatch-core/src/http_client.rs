use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default per-request timeout applied by adapters.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Authentication strategy applied to outgoing HTTP requests.
#[derive(Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
    Header { name: String, value: String },
}

impl HttpAuth {
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::None => {}
            Self::BearerToken(token) => {
                headers.insert(String::from("authorization"), format!("Bearer {token}"));
            }
            Self::Header { name, value } => {
                headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }
    }
}

impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
            Self::Header { name, .. } => write!(f, "Header({name}: <redacted>)"),
        }
    }
}

/// GET request envelope used by adapter transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
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

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// HTTP response envelope returned by an adapter transport.
///
/// The body is kept as raw bytes because some upstreams answer in GBK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body.into().into_bytes())
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    retryable: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
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

/// Adapter transport contract that supports async execution and auth-aware requests.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client using reqwest for real API calls.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("pricewatch/", env!("CARGO_PKG_VERSION")))
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
                .get(&request.url)
                .timeout(Duration::from_millis(request.timeout_ms));

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::new(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(format!("connection failed: {e}"))
                } else if e.is_builder() {
                    HttpError::non_retryable(format!("invalid request: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse::new(status, body.to_vec()))
        })
    }
}

#[derive(Debug, Clone)]
enum ScriptedReply {
    Respond(HttpResponse),
    Fail(HttpError),
}

/// Offline transport that answers from a table of URL prefixes and records
/// every request it sees.
///
/// The longest matching prefix wins; unmatched URLs get a 404.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<(String, ScriptedReply)>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url_prefix: impl Into<String>, response: HttpResponse) -> Self {
        self.set_route(url_prefix, response);
        self
    }

    pub fn with_json(self, url_prefix: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_route(url_prefix, HttpResponse::ok_json(body))
    }

    pub fn with_failure(self, url_prefix: impl Into<String>, error: HttpError) -> Self {
        self.insert(url_prefix.into(), ScriptedReply::Fail(error));
        self
    }

    /// Delays every reply, which keeps a poll cycle in flight long enough to
    /// observe overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the reply for `url_prefix` on a client that is already shared.
    pub fn set_route(&self, url_prefix: impl Into<String>, response: HttpResponse) {
        self.insert(url_prefix.into(), ScriptedReply::Respond(response));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("scripted request log should not be poisoned")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("scripted request log should not be poisoned")
            .len()
    }

    fn insert(&self, prefix: String, reply: ScriptedReply) {
        let mut routes = self
            .routes
            .lock()
            .expect("scripted routes should not be poisoned");
        routes.retain(|(existing, _)| *existing != prefix);
        routes.push((prefix, reply));
    }

    fn reply_for(&self, url: &str) -> ScriptedReply {
        let routes = self
            .routes
            .lock()
            .expect("scripted routes should not be poisoned");
        routes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| {
                ScriptedReply::Respond(HttpResponse::new(404, format!("no route for {url}")))
            })
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let reply = self.reply_for(&request.url);
            self.requests
                .lock()
                .expect("scripted request log should not be poisoned")
                .push(request);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match reply {
                ScriptedReply::Respond(response) => Ok(response),
                ScriptedReply::Fail(error) => Err(error),
            }
        })
    }
}
