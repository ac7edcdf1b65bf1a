use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use engram_core::{Result, VectorStoreError};
use serde_json::Value;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// A request against a backend's REST API, relative to the endpoint base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// The request a transport issues to decide whether a server is reachable.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthProbe {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl HealthProbe {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    fn request(&self) -> TransportRequest {
        TransportRequest::new(self.method, self.path.clone(), self.body.clone())
    }
}

/// Everything needed to build a client for one server.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub base_url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub health: HealthProbe,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, health: HealthProbe) -> Self {
        Self {
            base_url: base_url.into(),
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
            health,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The vendor boundary: a live client for one backend server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// Probe the server; an error means the client should not be used.
    async fn health_check(&self) -> Result<()>;
}

/// Builds transports for endpoints. Swapped out in tests.
pub trait TransportFactory: Send + Sync {
    fn build(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>>;
}

/// Production transport using reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Endpoint,
}

impl HttpTransport {
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| {
                VectorStoreError::transport("failed to build HTTP client", Some(Box::new(e)))
            })?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = format!("{}{}", self.endpoint.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };
        for (key, value) in &self.endpoint.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            VectorStoreError::transport(format!("HTTP request to {url} failed"), Some(Box::new(e)))
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            VectorStoreError::transport("failed to read response body", Some(Box::new(e)))
        })?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(TransportResponse { status, body })
    }

    async fn health_check(&self) -> Result<()> {
        let response = self.send(self.endpoint.health.request()).await?;
        if !response.is_success() {
            return Err(VectorStoreError::transport(
                format!(
                    "health check {} returned status {}",
                    self.endpoint.health.path, response.status
                ),
                None,
            ));
        }
        Ok(())
    }
}

/// Builds [`HttpTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn build(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::new(endpoint.clone())?))
    }
}

type ResponseQueue = VecDeque<Result<TransportResponse>>;

/// Test transport with queued responses and a log of received requests.
///
/// Responses may be queued from synchronous code at any time, including
/// while requests are in flight.
pub struct FakeTransport {
    responses: std::sync::Mutex<ResponseQueue>,
    requests: Mutex<Vec<TransportRequest>>,
    healthy: AtomicBool,
    health_checks: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            health_checks: AtomicUsize::new(0),
        }
    }

    /// Never held across an await; a poisoned queue is still usable.
    fn queue(&self) -> MutexGuard<'_, ResponseQueue> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_response(&self, status: u16, body: Value) -> &Self {
        self.queue()
            .push_back(Ok(TransportResponse::new(status, body)));
        self
    }

    pub fn push_ok(&self, body: Value) -> &Self {
        self.push_response(200, body)
    }

    pub fn push_error(&self, error: VectorStoreError) -> &Self {
        self.queue().push_back(Err(error));
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn health_check_count(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn last_request(&self) -> Option<TransportRequest> {
        self.requests.lock().await.last().cloned()
    }

    pub async fn pending_responses(&self) -> usize {
        self.queue().len()
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.requests.lock().await.push(request);
        let next = self.queue().pop_front();
        next.unwrap_or_else(|| Err(VectorStoreError::transport("FakeTransport exhausted", None)))
    }

    async fn health_check(&self) -> Result<()> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VectorStoreError::transport("FakeTransport unhealthy", None))
        }
    }
}

/// Hands out one shared [`FakeTransport`] and counts how often it was built.
pub struct FakeTransportFactory {
    transport: Arc<FakeTransport>,
    builds: AtomicUsize,
}

impl FakeTransportFactory {
    pub fn new(transport: Arc<FakeTransport>) -> Self {
        Self {
            transport,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl TransportFactory for FakeTransportFactory {
    fn build(&self, _endpoint: &Endpoint) -> Result<Arc<dyn Transport>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }
}
