//! HTTP client facade: an async, callback-driven request API plus a
//! reserved-handle blocking variant, consumed by the script manager for
//! external script fetch and module dependency resolution.

pub mod reqwest_backend;

use std::collections::HashMap;

/// HTTP method used by a request. Kept deliberately small; the core only
/// ever issues `GET`s for scripts, `POST` is here for completeness/tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Callback-driven request description. Callbacks fire in order
/// (`start` → `header` → `data`* → `done`) on the thread that calls
/// [`HttpClient::tick`], or `error` in place of the remainder on failure.
pub struct RequestParams {
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub start_cb: Option<Box<dyn FnMut()>>,
    /// Receives the status code and response headers; returning `false`
    /// aborts the request with an error (used to enforce "status must be 200").
    pub header_cb: Box<dyn FnMut(u16, &HashMap<String, String>) -> bool>,
    pub data_cb: Box<dyn FnMut(&[u8])>,
    pub done_cb: Box<dyn FnOnce()>,
    pub error_cb: Box<dyn FnOnce(String)>,
}

impl RequestParams {
    pub fn get(url: impl Into<String>) -> RequestParamsBuilder {
        RequestParamsBuilder {
            url: url.into(),
            method: Method::Get,
            headers: HashMap::new(),
            body: None,
        }
    }
}

/// Builds a [`RequestParams`] incrementally; callbacks are supplied last via
/// [`RequestParamsBuilder::callbacks`] since they're rarely all needed at once.
pub struct RequestParamsBuilder {
    url: String,
    method: Method,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
}

impl RequestParamsBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn callbacks(
        self,
        start_cb: Option<Box<dyn FnMut()>>,
        header_cb: Box<dyn FnMut(u16, &HashMap<String, String>) -> bool>,
        data_cb: Box<dyn FnMut(&[u8])>,
        done_cb: Box<dyn FnOnce()>,
        error_cb: Box<dyn FnOnce(String)>,
    ) -> RequestParams {
        RequestParams {
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            start_cb,
            header_cb,
            data_cb,
            done_cb,
            error_cb,
        }
    }
}

/// Identifies one in-flight request for cancellation bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(pub u64);

/// The narrow HTTP surface consumed by the script manager.
pub trait HttpClient {
    /// Issues a request from the shared pool.
    fn request(&mut self, params: RequestParams) -> RequestHandle;

    /// Issues a request from a reserved handle, so pool exhaustion elsewhere
    /// can never starve it (used by `ScriptManager::blocking_get`).
    fn blocking_request(&mut self, params: RequestParams) -> RequestHandle;

    /// Drains I/O for at most `timeout_ms`, running any due callbacks.
    fn tick(&mut self, timeout_ms: u64);

    /// Cancels every outstanding request; their callbacks are never invoked.
    fn abort(&mut self);
}
