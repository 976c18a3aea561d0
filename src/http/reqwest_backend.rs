//! `reqwest`-backed [`HttpClient`], driven cooperatively from a single
//! thread via a current-thread `tokio` runtime and a `LocalSet` (requests
//! hold `!Send` `FnMut` callbacks, so tasks are spawned locally rather than
//! onto a worker pool).

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;

use crate::error::{Error, Result};

use super::{HttpClient, Method, RequestHandle, RequestParams};

pub struct ReqwestHttpClient {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    local: tokio::task::LocalSet,
    handles: HashMap<u64, tokio::task::JoinHandle<()>>,
    next_id: u64,
}

impl ReqwestHttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(Error::from)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            runtime,
            local: tokio::task::LocalSet::new(),
            handles: HashMap::new(),
            next_id: 0,
        })
    }

    fn spawn(&mut self, params: RequestParams) -> RequestHandle {
        let id = self.next_id;
        self.next_id += 1;

        let client = self.client.clone();
        let _guard = self.runtime.enter();
        let handle = self.local.spawn_local(run_request(client, params));
        self.handles.insert(id, handle);

        RequestHandle(id)
    }
}

async fn run_request(client: reqwest::Client, params: RequestParams) {
    let RequestParams {
        url,
        method,
        headers,
        body,
        mut start_cb,
        mut header_cb,
        mut data_cb,
        done_cb,
        error_cb,
    } = params;

    if let Some(cb) = start_cb.as_mut() {
        cb();
    }

    let mut builder = match method {
        Method::Get => client.get(&url),
        Method::Post => client.post(&url),
    };
    for (key, value) in &headers {
        builder = builder.header(key, value);
    }
    if let Some(body) = body {
        builder = builder.body(body);
    }

    let response = match builder.send().await {
        Ok(r) => r,
        Err(e) => {
            log::warn!("request to {url} failed: {e}");
            error_cb(e.to_string());
            return;
        }
    };

    let status = response.status().as_u16();
    let response_headers: HashMap<String, String> = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    if !header_cb(status, &response_headers) {
        error_cb(format!("rejected by header callback: status {status}"));
        return;
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => data_cb(&bytes),
            Err(e) => {
                log::warn!("stream error fetching {url}: {e}");
                error_cb(e.to_string());
                return;
            }
        }
    }

    done_cb();
}

impl HttpClient for ReqwestHttpClient {
    fn request(&mut self, params: RequestParams) -> RequestHandle {
        self.spawn(params)
    }

    fn blocking_request(&mut self, params: RequestParams) -> RequestHandle {
        // Same spawn path; callers distinguish it only by never competing
        // with the shared pool for a handle (there is no pool cap here, so
        // this is kept as a distinct entry point per the facade contract).
        self.spawn(params)
    }

    fn tick(&mut self, timeout_ms: u64) {
        let sleep = tokio::time::sleep(Duration::from_millis(timeout_ms));
        let local = &self.local;
        self.runtime.block_on(local.run_until(sleep));
        self.handles.retain(|_, h| !h.is_finished());
    }

    fn abort(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
