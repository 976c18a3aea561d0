//! Engine-wide configuration.
//!
//! A single struct with conservative defaults, passed down to a
//! [`crate::session::Session`] at construction.

use std::collections::HashMap;

/// Configuration for a headless session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// User agent string sent with outgoing requests and matched against robots.txt groups.
    pub user_agent: String,
    /// Viewport dimensions (used only to report grid-like positions, not for painting).
    pub viewport: Viewport,
    /// Timeout for page loads, in milliseconds.
    pub timeout_ms: u64,
    /// Extra HTTP headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Script execution timeout, in milliseconds.
    pub script_timeout_ms: u64,
    /// How long a single `HttpClient::tick` call may block, in milliseconds.
    pub tick_timeout_ms: u64,
    /// Spin interval used by `ScriptManager::blocking_get` while waiting on the
    /// reserved HTTP handle (no hard wall-clock deadline of its own).
    pub blocking_get_spin_ms: u64,
    /// Hard cap on the event propagation path length.
    pub max_propagation_path: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) HeadlessCore/0.1".to_string(),
            viewport: Viewport::default(),
            timeout_ms: 30_000,
            headers: HashMap::new(),
            script_timeout_ms: 5_000,
            tick_timeout_ms: 100,
            blocking_get_spin_ms: 200,
            max_propagation_path: 128,
        }
    }
}

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
