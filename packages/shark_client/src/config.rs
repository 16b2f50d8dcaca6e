use std::time::Duration;

/// Interval between keep-alive pings on the push connection.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(20);
/// First delay before reconnecting a dropped push connection.
pub const DEFAULT_RECONNECT_INITIAL: Duration = Duration::from_secs(1);
/// Upper bound for the reconnect delay.
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Runtime configuration for the sync core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// REST base URL, e.g. `http://127.0.0.1:8000`
    pub http_base: String,
    /// Push channel URL, e.g. `ws://127.0.0.1:8000/ws`
    pub ws_url: String,
    pub keepalive_interval: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Per-request timeout for REST calls (None = wait indefinitely)
    pub request_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Config for a backend at `http_base`, with the push URL derived from it.
    pub fn new(http_base: impl Into<String>) -> Self {
        let http_base = http_base.into().trim_end_matches('/').to_string();
        let ws_url = derive_ws_url(&http_base);
        Self {
            http_base,
            ws_url,
            keepalive_interval: DEFAULT_KEEPALIVE,
            reconnect_initial: DEFAULT_RECONNECT_INITIAL,
            reconnect_max: DEFAULT_RECONNECT_MAX,
            request_timeout: None,
        }
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }
}

/// Map `http(s)://host/prefix` to `ws(s)://host/prefix/ws`.
pub fn derive_ws_url(http_base: &str) -> String {
    let base = http_base.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{swapped}/ws")
}
