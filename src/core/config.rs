use std::time::Duration;

use url::Url;

use super::reconnect::ReconnectPolicy;
use super::reorder::ReorderPolicy;
use super::types::{PushError, PushResult, WebSocketBufferConfig, WsTlsConfig};

/// Well-known path of the status push endpoint, relative to the page origin.
pub const STATUS_PATH: &str = "/api/ws/status";

/// Everything the push client needs to run one logical connection.
#[derive(Clone, Debug)]
pub struct PushConfig {
    pub url: String,
    pub tls: WsTlsConfig,
    pub buffers: WebSocketBufferConfig,
    pub heartbeat_interval: Duration,
    pub reorder: ReorderPolicy,
    pub reconnect: ReconnectPolicy,
}

impl PushConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tls: WsTlsConfig::default(),
            buffers: WebSocketBufferConfig::default(),
            heartbeat_interval: Duration::from_secs(30),
            reorder: ReorderPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Derive the endpoint from a page origin such as `https://host:8080`.
    ///
    /// Secure origins map to `wss://`, everything else to `ws://`.
    pub fn for_origin(origin: &str) -> PushResult<Self> {
        endpoint_for_origin(origin).map(Self::new)
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reorder(mut self, reorder: ReorderPolicy) -> Self {
        self.reorder = reorder;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_tls(mut self, tls: WsTlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_buffers(mut self, buffers: WebSocketBufferConfig) -> Self {
        self.buffers = buffers;
        self
    }
}

/// Map an HTTP(S) origin to the websocket status endpoint.
pub fn endpoint_for_origin(origin: &str) -> PushResult<String> {
    let invalid = |reason: &str| PushError::InvalidUrl {
        url: origin.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(origin).map_err(|err| invalid(&err.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("origin has no host"));
    }
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(invalid(&format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid("scheme rewrite rejected"))?;
    url.set_path(STATUS_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.into())
}
