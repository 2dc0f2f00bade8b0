//! Persistent WebSocket client for live device telemetry and control.
//!
//! The client logs in, subscribes to one device, delivers attribute pushes
//! to registered handlers, and reconnects with exponential backoff until it
//! is closed or hits a fatal error.
//!
//! ```rust,ignore
//! use vaillant_api::{WebSocketClient, WebSocketConfig};
//!
//! let client = WebSocketClient::new(token, device, WebSocketConfig::default());
//! client.on_update(|event, payload| println!("{event}: {payload}"));
//!
//! let listener = client.clone();
//! let task = tokio::spawn(async move { listener.listen().await });
//! // ...
//! client.close().await;
//! task.await??;
//! ```

mod client;
mod connector;
mod dispatch;
mod protocol;
mod watchdog;

use std::time::Duration;

use serde::Serialize;
use strum::Display;

pub use client::{WebSocketClient, backoff_delay};
pub use connector::{Connector, FrameSink, FrameStream, TungsteniteConnector};
pub use dispatch::{
    AsyncSubscribeHandler, AsyncUpdateHandler, Dispatcher, SubscribeHandler, UpdateHandler,
};
pub use protocol::{AttrMap, ConnectRequest, Handshake, Inbound, Protocol};
pub use watchdog::{DEFAULT_WATCHDOG_TIMEOUT, Watchdog, WatchdogAction};

/// Host of the cloud-routed endpoint.
pub const DEFAULT_WS_HOST: &str = "vicapi.vaillant.com.cn";

/// Lifecycle of the client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Subscribed,
    Disconnected,
    /// Terminal; the client never leaves this state.
    Stopped,
}

/// Connection and retry settings for [`WebSocketClient`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub protocol: Protocol,
    /// Cloud-routed host; a leading scheme is ignored.
    pub api_host: String,
    /// Overrides the device-advertised (device-direct) or default
    /// (cloud-routed) port.
    pub port: Option<u16>,
    pub use_tls: bool,
    /// Silence before the watchdog sends a ping.
    pub heartbeat_interval: Duration,
    /// Consecutive failures tolerated before stopping; `None` retries forever.
    pub max_retries: Option<u32>,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Pause after a clean disconnect.
    pub reconnect_pause: Duration,
    /// Bound on opening the socket and on waiting for the login response.
    pub connect_timeout: Duration,
    /// Surface fatal non-auth failures from `listen()` instead of only
    /// logging them.
    pub propagate_fatal_errors: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            api_host: DEFAULT_WS_HOST.into(),
            port: None,
            use_tls: true,
            heartbeat_interval: DEFAULT_WATCHDOG_TIMEOUT,
            max_retries: None,
            retry_base: Duration::from_secs(10),
            retry_cap: Duration::from_secs(300),
            reconnect_pause: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),
            propagate_fatal_errors: false,
        }
    }
}
