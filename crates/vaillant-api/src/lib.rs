// vaillant-api: Async Rust client for the Vaillant Plus (China) cloud (HTTP + device WebSocket)

pub mod client;
pub mod error;
pub mod model;
pub mod transport;
pub mod websocket;

pub use client::{ApiClient, ApiConfig, DEFAULT_API_URL, DEFAULT_APP_URL};
pub use error::Error;
pub use model::{Device, DeviceInfo, EVT_DEVICE_ATTR_UPDATE, Token};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{
    AttrMap, ConnectionState, Connector, Protocol, WebSocketClient, WebSocketConfig,
};
