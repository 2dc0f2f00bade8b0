use thiserror::Error;

/// Top-level error type for the `vaillant-api` crate.
///
/// Covers every failure mode across both API surfaces: the HTTP
/// account/device endpoints and the device WebSocket. The WebSocket
/// client uses [`is_recoverable`](Self::is_recoverable) to decide between
/// reconnecting with backoff and giving up.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected the username/password pair.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Access token rejected or expired -- log in again and build a new client.
    #[error("Authentication rejected -- re-login required")]
    InvalidAuth,

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-auth failure reported by the HTTP API.
    #[error("Request failed: {message}")]
    Request { message: String },

    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// Connect or login acknowledgement took too long.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The upgrade request was answered with something other than 101/401.
    #[error("Unexpected WebSocket upgrade response (HTTP {status})")]
    UnexpectedResponse { status: u16 },

    /// WebSocket connection failed or dropped during the handshake.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The server dropped the logical session (re-login or missed heartbeat).
    #[error("WebSocket server closed the session (code {code})")]
    WebSocketServerClosedConnection { code: i64 },

    /// The peer answered the login frame with something unexpected.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A persisted token blob could not be decoded.
    #[error("Invalid token blob: {0}")]
    TokenDecode(String),
}

impl Error {
    /// Returns `true` if the caller must re-authenticate.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::InvalidAuth | Self::InvalidCredentials)
    }

    /// Returns `true` if the WebSocket client should reconnect with backoff.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketServerClosedConnection { .. } => true,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
