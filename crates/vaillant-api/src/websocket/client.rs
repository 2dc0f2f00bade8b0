// Connection state machine and listen loop.
//
// `connect()` runs one attempt end-to-end: open the socket, perform the
// protocol handshake, pump inbound frames into the dispatcher, then map the
// outcome to retry-with-delay, pause, stop, or a propagated error.
// `listen()` repeats attempts until the state reaches STOPPED.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connector::{Connector, FrameSink, FrameStream, TungsteniteConnector};
use super::dispatch::Dispatcher;
use super::protocol::{AttrMap, Inbound};
use super::watchdog::{Watchdog, WatchdogAction};
use super::{ConnectionState, WebSocketConfig};
use crate::error::Error;
use crate::model::{Device, EVT_DEVICE_ATTR_UPDATE, Token};

/// Delay before the next attempt after `retries` consecutive failures.
///
/// `min(base * 2^(retries - 1), cap)`: half the base for the first failure,
/// then `base`, `2 * base`, ... up to `cap`.
pub fn backoff_delay(retries: u32, base: Duration, cap: Duration) -> Duration {
    let delay = match retries {
        0 => base / 2,
        n => base.saturating_mul(2u32.saturating_pow(n - 1)),
    };
    delay.min(cap)
}

// ── WebSocketClient ──────────────────────────────────────────────────

/// Persistent WebSocket client bound to one device.
///
/// Cheap to clone; all clones drive the same connection. Typical use is
/// one task running [`listen`](Self::listen) while others call
/// [`send_command`](Self::send_command) and finally [`close`](Self::close).
#[derive(Clone)]
pub struct WebSocketClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    token: Token,
    device: Device,
    config: WebSocketConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    retries: AtomicU32,
    sink: Mutex<Option<FrameSink>>,
    watchdog: Watchdog,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

impl WebSocketClient {
    pub fn new(token: Token, device: Device, config: WebSocketConfig) -> Self {
        Self::with_connector(token, device, config, Arc::new(TungsteniteConnector))
    }

    /// Create a client that opens sockets through `connector`.
    pub fn with_connector(
        token: Token,
        device: Device,
        config: WebSocketConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let weak = weak.clone();
            let action: WatchdogAction = Arc::new(move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.ping().await;
                    }
                }
                .boxed()
            });
            let (state, _) = watch::channel(ConnectionState::Disconnected);

            ClientInner {
                watchdog: Watchdog::new(config.heartbeat_interval, action),
                token,
                device,
                config,
                connector,
                state,
                retries: AtomicU32::new(0),
                sink: Mutex::new(None),
                dispatcher: Dispatcher::new(),
                cancel: CancellationToken::new(),
            }
        });
        Self { inner }
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Consecutive failed attempts since the last reset.
    pub fn retry_count(&self) -> u32 {
        self.inner.retries.load(Ordering::SeqCst)
    }

    // ── Handler registration ─────────────────────────────────────────

    pub fn on_subscribe<F>(&self, handler: F)
    where
        F: Fn(&AttrMap) + Send + Sync + 'static,
    {
        self.inner.dispatcher.set_on_subscribe(Arc::new(handler));
    }

    pub fn async_on_subscribe<F, Fut>(&self, handler: F)
    where
        F: Fn(AttrMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .dispatcher
            .set_async_on_subscribe(Arc::new(move |attrs: AttrMap| handler(attrs).boxed()));
    }

    pub fn on_update<F>(&self, handler: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.inner.dispatcher.set_on_update(Arc::new(handler));
    }

    pub fn async_on_update<F, Fut>(&self, handler: F)
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.dispatcher.set_async_on_update(Arc::new(
            move |event: String, payload: Value| handler(event, payload).boxed(),
        ));
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run a single connection attempt.
    ///
    /// Returns `Ok` for every outcome the listen loop absorbs (retry,
    /// pause, or a silent stop). Errors are auth rejections and, when
    /// [`WebSocketConfig::propagate_fatal_errors`] is set, other fatal
    /// failures; in both cases the state is STOPPED.
    pub async fn connect(&self) -> Result<(), Error> {
        let inner = &self.inner;
        if inner.state() == ConnectionState::Stopped {
            debug!("client stopped, not connecting");
            return Ok(());
        }
        inner.transition(ConnectionState::Connecting);
        let outcome = inner.run_session().await;
        inner.teardown().await;
        inner.settle(outcome).await
    }

    /// Keep connecting until STOPPED.
    pub async fn listen(&self) -> Result<(), Error> {
        self.inner.retries.store(0, Ordering::SeqCst);
        info!(device = %self.inner.device.id, "listening for device updates");

        while self.state() != ConnectionState::Stopped {
            self.connect().await?;
        }

        info!(device = %self.inner.device.id, "websocket client stopped");
        Ok(())
    }

    /// Stop the client and close the socket if one is open.
    ///
    /// Interrupts an in-flight connect, read, or backoff sleep. A failing
    /// transport close is logged and swallowed.
    pub async fn close(&self) {
        info!(device = %self.inner.device.id, "closing websocket client");
        self.inner.stop();
        self.inner.cancel.cancel();
        self.inner.watchdog.cancel();

        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                warn!(error = %e, "error while closing websocket");
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send an arbitrary command frame.
    ///
    /// Silently does nothing while STOPPED or DISCONNECTED, or when no
    /// socket is open.
    pub async fn send_command(&self, name: &str, payload: Option<Value>) -> Result<(), Error> {
        let frame = self
            .inner
            .config
            .protocol
            .command(&self.inner.device, name, payload);
        self.inner.send_guarded(&frame).await
    }

    /// Write attributes on the bound device.
    pub async fn write_attrs(&self, attrs: AttrMap) -> Result<(), Error> {
        let frame = self
            .inner
            .config
            .protocol
            .write_attrs(&self.inner.device, attrs);
        self.inner.send_guarded(&frame).await
    }

    /// Send a heartbeat ping. Failures are logged.
    pub async fn ping(&self) {
        self.inner.ping().await;
    }
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("device", &self.inner.device.id)
            .field("protocol", &self.inner.config.protocol)
            .field("state", &self.state())
            .field("retries", &self.retry_count())
            .finish_non_exhaustive()
    }
}

// ── State machine ────────────────────────────────────────────────────

impl ClientInner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move to `next`. STOPPED is terminal; returns whether the state changed.
    fn transition(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Stopped || *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "connection state change");
            *state = next;
            true
        })
    }

    fn stop(&self) {
        self.transition(ConnectionState::Stopped);
    }

    /// Open the socket, handshake, and pump frames until the peer goes away
    /// or the client stops.
    async fn run_session(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let request = self
            .config
            .protocol
            .connect_request(&self.token, &self.device, &self.config)?;
        info!(url = %request.url, protocol = %self.config.protocol, "connecting websocket");

        let connect_timeout = self.config.connect_timeout;
        let (sink, mut stream) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(connect_timeout, self.connector.connect(request)) => {
                result.map_err(|_| Error::Timeout { timeout_secs: connect_timeout.as_secs() })??
            }
        };
        *self.sink.lock().await = Some(sink);

        let handshake = self.config.protocol.handshake(&self.token, &self.device);
        if let Some(login) = handshake.login {
            debug!(uid = %self.token.uid, "sending login request");
            self.send_required(&login).await?;
            self.await_login(&mut stream).await?;
            if self.cancel.is_cancelled() {
                return Ok(());
            }
        }
        for frame in &handshake.frames {
            debug!("Send: {}", frame);
            self.send_required(frame).await?;
        }

        self.transition(ConnectionState::Connected);
        info!(device = %self.device.id, "websocket connected");
        self.watchdog.trigger();

        loop {
            if self.state() == ConnectionState::Stopped {
                break;
            }

            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await?,
                Some(Ok(Message::Close(frame))) => {
                    warn!(?frame, "websocket server closing");
                    break;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(len = bytes.len(), "ignoring binary frame");
                }
                // control frames are answered by the transport
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "websocket error");
                    break;
                }
                None => {
                    warn!("websocket connection closed");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Wait for the single login response frame.
    async fn await_login(&self, stream: &mut FrameStream) -> Result<(), Error> {
        let timeout = self.config.connect_timeout;
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                next = tokio::time::timeout(timeout, stream.next()) => {
                    next.map_err(|_| Error::Timeout { timeout_secs: timeout.as_secs() })?
                }
            };

            let text = match next {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(_))) => {
                    return Err(Error::Handshake("binary frame in place of login response".into()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Error::WebSocketConnect("socket closed during login".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            };

            debug!("Recv: {}", text.as_str());
            let frame: Value = serde_json::from_str(text.as_str())
                .map_err(|e| Error::Handshake(format!("login response is not JSON: {e}")))?;

            return match self.config.protocol.classify(&frame) {
                Inbound::LoginResponse { success: true } => {
                    debug!("login accepted");
                    Ok(())
                }
                Inbound::LoginResponse { success: false } => Err(Error::InvalidAuth),
                other => Err(Error::Handshake(format!(
                    "expected login response, got {other:?}"
                ))),
            };
        }
    }

    async fn handle_text(&self, text: &str) -> Result<(), Error> {
        debug!("Recv: {}", text);
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring malformed frame");
                return Ok(());
            }
        };

        match self.config.protocol.classify(&frame) {
            Inbound::Attributes { device_id, attrs } if device_id == self.device.id => {
                self.on_attributes(attrs).await;
            }
            Inbound::Attributes { device_id, .. } => {
                debug!(%device_id, "ignoring attributes for another device");
            }
            Inbound::Pong => {
                debug!("received pong");
                self.watchdog.trigger();
            }
            Inbound::SessionClosed { code } => {
                return Err(Error::WebSocketServerClosedConnection { code });
            }
            Inbound::LoginResponse { .. } | Inbound::Unhandled => {
                info!("Unhandled msg: {}", frame);
            }
        }
        Ok(())
    }

    async fn on_attributes(&self, attrs: AttrMap) {
        debug!(device = %self.device.id, count = attrs.len(), "received attributes");

        if self.state() != ConnectionState::Subscribed {
            self.dispatcher.subscribe(&attrs).await;
            if self.transition(ConnectionState::Subscribed) {
                self.retries.store(0, Ordering::SeqCst);
                info!(device = %self.device.id, "subscribed");
            }
        }

        let payload = json!({ "data": attrs });
        self.dispatcher.update(EVT_DEVICE_ATTR_UPDATE, &payload).await;
    }

    async fn teardown(&self) {
        self.watchdog.cancel();
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "socket already closed");
            }
        }
    }

    /// Map an attempt's outcome to the listen loop's next step.
    async fn settle(&self, outcome: Result<(), Error>) -> Result<(), Error> {
        match outcome {
            Ok(()) => {
                if self.state() != ConnectionState::Stopped {
                    self.transition(ConnectionState::Disconnected);
                    info!(
                        pause_secs = self.config.reconnect_pause.as_secs(),
                        "websocket disconnected, reconnecting"
                    );
                    self.pause(self.config.reconnect_pause).await;
                }
                Ok(())
            }
            Err(err) if err.is_auth_expired() => {
                self.stop();
                warn!(error = %err, "websocket server rejected credentials");
                Err(err)
            }
            Err(err @ Error::UnexpectedResponse { .. }) => {
                self.stop();
                error!(error = %err, "unexpected response received");
                self.fatal(err)
            }
            Err(err) if err.is_recoverable() => {
                self.schedule_retry(&err).await;
                Ok(())
            }
            Err(err) => {
                if self.state() != ConnectionState::Stopped {
                    error!(error = %err, "unexpected websocket failure, stopping");
                    self.stop();
                }
                self.fatal(err)
            }
        }
    }

    fn fatal(&self, err: Error) -> Result<(), Error> {
        if self.config.propagate_fatal_errors {
            Err(err)
        } else {
            Ok(())
        }
    }

    async fn schedule_retry(&self, err: &Error) {
        let retries = self.retries.load(Ordering::SeqCst);
        if let Some(max) = self.config.max_retries {
            if retries >= max {
                error!(retries, "too many retry attempts, giving up");
                self.stop();
                return;
            }
        }
        if self.state() == ConnectionState::Stopped {
            return;
        }

        let delay = backoff_delay(retries, self.config.retry_base, self.config.retry_cap);
        self.retries.fetch_add(1, Ordering::SeqCst);
        error!(
            delay_secs = delay.as_secs_f64(),
            error = %err,
            "websocket connection failed, retrying"
        );
        self.transition(ConnectionState::Disconnected);
        self.pause(delay).await;
    }

    /// Sleep unless the client is closed first.
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write one frame. Returns `false` when no socket is open.
    async fn write_frame(&self, frame: &Value) -> Result<bool, Error> {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Ok(false);
        };
        sink.send(Message::text(frame.to_string()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
        Ok(true)
    }

    async fn send_required(&self, frame: &Value) -> Result<(), Error> {
        if self.write_frame(frame).await? {
            Ok(())
        } else {
            Err(Error::WebSocketConnect("socket closed during handshake".into()))
        }
    }

    async fn send_guarded(&self, frame: &Value) -> Result<(), Error> {
        let state = self.state();
        if matches!(state, ConnectionState::Stopped | ConnectionState::Disconnected) {
            debug!(%state, "not connected, dropping command");
            return Ok(());
        }
        debug!("Send: {}", frame);
        if !self.write_frame(frame).await? {
            debug!("no open socket, dropping command");
        }
        Ok(())
    }

    async fn ping(&self) {
        let frame = self.config.protocol.ping();
        match self.write_frame(&frame).await {
            Ok(true) => debug!("sent ping"),
            Ok(false) => error!("cannot send ping: no open socket"),
            Err(e) => error!(error = %e, "cannot send ping"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
