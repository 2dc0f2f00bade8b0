// Scripted in-process peer for WebSocket state-machine tests.
//
// `FakeConnector` hands out one scripted `Attempt` per connect call. An open
// attempt is backed by a `Peer` that records every frame the client sends,
// answers through a responder closure, and can push frames on demand.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Sink};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::{self, Message};

use vaillant_api::websocket::{ConnectRequest, FrameSink, FrameStream};
use vaillant_api::{Connector, Device, Error, Token};

pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

// ── Fixtures ────────────────────────────────────────────────────────

pub fn token() -> Token {
    Token::new("appid_test", "daxingplay", "password", "token_test", "uid_test")
}

pub fn device() -> Device {
    Device {
        id: "1".into(),
        mac: "abcd123456".into(),
        product_key: "test_prd_key".into(),
        product_name: "test_prd_name".into(),
        host: "127.0.0.1".into(),
        ws_port: 8080,
        is_online: true,
        ..Device::default()
    }
}

pub fn noti(did: &str, attrs: Value) -> Value {
    json!({ "cmd": "s2c_noti", "data": { "did": did, "attrs": attrs } })
}

/// Device-direct peer: accepts the login (or rejects it), answers
/// `c2s_read` with `on_read`, and answers pings with pongs.
pub fn device_direct(login_ok: bool, on_read: Vec<Value>) -> Responder {
    Arc::new(move |frame: &Value| match frame["cmd"].as_str() {
        Some("login_req") => vec![json!({ "cmd": "login_res", "data": { "success": login_ok } })],
        Some("c2s_read") => on_read.clone(),
        Some("ping") => vec![json!({ "cmd": "pong" })],
        _ => Vec::new(),
    })
}

// ── Peer ────────────────────────────────────────────────────────────

pub struct Peer {
    sent: Mutex<Vec<Value>>,
    closed: Mutex<bool>,
    inbound: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<Message, tungstenite::Error>>>>,
    responder: Responder,
    fail_close: bool,
}

impl Peer {
    pub fn new(responder: Responder) -> Arc<Self> {
        Self::build(responder, false)
    }

    /// Peer whose transport close always errors.
    pub fn with_failing_close(responder: Responder) -> Arc<Self> {
        Self::build(responder, true)
    }

    fn build(responder: Responder, fail_close: bool) -> Arc<Self> {
        let (inbound, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
            inbound,
            receiver: Mutex::new(Some(receiver)),
            responder,
            fail_close,
        })
    }

    /// Frames the client has sent, in order.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self, cmd: &str) -> usize {
        self.sent()
            .iter()
            .filter(|frame| frame["cmd"] == cmd || frame["type"] == cmd)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    pub fn push(&self, frame: Value) {
        let _ = self.inbound.send(Ok(Message::text(frame.to_string())));
    }

    /// Polite close from the server side.
    pub fn hang_up(&self) {
        let _ = self.inbound.send(Ok(Message::Close(None)));
    }

    fn record(&self, message: Message) {
        let Message::Text(text) = message else {
            return;
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        let replies = (self.responder)(&frame);
        self.sent.lock().unwrap().push(frame);
        for reply in replies {
            self.push(reply);
        }
    }

    fn open(self: &Arc<Self>) -> (FrameSink, FrameStream) {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("peer opened twice");
        let sink: FrameSink = Box::pin(PeerSink {
            peer: Arc::clone(self),
        });
        let stream: FrameStream = Box::pin(UnboundedReceiverStream::new(receiver));
        (sink, stream)
    }
}

struct PeerSink {
    peer: Arc<Peer>,
}

impl Sink<Message> for PeerSink {
    type Error = tungstenite::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.peer.record(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.peer.fail_close {
            return Poll::Ready(Err(tungstenite::Error::AlreadyClosed));
        }
        *self.peer.closed.lock().unwrap() = true;
        Poll::Ready(Ok(()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

pub enum Attempt {
    Open(Arc<Peer>),
    Refuse(fn() -> Error),
}

pub fn refused() -> Error {
    Error::WebSocketConnect("connection refused".into())
}

pub struct FakeConnector {
    script: Mutex<VecDeque<Attempt>>,
    fallback: Box<dyn Fn() -> Attempt + Send + Sync>,
    peers: Mutex<Vec<Arc<Peer>>>,
    requests: Mutex<Vec<ConnectRequest>>,
    connect_times: Mutex<Vec<Instant>>,
}

impl FakeConnector {
    /// Plays `script` in order, then refuses every further connect.
    pub fn scripted(script: Vec<Attempt>) -> Arc<Self> {
        Self::with_fallback(script, || Attempt::Refuse(refused))
    }

    /// Plays `script` in order, then answers with `fallback()`.
    pub fn with_fallback(
        script: Vec<Attempt>,
        fallback: impl Fn() -> Attempt + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: Box::new(fallback),
            peers: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            connect_times: Mutex::new(Vec::new()),
        })
    }

    pub fn connects(&self) -> usize {
        self.connect_times.lock().unwrap().len()
    }

    /// Whole seconds between consecutive connect calls.
    pub fn gaps_secs(&self) -> Vec<u64> {
        let times = self.connect_times.lock().unwrap();
        times
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_secs())
            .collect()
    }

    pub fn peer(&self, index: usize) -> Arc<Peer> {
        Arc::clone(&self.peers.lock().unwrap()[index])
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> BoxFuture<'_, Result<(FrameSink, FrameStream), Error>> {
        self.connect_times.lock().unwrap().push(Instant::now());
        self.requests.lock().unwrap().push(request);

        let next = self.script.lock().unwrap().pop_front();
        let attempt = next.unwrap_or_else(|| (self.fallback)());
        let result = match attempt {
            Attempt::Open(peer) => {
                self.peers.lock().unwrap().push(Arc::clone(&peer));
                Ok(peer.open())
            }
            Attempt::Refuse(error) => Err(error()),
        };
        async move { result }.boxed()
    }
}
