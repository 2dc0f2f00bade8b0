// Socket factory seam.
//
// The state machine only needs a frame sink and a frame stream. Opening
// them goes through `Connector` so tests can script a peer in-process.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri, uri::InvalidUri};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};

use super::protocol::ConnectRequest;
use crate::error::Error;

/// Outbound half of an open socket.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
/// Inbound half of an open socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// Opens one physical WebSocket connection.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, Result<(FrameSink, FrameStream), Error>>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, Result<(FrameSink, FrameStream), Error>> {
        async move {
            let uri: Uri = request
                .url
                .as_str()
                .parse()
                .map_err(|e: InvalidUri| Error::WebSocketConnect(e.to_string()))?;

            let mut builder = ClientRequestBuilder::new(uri);
            for (name, value) in request.headers {
                builder = builder.with_header(name, value);
            }

            let (ws_stream, _response) = tokio_tungstenite::connect_async(builder)
                .await
                .map_err(map_connect_error)?;

            let (sink, stream) = ws_stream.split();
            let sink: FrameSink = Box::pin(sink);
            let stream: FrameStream = Box::pin(stream);
            Ok((sink, stream))
        }
        .boxed()
    }
}

/// A 401 on the upgrade is an auth rejection; other HTTP answers are a
/// protocol mismatch; everything else is a transport failure.
fn map_connect_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
            Error::InvalidAuth
        }
        tungstenite::Error::Http(resp) => Error::UnexpectedResponse {
            status: resp.status().as_u16(),
        },
        other => Error::WebSocketConnect(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_connect_errors() {
        assert!(matches!(
            map_connect_error(tungstenite::Error::ConnectionClosed),
            Error::WebSocketConnect(_)
        ));
        assert!(map_connect_error(tungstenite::Error::AlreadyClosed).is_recoverable());
    }
}
