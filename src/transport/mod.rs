use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{PushError, WebSocketBufferConfig, WsFrame, WsTlsConfig};

pub mod tungstenite;

/// Boxed future returned by [`WsTransport::connect`].
pub type WsTransportConnectFuture<R, W> =
    Pin<Box<dyn Future<Output = Result<(R, W), PushError>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The push actor owns ordering state and policies; the transport only opens one bidirectional
/// message stream and splits it into a reader and a writer half.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = Result<WsFrame, PushError>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = PushError> + Send + Sync + Unpin + 'static;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
        tls: WsTlsConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer>;
}
