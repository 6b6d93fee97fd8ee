//! WebSocket transport to a remote PTY host

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use termbridge_protocol::{encode_frame, ClientFrame, HostMessage, SessionId};
use termbridge_utils::{Result, TermbridgeError};

use super::{Connector, TransportHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects each session to `<base>/<path>/<session_id>`
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base: Url,
    path: Vec<String>,
}

impl WebSocketConnector {
    /// Create a connector for a host
    ///
    /// `http`/`https` base URLs are mapped onto `ws`/`wss`.
    pub fn new(base_url: &str, path: &str) -> Result<Self> {
        let invalid = |message: String| TermbridgeError::InvalidUrl {
            url: base_url.to_string(),
            message,
        };

        let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        let scheme = match base.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        };
        base.set_scheme(scheme)
            .map_err(|_| invalid(format!("cannot use scheme '{}'", scheme)))?;
        if base.host_str().is_none() {
            return Err(invalid("missing host".into()));
        }

        let path = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self { base, path })
    }

    /// Connection target for a session
    pub fn session_url(&self, session_id: &SessionId) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| TermbridgeError::InvalidUrl {
                url: self.base.to_string(),
                message: "URL cannot carry a path".into(),
            })?;
            segments.pop_if_empty();
            segments.extend(self.path.iter());
            segments.push(session_id.as_str());
        }
        Ok(url)
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, session_id: &SessionId) -> BoxFuture<'static, Result<TransportHandle>> {
        let target = self.session_url(session_id);
        let session_id = session_id.clone();

        Box::pin(async move {
            let url = target?;
            let (stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
                TermbridgeError::connection(format!("Failed to connect to {}: {}", url, e))
            })?;
            tracing::info!(%session_id, %url, "terminal transport connected");

            let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<ClientFrame>();
            let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<Result<HostMessage>>();

            tokio::spawn(connection_task(session_id, stream, outgoing_rx, incoming_tx));

            Ok(TransportHandle::new(outgoing_tx, incoming_rx))
        })
    }
}

/// Background task that handles the actual socket I/O
async fn connection_task(
    session_id: SessionId,
    stream: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<ClientFrame>,
    incoming: mpsc::UnboundedSender<Result<HostMessage>>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                let Some(frame) = frame else {
                    // Handle closed by the bridge
                    tracing::debug!(%session_id, "closing terminal transport");
                    if let Err(e) = sink.close().await {
                        tracing::debug!(%session_id, "close handshake failed: {}", e);
                    }
                    break;
                };

                let text = match encode_frame(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(%session_id, kind = frame.kind(), "dropping frame: {}", e);
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::error!(%session_id, "Failed to send frame: {}", e);
                    let _ = incoming.send(Err(TermbridgeError::connection(e.to_string())));
                    break;
                }
            }

            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let _ = incoming.send(Ok(HostMessage::Output(Bytes::from(text.into_bytes()))));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let _ = incoming.send(Ok(HostMessage::Output(Bytes::from(data))));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.into_owned())
                            .filter(|reason| !reason.is_empty());
                        tracing::info!(%session_id, ?reason, "host closed terminal session");
                        let _ = incoming.send(Ok(HostMessage::Closed { reason }));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite itself
                    }
                    Some(Err(e)) => {
                        tracing::error!(%session_id, "Failed to receive message: {}", e);
                        let _ = incoming.send(Err(TermbridgeError::connection(e.to_string())));
                        break;
                    }
                    None => {
                        tracing::info!(%session_id, "host dropped terminal connection");
                        let _ = incoming.send(Ok(HostMessage::Closed { reason: None }));
                        break;
                    }
                }
            }
        }
    }
}
