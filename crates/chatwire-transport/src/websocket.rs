//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! One binary WebSocket message carries exactly one frame, so whole-frame
//! delivery comes from the WebSocket framing itself.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{next_connection_id, Connection, ConnectionId, Connector, Transport, TransportError};

/// Query parameter the accepting side falls back to when no
/// `Authorization` header was sent (browsers cannot set WebSocket headers).
const TOKEN_QUERY_PARAM: &str = "token";

/// How long an accepted TCP connection may take to finish the WebSocket
/// upgrade before it is dropped.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

fn io_error(kind: std::io::ErrorKind, e: impl std::error::Error + Send + Sync + 'static) -> std::io::Error {
    std::io::Error::new(kind, e)
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Upgrades run in their own tasks, so a client that opens a socket and
/// never completes the HTTP upgrade does not hold up the ones behind it.
pub struct WebSocketTransport {
    listener: TcpListener,
    handshake_timeout: Duration,
    upgrades: JoinSet<Result<WebSocketConnection, TransportError>>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            upgrades: JoinSet::new(),
        })
    }

    /// Sets how long a new connection may take to complete the upgrade.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.map_err(TransportError::AcceptFailed)?;
                    let limit = self.handshake_timeout;
                    self.upgrades.spawn(async move {
                        time::timeout(limit, upgrade(stream, addr))
                            .await
                            .unwrap_or_else(|_| {
                                Err(TransportError::AcceptFailed(std::io::Error::new(
                                    std::io::ErrorKind::TimedOut,
                                    format!("WebSocket upgrade from {addr} timed out"),
                                )))
                            })
                    });
                }
                Some(joined) = self.upgrades.join_next(), if !self.upgrades.is_empty() => {
                    match joined {
                        Ok(Ok(conn)) => return Ok(conn),
                        Ok(Err(e)) => tracing::debug!(error = %e, "WebSocket upgrade failed"),
                        Err(e) => tracing::warn!(error = %e, "WebSocket upgrade task failed"),
                    }
                }
            }
        }
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

async fn upgrade(stream: TcpStream, addr: SocketAddr) -> Result<WebSocketConnection, TransportError> {
    let mut credential = None;
    let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        credential = credential_from_request(req);
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, capture)
        .await
        .map_err(|e| TransportError::AcceptFailed(io_error(std::io::ErrorKind::ConnectionRefused, e)))?;

    let conn = WebSocketConnection::new(ws, credential);
    tracing::debug!(id = %conn.id, %addr, "accepted WebSocket connection");
    Ok(conn)
}

/// Extracts the credential from `Authorization: Bearer <token>`, falling
/// back to the `token` query parameter.
fn credential_from_request(req: &Request) -> Option<String> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);
    if bearer.is_some() {
        return bearer;
    }

    req.uri().query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == TOKEN_QUERY_PARAM)
            .map(|(_, value)| value.to_owned())
    })
}

/// Opens client-side WebSocket connections to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Creates a connector for `url` (e.g. `ws://127.0.0.1:8080/api/ws`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The URL this connector dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection<MaybeTlsStream<TcpStream>>;
    type Error = TransportError;

    async fn connect(&self, credential: &str) -> Result<Self::Connection, Self::Error> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(io_error(std::io::ErrorKind::InvalidInput, e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|e| TransportError::ConnectFailed(io_error(std::io::ErrorKind::InvalidInput, e)))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectFailed(io_error(std::io::ErrorKind::ConnectionRefused, e)))?;

        let conn = WebSocketConnection::new(ws, None);
        tracing::debug!(id = %conn.id, url = %self.url, "WebSocket connection established");
        Ok(conn)
    }
}

/// A single WebSocket connection.
///
/// The stream is split so a pending `recv` never blocks a `send`.
pub struct WebSocketConnection<S = TcpStream> {
    id: ConnectionId,
    credential: Option<String>,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(ws: WebSocketStream<S>, credential: Option<String>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: next_connection_id(),
            credential,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(frame.to_vec().into());
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e)))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // transport-level ping/pong
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e)))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}
