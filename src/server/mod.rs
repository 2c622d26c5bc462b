//! Host TCP server driving the pipeline.
//!
//! Accepts connections, parses HTTP/1.1 requests, stamps each with the peer
//! address, and runs it through an injected [`Pipeline`]. Supports HTTP/1.1
//! persistent connections (keep-alive) out of the box. The server owns no
//! pipeline policy of its own; it only supplies requests and writes back
//! responses.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::pipeline::Pipeline;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request buffered before rejection (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A TCP host for a [`Pipeline`].
///
/// # Examples
///
/// ```rust,no_run
/// use gantry::http::{Response, StatusCode};
/// use gantry::pipeline::Pipeline;
/// use gantry::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::builder()
///         .build(|_req| async { Response::new(StatusCode::Ok).body("Hello!") });
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.serve(pipeline).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls_terminated: bool,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            tls_terminated: false,
        })
    }

    /// Marks inbound connections as secure.
    ///
    /// Set this when the server sits behind a TLS-terminating proxy; it
    /// controls the `secure` flag the SSL-enforcement stage keys off.
    #[must_use]
    pub fn tls_terminated(mut self, terminated: bool) -> Self {
        self.tls_terminated = terminated;
        self
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and driving requests through `pipeline`.
    ///
    /// The pipeline is shared across all spawned connection tasks. This
    /// method runs until the process is terminated or an unrecoverable
    /// listener error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), ServerError> {
        let pipeline = Arc::new(pipeline);
        let secure = self.tls_terminated;
        info!(address = %self.local_addr, "gantry listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let pipeline = Arc::clone(&pipeline);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, secure, pipeline).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    secure: bool,
    pipeline: Arc<Pipeline>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        // Guard against excessively large requests.
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            let response = Response::error(StatusCode::PayloadTooLarge, "Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        // Attempt to parse the buffered data as an HTTP request.
        let (request, body_offset) = match Request::parse(&buf, peer_addr.ip(), secure) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received — read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response =
                    Response::error(StatusCode::BadRequest, "Bad request").keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = pipeline.execute(request).await;
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}
