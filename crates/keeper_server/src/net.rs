//! TCP serving.
//!
//! Each connection runs on its own task and carries any number of calls.
//! A call is one length-prefixed request frame answered by one response
//! frame. Waiting for the next length prefix runs under `idle_timeout`; the
//! rest of the call runs under `request_timeout`. Either expiry closes the
//! connection.

use crate::error::{ServerError, ServerResult};
use crate::server::KeeperServer;
use keeper_core::ErrorKind;
use keeper_protocol::{RemoteError, ResponseFrame};
use std::io::ErrorKind as IoErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Binds a listener on the configured address.
pub async fn bind(server: &KeeperServer) -> ServerResult<TcpListener> {
    let listener = TcpListener::bind(server.config().bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "vault server listening");
    Ok(listener)
}

/// How a connection ended without an I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// The peer closed the connection between calls.
    PeerClosed,
    /// No call arrived within `idle_timeout`.
    Idle,
    /// A started call did not finish within `request_timeout`.
    CallTimedOut,
    /// An oversized frame was answered with an error.
    Rejected,
}

/// Accepts connections forever, spawning one task per connection.
pub async fn serve(listener: TcpListener, server: Arc<KeeperServer>) -> ServerResult<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            tracing::debug!(%peer, "connection opened");
            match handle_connection(stream, peer, server).await {
                Ok(end) => tracing::debug!(%peer, ?end, "connection closed"),
                Err(err) => tracing::error!(%peer, error = %err, "connection failed"),
            }
        });
    }
}

/// Serves calls on one connection until it ends.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    server: Arc<KeeperServer>,
) -> ServerResult<ConnectionEnd> {
    let config = server.config();
    let (idle_timeout, request_timeout) = (config.idle_timeout, config.request_timeout);

    loop {
        let mut prefix = [0u8; keeper_protocol::LENGTH_PREFIX_SIZE];
        match tokio::time::timeout(idle_timeout, stream.read_exact(&mut prefix)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.kind() == IoErrorKind::UnexpectedEof => {
                return Ok(ConnectionEnd::PeerClosed)
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                tracing::debug!(%peer, "idle connection closed");
                return Ok(ConnectionEnd::Idle);
            }
        }

        let size = u32::from_be_bytes(prefix) as usize;
        let call = exchange_one(&mut stream, &server, size);
        match tokio::time::timeout(request_timeout, call).await {
            Ok(Ok(true)) => continue,
            Ok(Ok(false)) => return Ok(ConnectionEnd::Rejected),
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                tracing::warn!(%peer, "call timed out, closing connection");
                return Ok(ConnectionEnd::CallTimedOut);
            }
        }
    }
}

/// Serves one call whose prefix announced `size` bytes. Returns `false`
/// when the frame was rejected.
async fn exchange_one(
    stream: &mut TcpStream,
    server: &Arc<KeeperServer>,
    size: usize,
) -> ServerResult<bool> {
    let max = server.config().max_frame_size;
    if size > max {
        let response = ResponseFrame::err(RemoteError::new(
            ErrorKind::InvalidArgument,
            format!("frame of {size} bytes exceeds limit of {max} bytes"),
        ));
        write_frame(stream, &response.encode()?).await?;
        return Ok(false);
    }

    let mut payload = vec![0u8; size];
    stream.read_exact(&mut payload).await?;

    let handler = Arc::clone(server);
    let response = tokio::task::spawn_blocking(move || handler.handle_frame(&payload))
        .await
        .map_err(|e| ServerError::Internal(format!("handler task failed: {e}")))??;

    write_frame(stream, &response).await?;
    Ok(true)
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> ServerResult<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| ServerError::Internal("response frame too large".into()))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}
