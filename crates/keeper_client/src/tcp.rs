//! TCP frame client.

use crate::transport::FrameClient;
use keeper_protocol::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Sends each call over a fresh TCP connection.
///
/// Connect, write and read all run under the configured timeout; expiry is
/// reported like any other network failure.
#[derive(Debug, Clone)]
pub struct TcpFrameClient {
    addr: String,
    timeout: Duration,
    max_frame_size: usize,
}

impl TcpFrameClient {
    /// Creates a client for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the largest response frame accepted.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Returns the vault address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = self.addr.to_socket_addrs()?.collect();
        let mut last_err = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{} did not resolve", self.addr),
        );

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

impl FrameClient for TcpFrameClient {
    fn call(&self, request: Vec<u8>) -> Result<Vec<u8>, String> {
        let mut stream = self
            .connect()
            .map_err(|e| format!("connect to {}: {e}", self.addr))?;
        write_frame(&mut stream, &request).map_err(|e| format!("send to {}: {e}", self.addr))?;
        read_frame(&mut stream, self.max_frame_size)
            .map_err(|e| format!("receive from {}: {e}", self.addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TcpFrameClient::new(addr.to_string(), Duration::from_millis(500));
        assert!(client.call(vec![1, 2, 3]).is_err());
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpFrameClient::new(addr.to_string(), Duration::from_millis(200));
        let err = client.call(vec![1, 2, 3]).unwrap_err();
        assert!(err.contains("receive from"));
        drop(listener);
    }

    #[test]
    fn echo_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let frame = read_frame(&mut stream, 1024).unwrap();
            write_frame(&mut stream, &frame).unwrap();
        });

        let client = TcpFrameClient::new(addr.to_string(), Duration::from_secs(2));
        assert_eq!(client.call(b"ping".to_vec()).unwrap(), b"ping");
        server.join().unwrap();
    }
}
