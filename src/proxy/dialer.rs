use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use super::{proxy_address, ProxyPool};

// A proxy sending more header lines than this is not a proxy we want.
const MAX_HEADER_LINES: usize = 64;

#[derive(Debug, Error)]
pub enum DialError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error talking to proxy {proxy}: {source}")]
    Io {
        proxy: String,
        #[source]
        source: io::Error,
    },

    #[error("proxy handshake failed: {proxy} answered '{status_line}'")]
    Rejected { proxy: String, status_line: String },

    #[error("proxy handshake failed: {proxy}: {reason}")]
    Handshake { proxy: String, reason: String },

    #[error("dial to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
}

/// A dialed connection. After a CONNECT handshake this is the same buffered
/// stream the handshake was read from, so bytes the proxy sent past the end
/// of its response are still delivered to the reader.
#[derive(Debug)]
pub struct Connection {
    stream: BufReader<TcpStream>,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Bytes already read from the socket but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        self.stream.buffer()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().peer_addr()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeState {
    AwaitStatusLine,
    AwaitHeaderLine,
    Done,
}

/// Opens connections to scan targets, tunneling through the proxy pool
/// when one is configured.
#[derive(Clone, Debug)]
pub struct Dialer {
    pool: Option<Arc<ProxyPool>>,
    timeout: Duration,
}

impl Dialer {
    pub fn direct(timeout: Duration) -> Self {
        Self {
            pool: None,
            timeout,
        }
    }

    /// An empty pool dials directly.
    pub fn new(pool: Arc<ProxyPool>, timeout: Duration) -> Self {
        let pool = (!pool.is_empty()).then_some(pool);
        Self { pool, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn uses_proxies(&self) -> bool {
        self.pool.is_some()
    }

    /// Dials `addr` (`host:port`). Through a proxy, a plain dial returns the
    /// proxy connection itself and the caller must send absolute-URI
    /// requests; a TLS dial returns a CONNECT tunnel ready for a TLS
    /// handshake. The whole call is bounded by the dialer timeout.
    pub async fn dial(&self, addr: &str, is_tls: bool) -> Result<Connection, DialError> {
        match tokio::time::timeout(self.timeout, self.dial_inner(addr, is_tls)).await {
            Ok(result) => result,
            Err(_) => Err(DialError::Timeout {
                addr: addr.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn dial_inner(&self, addr: &str, is_tls: bool) -> Result<Connection, DialError> {
        let Some(pool) = self.pool.as_ref() else {
            return connect(addr).await.map(Connection::new);
        };

        let proxy = proxy_address(pool.next_proxy());
        debug!(proxy = %proxy, addr = %addr, tls = is_tls, "dialing through proxy");
        let stream = connect(proxy).await?;
        let mut conn = Connection::new(stream);
        if is_tls {
            establish_tunnel(&mut conn, proxy, addr).await?;
        }
        Ok(conn)
    }
}

async fn connect(addr: &str) -> Result<TcpStream, DialError> {
    TcpStream::connect(addr)
        .await
        .map_err(|e| DialError::Connect {
            addr: addr.to_string(),
            source: e,
        })
}

async fn establish_tunnel(conn: &mut Connection, proxy: &str, addr: &str) -> Result<(), DialError> {
    let io_err = |e| DialError::Io {
        proxy: proxy.to_string(),
        source: e,
    };
    let request = format!("CONNECT {addr} HTTP/1.1\r\nHost: {addr}\r\n\r\n");
    conn.stream
        .get_mut()
        .write_all(request.as_bytes())
        .await
        .map_err(io_err)?;

    let mut state = HandshakeState::AwaitStatusLine;
    let mut header_lines = 0usize;
    let mut line = Vec::with_capacity(128);
    while state != HandshakeState::Done {
        line.clear();
        let n = conn.stream.read_until(b'\n', &mut line).await.map_err(io_err)?;
        if n == 0 {
            return Err(DialError::Handshake {
                proxy: proxy.to_string(),
                reason: "connection closed before end of response".to_string(),
            });
        }

        state = match state {
            HandshakeState::AwaitStatusLine => {
                let status_line = String::from_utf8_lossy(&line).trim_end().to_string();
                if status_line.split_whitespace().nth(1) != Some("200") {
                    return Err(DialError::Rejected {
                        proxy: proxy.to_string(),
                        status_line,
                    });
                }
                HandshakeState::AwaitHeaderLine
            }
            HandshakeState::AwaitHeaderLine => {
                if line == b"\r\n" || line == b"\n" {
                    HandshakeState::Done
                } else {
                    header_lines += 1;
                    if header_lines > MAX_HEADER_LINES {
                        return Err(DialError::Handshake {
                            proxy: proxy.to_string(),
                            reason: format!("more than {MAX_HEADER_LINES} header lines"),
                        });
                    }
                    HandshakeState::AwaitHeaderLine
                }
            }
            HandshakeState::Done => HandshakeState::Done,
        };
    }
    Ok(())
}
