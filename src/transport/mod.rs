//! TCP + optional TLS transport: happy-eyeballs connect, SNI, local bind,
//! and the three TLS modes of spec §6 EXTERNAL INTERFACES.

pub mod host;
#[cfg(feature = "tls")]
mod tls;

pub use host::{HostAddr, HostAddrError};

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpSocket, TcpStream};

use crate::error::TransportError;
use crate::timeout::WithTimeout;

/// How the transport should treat the peer's TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TlsMode {
    /// Plain TCP, no TLS.
    None,
    /// Validate the certificate chain against the system/webpki root
    /// store and the hostname (the default).
    VerifyChain,
    /// Negotiate TLS but perform no certificate or hostname validation.
    NoVerify,
    /// Ignore the certificate chain entirely; accept iff the peer's leaf
    /// certificate's SHA-512 (lowercase hex) equals this pin.
    VerifySha512Pinned(String),
}

/// A connected, optionally-TLS-wrapped byte stream. The read/send loops
/// only ever see this type, not `TcpStream`/`TlsStream` directly.
pub enum Transport {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

const STAGGER: Duration = Duration::from_millis(250);

/// Interleave resolved addresses IPv6-first, alternating families, per the
/// happy-eyeballs convention (RFC 8305 prefers the first-returned family;
/// we simplify to a straight alternation since `lookup_host` doesn't
/// expose arrival order per-family).
fn order_addresses(addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let mut v6: VecDeque<SocketAddr> = addrs.iter().copied().filter(|a| a.is_ipv6()).collect();
    let mut v4: VecDeque<SocketAddr> = addrs.iter().copied().filter(|a| a.is_ipv4()).collect();
    let mut ordered = Vec::with_capacity(addrs.len());
    loop {
        match (v6.pop_front(), v4.pop_front()) {
            (Some(a), Some(b)) => {
                ordered.push(a);
                ordered.push(b);
            }
            (Some(a), None) => ordered.push(a),
            (None, Some(b)) => ordered.push(b),
            (None, None) => break,
        }
    }
    ordered
}

async fn connect_one(addr: SocketAddr, bindhost: Option<IpAddr>) -> io::Result<TcpStream> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    if let Some(bind_ip) = bindhost {
        if bind_ip.is_ipv4() == addr.is_ipv4() {
            socket.bind(SocketAddr::new(bind_ip, 0))?;
        }
    }
    socket.connect(addr).await
}

/// Concurrent, staggered-start connect across every resolved address for
/// `host:port`, returning the first successful `TcpStream`.
pub async fn happy_eyeballs_connect(
    host: &str,
    port: u16,
    bindhost: Option<IpAddr>,
) -> Result<TcpStream, TransportError> {
    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::ConnectFailed {
            host: host.to_string(),
            port,
            source: e,
        })?
        .collect();

    if resolved.is_empty() {
        return Err(TransportError::InvalidAddress(host.to_string()));
    }

    let ordered = order_addresses(resolved);
    let mut attempts = FuturesUnordered::new();
    for (i, addr) in ordered.into_iter().enumerate() {
        let delay = STAGGER * i as u32;
        attempts.push(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            connect_one(addr, bindhost).await
        });
    }

    let mut last_err = None;
    while let Some(result) = attempts.next().await {
        match result {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(TransportError::ConnectFailed {
        host: host.to_string(),
        port,
        source: last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no addresses resolved")),
    })
}

/// Connect to `host:port`, applying `connect_timeout`, `bindhost`, and
/// `tls` as configured, and return the unified [`Transport`].
pub async fn connect(
    host: &str,
    port: u16,
    tls: &TlsMode,
    bindhost: Option<IpAddr>,
    connect_timeout: Duration,
) -> Result<Transport, TransportError> {
    let tcp = happy_eyeballs_connect(host, port, bindhost)
        .with_timeout(connect_timeout)
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            host: host.to_string(),
            port,
        })??;

    match tls {
        TlsMode::None => Ok(Transport::Plain(tcp)),
        #[cfg(feature = "tls")]
        mode => {
            let tls_stream = tls::connect_tls(tcp, mode, host).await?;
            Ok(Transport::Tls(Box::new(tls_stream)))
        }
        #[cfg(not(feature = "tls"))]
        _ => Err(TransportError::TlsHandshakeFailed(
            "TLS requested but the `tls` feature is disabled".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_addresses_alternates_families() {
        let v4a: SocketAddr = "1.2.3.4:80".parse().unwrap();
        let v4b: SocketAddr = "1.2.3.5:80".parse().unwrap();
        let v6a: SocketAddr = "[::1]:80".parse().unwrap();
        let ordered = order_addresses(vec![v4a, v4b, v6a]);
        assert_eq!(ordered, vec![v6a, v4a, v4b]);
    }

    #[test]
    fn order_addresses_handles_single_family() {
        let v4a: SocketAddr = "1.2.3.4:80".parse().unwrap();
        let v4b: SocketAddr = "1.2.3.5:80".parse().unwrap();
        assert_eq!(order_addresses(vec![v4a, v4b]), vec![v4a, v4b]);
    }
}
