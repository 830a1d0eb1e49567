//! Network connections as tubes.

mod udp;

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::config::TubeConfig;
use crate::error::{Result, TubeError};
use crate::tube::{Closer, Sink, Tube};

pub use udp::UdpStream;

/// Transport protocols a [`Remote`] can dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = TubeError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(TubeError::InvalidProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Close hook for network tubes: shuts the connection down in both directions.
///
/// The write side is shut down and the read side is released, so a receive
/// that is waiting on the peer returns end of stream.
#[derive(Debug)]
pub struct Connection {
    protocol: Protocol,
    peer: SocketAddr,
    release: CancellationToken,
}

#[async_trait]
impl Closer for Connection {
    async fn close(&mut self, sink: &mut Sink) -> Result<()> {
        log::debug!("remote: closing {} connection to {}", self.protocol, self.peer);
        let shutdown = sink.shutdown().await;
        self.release.cancel();
        shutdown?;
        Ok(())
    }
}

/// Read side of a connection; reports end of stream once the connection is
/// closed locally and drops the underlying reader.
struct Releasable<R> {
    inner: Option<R>,
    released: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<R> Releasable<R> {
    fn new(inner: R, release: &CancellationToken) -> Self {
        Self { inner: Some(inner), released: Box::pin(release.clone().cancelled_owned()) }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Releasable<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.inner.is_some() && self.released.as_mut().poll(cx).is_ready() {
            self.inner = None;
        }
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// A connection to `host:port` wrapped as a tube.
///
/// Dereferences to [`Tube`].
#[derive(Debug)]
pub struct Remote {
    tube: Tube<Connection>,
}

impl Remote {
    /// Dials `host:port` over `protocol` (`"tcp"` or `"udp"`).
    ///
    /// The protocol is checked before any network activity.
    pub async fn connect(host: &str, port: u16, protocol: &str) -> Result<Self> {
        Self::connect_with(host, port, protocol, &TubeConfig::default()).await
    }

    pub async fn connect_with(
        host: &str,
        port: u16,
        protocol: &str,
        config: &TubeConfig,
    ) -> Result<Self> {
        let protocol: Protocol = protocol.parse()?;
        let dial_error = |source| TubeError::Dial {
            addr: format!("{host}:{port}"),
            protocol: protocol.as_str(),
            source,
        };

        let release = CancellationToken::new();
        let tube = match protocol {
            Protocol::Tcp => {
                let stream = TcpStream::connect((host, port)).await.map_err(dial_error)?;
                let peer = stream.peer_addr()?;
                log::debug!("remote: connected to {peer} over tcp");
                let (reader, writer) = stream.into_split();
                let reader = Releasable::new(reader, &release);
                let closer = Connection { protocol, peer, release };
                Tube::from_parts(Box::new(reader), Box::new(writer), closer, config)
            }
            Protocol::Udp => {
                let stream = UdpStream::connect(host, port).await.map_err(dial_error)?;
                let peer = stream.peer_addr()?;
                log::debug!("remote: connected to {peer} over udp");
                let reader = Releasable::new(stream.clone(), &release);
                let closer = Connection { protocol, peer, release };
                Tube::from_parts(Box::new(reader), Box::new(stream), closer, config)
            }
        };
        Ok(Self { tube })
    }

    pub fn protocol(&self) -> Protocol {
        self.tube.closer().protocol
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.tube.closer().peer
    }

    /// Shuts the connection down and releases it.
    pub async fn close(mut self) -> Result<()> {
        self.tube.close().await
    }
}

impl Deref for Remote {
    type Target = Tube<Connection>;

    fn deref(&self) -> &Self::Target {
        &self.tube
    }
}

impl DerefMut for Remote {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tube
    }
}
