//! Connection establishment for sheepdog clients.
//!
//! The [`Dial`] trait is the seam between the session layer and the
//! network: production code dials TCP, tests dial in-memory duplex
//! streams served by a scripted daemon.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, error};

use sheepdog_proto::constants::{SD_DEFAULT_ADDR, SD_DEFAULT_PORT};
use sheepdog_proto::{SdError, SdResult};

/// Produces fresh connections to the daemon.
///
/// A session dials once for its own connection and again for every
/// throwaway name-resolution exchange, so implementations must hand out
/// independent streams on every call.
#[async_trait]
pub trait Dial: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open a new connection.
    async fn dial(&self) -> SdResult<Self::Stream>;
}

/// Dials the sheep daemon over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    pub addr: String,
    pub port: u16,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(SD_DEFAULT_ADDR, SD_DEFAULT_PORT)
    }
}

#[async_trait]
impl Dial for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self) -> SdResult<TcpStream> {
        let target = format!("{}:{}", self.addr, self.port);
        let addrs = lookup_host(&target).await.map_err(|e| {
            error!("unable to resolve {}: {}", target, e);
            SdError::Eio
        })?;

        // Try every address the resolver returned.
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    debug!("connected to {}", addr);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                }
            }
        }

        error!("failed to connect to {}", target);
        Err(SdError::Eio)
    }
}
