//! Framed request/response exchange over a single stream.
//!
//! One request is in flight at a time: the response header (and any
//! payload) is fully consumed before the next request leaves. Partial
//! transfers resume and interrupted syscalls retry inside
//! `write_all`/`read_exact`; a zero-byte read surfaces as an unexpected
//! EOF and fails the operation.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::error;

use sheepdog_proto::wire::SD_HDR_SIZE;
use sheepdog_proto::{SdError, SdReq, SdResult, SdRsp};

/// A single connection to the daemon.
pub struct Connection<S> {
    stream: S,
    next_id: u32,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, next_id: 1 }
    }

    /// Send one request and receive its response.
    ///
    /// The header and the write payload leave as one logical message.
    /// On the way back, the payload length is clamped to the response's
    /// `data_length` and that many bytes are read into `rbuf`. Returns
    /// the response header and the payload length actually received; the
    /// result code is the caller's to interpret.
    pub async fn do_req(
        &mut self,
        req: &mut SdReq,
        wbuf: &[u8],
        rbuf: &mut [u8],
    ) -> SdResult<(SdRsp, usize)> {
        req.id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let mut msg = BytesMut::with_capacity(SD_HDR_SIZE + wbuf.len());
        req.encode(&mut msg);
        msg.extend_from_slice(wbuf);
        self.stream.write_all(&msg).await.map_err(|e| {
            error!("failed to send a request: {}", e);
            SdError::Eio
        })?;

        let mut hdr = [0u8; SD_HDR_SIZE];
        self.stream.read_exact(&mut hdr).await.map_err(|e| {
            error!("failed to read a response: {}", e);
            SdError::Eio
        })?;
        let rsp = SdRsp::decode(&hdr)?;

        let rlen = rbuf.len().min(rsp.data_length as usize);
        if rlen > 0 {
            self.stream.read_exact(&mut rbuf[..rlen]).await.map_err(|e| {
                error!("failed to read response data: {}", e);
                SdError::Eio
            })?;
        }

        Ok((rsp, rlen))
    }
}
