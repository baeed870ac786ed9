//! Scripted in-memory daemon for tests.
//!
//! Speaks the real wire format over `tokio::io::duplex` pipes: every
//! request is decoded with the production codec, handed to a test-supplied
//! handler, and answered in the shape its opcode requires. All requests
//! (with their payloads) are logged in arrival order so tests can assert
//! the exact RPC sequence a client emitted.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use sheepdog_proto::constants::SD_FLAG_CMD_WRITE;
use sheepdog_proto::wire::{HeaderShape, SD_HDR_SIZE};
use sheepdog_proto::{SdReq, SdResult, SdRsp};

use crate::net::Dial;

/// What the handler tells the daemon to answer.
pub struct MockReply {
    pub result: u32,
    pub data: Vec<u8>,
    /// `vdi_id` for VDI-shape responses; ignored for object responses.
    pub vdi_id: u32,
}

impl MockReply {
    pub fn success() -> Self {
        Self { result: 0, data: Vec::new(), vdi_id: 0 }
    }

    pub fn result(result: u32) -> Self {
        Self { result, data: Vec::new(), vdi_id: 0 }
    }

    pub fn data(data: Vec<u8>) -> Self {
        Self { result: 0, data, vdi_id: 0 }
    }

    pub fn vdi(vdi_id: u32) -> Self {
        Self { result: 0, data: Vec::new(), vdi_id }
    }
}

type Handler = Box<dyn FnMut(&SdReq, &[u8]) -> MockReply + Send>;

/// A scripted daemon accepting any number of connections.
#[derive(Clone)]
pub struct MockDaemon {
    handler: Arc<Mutex<Handler>>,
    log: Arc<Mutex<Vec<(SdReq, Vec<u8>)>>>,
}

impl MockDaemon {
    pub fn new(handler: impl FnMut(&SdReq, &[u8]) -> MockReply + Send + 'static) -> Self {
        Self {
            handler: Arc::new(Mutex::new(Box::new(handler))),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A dialer handing out fresh connections to this daemon.
    pub fn dialer(&self) -> MockDialer {
        MockDialer { daemon: self.clone() }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<(SdReq, Vec<u8>)> {
        self.log.lock().unwrap().clone()
    }

    async fn serve(self, mut stream: DuplexStream) {
        loop {
            let mut hdr = [0u8; SD_HDR_SIZE];
            if stream.read_exact(&mut hdr).await.is_err() {
                return; // client hung up
            }
            let req = SdReq::decode(&hdr).expect("malformed request header");

            let wlen = if req.flags & SD_FLAG_CMD_WRITE != 0 {
                req.data_length as usize
            } else {
                0
            };
            let mut payload = vec![0u8; wlen];
            if wlen > 0 {
                stream.read_exact(&mut payload).await.unwrap();
            }

            self.log.lock().unwrap().push((req, payload.clone()));
            let reply = {
                let mut handler = self.handler.lock().unwrap();
                (&mut **handler)(&req, &payload)
            };

            let mut rsp = match req.opcode.shape() {
                HeaderShape::Vdi => SdRsp::vdi(req.opcode, reply.result, reply.vdi_id),
                _ => SdRsp::object(req.opcode, reply.result, 0),
            };
            rsp.id = req.id;
            rsp.data_length = reply.data.len() as u32;

            let mut buf = BytesMut::with_capacity(SD_HDR_SIZE);
            rsp.encode(&mut buf);
            stream.write_all(&buf).await.unwrap();
            if !reply.data.is_empty() {
                stream.write_all(&reply.data).await.unwrap();
            }
        }
    }
}

/// Dialer returning duplex pipes served by a [`MockDaemon`].
#[derive(Clone)]
pub struct MockDialer {
    daemon: MockDaemon,
}

#[async_trait]
impl Dial for MockDialer {
    type Stream = DuplexStream;

    async fn dial(&self) -> SdResult<Self::Stream> {
        let (client, server) = tokio::io::duplex(1 << 16);
        tokio::spawn(self.daemon.clone().serve(server));
        Ok(client)
    }
}
