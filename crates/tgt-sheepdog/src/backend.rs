//! The sheepdog backing store.
//!
//! One [`SheepdogStore`] per logical unit. The LU path is the VDI name;
//! capacity comes from the inode. Each store carries its own
//! current-thread runtime so the framework's worker thread can drive the
//! async volume session with plain blocking calls, one command at a time.

use std::sync::Arc;

use tracing::{debug, error};

use sheepdog_client::{Dial, TcpDialer, VdiSession};
use sheepdog_proto::{SdError, SdResult};

use crate::scsi::*;
use crate::store::{BackingStore, BackingStoreTemplate, Registry};

/// Backing store for one logical unit backed by a sheepdog volume.
pub struct SheepdogStore<D: Dial> {
    dialer: D,
    rt: Option<tokio::runtime::Runtime>,
    session: Option<VdiSession<D>>,
}

impl SheepdogStore<TcpDialer> {
    /// A store dialing the default daemon endpoint.
    pub fn new() -> Self {
        Self::with_dialer(TcpDialer::default())
    }
}

impl Default for SheepdogStore<TcpDialer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dial> SheepdogStore<D> {
    pub fn with_dialer(dialer: D) -> Self {
        Self {
            dialer,
            rt: None,
            session: None,
        }
    }
}

impl<D: Dial + Clone + 'static> BackingStore for SheepdogStore<D> {
    fn init(&mut self) -> SdResult<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                error!("failed to create runtime: {}", e);
                SdError::SystemError
            })?;
        self.rt = Some(rt);
        Ok(())
    }

    fn exit(&mut self) {
        self.session = None;
        self.rt = None;
    }

    fn open(&mut self, path: &str) -> SdResult<u64> {
        let rt = self.rt.as_ref().ok_or(SdError::SystemError)?;
        let session = rt.block_on(VdiSession::open(self.dialer.clone(), path))?;
        let size = session.size();
        self.session = Some(session);
        Ok(size)
    }

    fn close(&mut self) {
        if let (Some(rt), Some(session)) = (self.rt.as_ref(), self.session.take()) {
            rt.block_on(session.close());
        }
    }

    fn submit(&mut self, cmd: &mut ScsiCmd) {
        cmd.result = SAM_STAT_GOOD;

        let (Some(rt), Some(session)) = (self.rt.as_ref(), self.session.as_mut()) else {
            cmd.set_medium_error();
            return;
        };

        let ret = match cmd.cdb[0] {
            SYNCHRONIZE_CACHE | SYNCHRONIZE_CACHE_16 => rt.block_on(session.sync()),
            WRITE_6 | WRITE_10 | WRITE_12 | WRITE_16 => {
                rt.block_on(session.write_at(&cmd.out_buffer, cmd.offset))
            }
            READ_6 | READ_10 | READ_12 | READ_16 => {
                rt.block_on(session.read_at(&mut cmd.in_buffer, cmd.offset))
            }
            opcode => {
                debug!("cdb[0]: {:#x}", opcode);
                Ok(())
            }
        };

        if let Err(e) = ret {
            error!(
                "io error {:#x} at offset {}: {}",
                cmd.cdb[0], cmd.offset, e
            );
            cmd.set_medium_error();
        }
    }
}

/// Template publishing sheepdog-backed logical units.
pub struct SheepdogTemplate;

impl BackingStoreTemplate for SheepdogTemplate {
    fn name(&self) -> &'static str {
        "sheepdog"
    }

    fn create(&self) -> Box<dyn BackingStore> {
        Box::new(SheepdogStore::new())
    }
}

/// Publish the sheepdog backing store into a registry. Called from the
/// framework's wiring at startup.
pub fn register(registry: &mut Registry) {
    registry.register(Arc::new(SheepdogTemplate));
}
