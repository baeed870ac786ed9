//! Volume session: one locked VDI, its cached inode, and the I/O engine.
//!
//! A session owns a single connection to the daemon plus the volume's
//! inode. Reads are served against the cached indirection table (a zero
//! slot reads as zeros without touching the network); writes decide
//! per-object between writing in place, allocating, and copy-on-write,
//! and push the mutated inode back to the daemon after any allocation.
//!
//! When the daemon answers a write with `READONLY`, the volume was
//! snapshotted underneath us: the session re-resolves the VDI name,
//! re-reads the inode, and redoes the affected piece against the fresh
//! indirection table.

use tracing::{debug, warn};

use sheepdog_proto::constants::{CURRENT_VDI_ID, SD_DATA_OBJ_SIZE, SD_FLAG_CMD_COW};
use sheepdog_proto::inode::SD_INODE_SIZE;
use sheepdog_proto::{Inode, ObjectId, SdResult};

use crate::conn::Connection;
use crate::net::Dial;
use crate::rpc;

/// An open volume.
///
/// Owned exclusively by one caller; all operations take `&mut self` and
/// run one at a time, so requests on the connection are strictly
/// serialized.
pub struct VdiSession<D: Dial> {
    dialer: D,
    conn: Connection<D::Stream>,
    inode: Inode,
    min_dirty_data_idx: u32,
    max_dirty_data_idx: u32,
}

impl<D: Dial> VdiSession<D> {
    /// Open the volume named `name`: resolve and lock its VDI id, open
    /// the session connection, and read the inode.
    pub async fn open(dialer: D, name: &str) -> SdResult<Self> {
        let vid = find_vdi_name(&dialer, name, "", CURRENT_VDI_ID, false).await?;

        let stream = dialer.dial().await?;
        let mut conn = Connection::new(stream);

        let mut buf = vec![0u8; SD_INODE_SIZE];
        rpc::read_object(&mut conn, ObjectId::from_vid(vid), 0, &mut buf, 0).await?;
        let inode = Inode::decode(&buf)?;
        debug!(
            "opened vdi '{}' ({:#x}), size {}",
            inode.name, inode.vdi_id, inode.vdi_size
        );

        Ok(Self {
            dialer,
            conn,
            inode,
            min_dirty_data_idx: u32::MAX,
            max_dirty_data_idx: 0,
        })
    }

    /// Release the VDI and drop the connection. Anything the daemon
    /// objects to at this point is logged and otherwise ignored.
    pub async fn close(mut self) {
        if let Err(e) = rpc::release_vdi(&mut self.conn, self.inode.vdi_id).await {
            warn!("{}, {}", e, self.inode.name);
        }
    }

    /// Flush the daemon's object cache for this volume.
    pub async fn sync(&mut self) -> SdResult<()> {
        rpc::flush_vdi(&mut self.conn, self.inode.vdi_id).await
    }

    /// Read `buf.len()` bytes starting at byte `offset` of the volume.
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> SdResult<()> {
        let nr_copies = self.inode.nr_copies as u32;
        let mut idx = (offset / SD_DATA_OBJ_SIZE) as u32;
        let mut obj_offset = offset % SD_DATA_OBJ_SIZE;
        let mut done = 0;

        while done < buf.len() {
            let size = ((SD_DATA_OBJ_SIZE - obj_offset) as usize).min(buf.len() - done);
            let dst = &mut buf[done..done + size];

            let vid = self.inode.get_vid(idx);
            if vid == 0 {
                // unallocated slot: reads as zeros, no RPC
                dst.fill(0);
            } else {
                let oid = ObjectId::from_vid_data(vid, idx);
                rpc::read_object(&mut self.conn, oid, nr_copies, dst, obj_offset).await?;
            }

            done += size;
            obj_offset = 0;
            idx += 1;
        }
        Ok(())
    }

    /// Write `buf` starting at byte `offset` of the volume.
    pub async fn write_at(&mut self, buf: &[u8], offset: u64) -> SdResult<()> {
        let nr_copies = self.inode.nr_copies as u32;
        let mut idx = (offset / SD_DATA_OBJ_SIZE) as u32;
        let mut obj_offset = offset % SD_DATA_OBJ_SIZE;
        let mut done = 0;
        let mut need_update_inode = false;

        while done < buf.len() {
            let size = ((SD_DATA_OBJ_SIZE - obj_offset) as usize).min(buf.len() - done);
            let data = &buf[done..done + size];

            loop {
                let vid = self.inode.vdi_id;
                let slot = self.inode.get_vid(idx);

                let (create, cow_oid, flags) = if slot == vid {
                    (false, ObjectId::new(0), 0)
                } else if slot != 0 {
                    // first write to a parent-owned object: copy-on-write
                    (true, ObjectId::from_vid_data(slot, idx), SD_FLAG_CMD_COW)
                } else {
                    (true, ObjectId::new(0), 0)
                };
                let oid = ObjectId::from_vid_data(vid, idx);

                if create {
                    self.min_dirty_data_idx = self.min_dirty_data_idx.min(idx);
                    self.max_dirty_data_idx = self.max_dirty_data_idx.max(idx);
                    self.inode.set_vid(idx, vid);
                }

                let need_reload = rpc::write_object(
                    &mut self.conn,
                    oid,
                    nr_copies,
                    data,
                    obj_offset,
                    create,
                    cow_oid,
                    flags,
                )
                .await?;

                if need_reload {
                    // the object was frozen by a concurrent snapshot;
                    // redo this piece against the fresh inode
                    self.reload_inode().await?;
                    continue;
                }

                if create {
                    need_update_inode = true;
                }
                break;
            }

            done += size;
            obj_offset = 0;
            idx += 1;
        }

        if need_update_inode {
            self.update_inode().await?;
        }
        Ok(())
    }

    /// Volume capacity in bytes.
    pub fn size(&self) -> u64 {
        self.inode.vdi_size
    }

    /// The cached inode.
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    /// The inclusive window of slots dirtied since the last writeback,
    /// `(u32::MAX, 0)` when empty. Not reset by the writeback itself.
    pub fn dirty_window(&self) -> (u32, u32) {
        (self.min_dirty_data_idx, self.max_dirty_data_idx)
    }

    /// Re-resolve the VDI name and re-read the inode over the session
    /// connection. The dirty window survives the reload.
    async fn reload_inode(&mut self) -> SdResult<()> {
        let vid =
            find_vdi_name(&self.dialer, &self.inode.name, "", CURRENT_VDI_ID, false).await?;

        let mut buf = vec![0u8; SD_INODE_SIZE];
        rpc::read_object(
            &mut self.conn,
            ObjectId::from_vid(vid),
            self.inode.nr_copies as u32,
            &mut buf,
            0,
        )
        .await?;
        self.inode = Inode::decode(&buf)?;
        debug!("reloaded inode of '{}', now {:#x}", self.inode.name, vid);
        Ok(())
    }

    /// Push the cached inode back to the daemon as one full-object write.
    async fn update_inode(&mut self) -> SdResult<()> {
        // TODO: partial writeback covering only the dirty window
        let oid = ObjectId::from_vid(self.inode.vdi_id);
        let data = self.inode.encode();
        rpc::write_object(
            &mut self.conn,
            oid,
            self.inode.nr_copies as u32,
            &data,
            0,
            false,
            ObjectId::new(0),
            0,
        )
        .await?;
        Ok(())
    }
}

/// Resolve `name` to a VDI id on a throwaway connection.
///
/// The normal path uses LOCK_VDI, taking the lock as a side effect;
/// `for_snapshot` uses GET_VDI_INFO and leaves the lock alone.
async fn find_vdi_name<D: Dial>(
    dialer: &D,
    name: &str,
    tag: &str,
    snapid: u32,
    for_snapshot: bool,
) -> SdResult<u32> {
    let stream = dialer.dial().await?;
    let mut conn = Connection::new(stream);
    rpc::find_vdi(&mut conn, name, tag, snapid, for_snapshot).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use sheepdog_proto::constants::*;
    use sheepdog_proto::{Opcode, RequestBody, SdError, SdReq};

    use crate::mock::{MockDaemon, MockReply};

    const OS: u64 = SD_DATA_OBJ_SIZE;

    fn test_inode(vdi_id: u32, vdi_size: u64) -> Inode {
        let mut inode = Inode::new();
        inode.name = "v".to_string();
        inode.vdi_id = vdi_id;
        inode.vdi_size = vdi_size;
        inode.nr_copies = 3;
        inode.block_size_shift = 22;
        inode
    }

    /// A daemon serving one VDI whose inode lives behind the returned
    /// handle. LOCK_VDI/GET_VDI_INFO resolve to the current `vdi_id`,
    /// READ_OBJ of the inode object serves the current encoding, data
    /// reads serve `0xAB`, writes succeed.
    fn daemon_for(inode: Inode) -> (MockDaemon, Arc<Mutex<Inode>>) {
        let shared = Arc::new(Mutex::new(inode));
        let handle = shared.clone();
        let daemon = MockDaemon::new(move |req: &SdReq, _payload: &[u8]| match req.opcode {
            Opcode::LockVdi | Opcode::GetVdiInfo => {
                MockReply::vdi(shared.lock().unwrap().vdi_id)
            }
            Opcode::ReadObj => match req.body {
                RequestBody::Object { oid, .. } if oid.is_vdi_obj() => {
                    MockReply::data(shared.lock().unwrap().encode())
                }
                _ => MockReply::data(vec![0xAB; req.data_length as usize]),
            },
            _ => MockReply::success(),
        });
        (daemon, handle)
    }

    async fn open_session(daemon: &MockDaemon) -> VdiSession<crate::mock::MockDialer> {
        VdiSession::open(daemon.dialer(), "v").await.unwrap()
    }

    fn data_requests(daemon: &MockDaemon, skip: usize) -> Vec<SdReq> {
        daemon.requests().into_iter().skip(skip).map(|(r, _)| r).collect()
    }

    #[tokio::test]
    async fn test_open_locks_and_reads_inode() {
        let (daemon, _) = daemon_for(test_inode(7, 64 << 20));
        let session = open_session(&daemon).await;

        assert_eq!(session.size(), 64 << 20);
        assert_eq!(session.dirty_window(), (u32::MAX, 0));

        let reqs = daemon.requests();
        assert_eq!(reqs.len(), 2);

        let (lock, payload) = &reqs[0];
        assert_eq!(lock.opcode, Opcode::LockVdi);
        assert_eq!(lock.flags & SD_FLAG_CMD_WRITE, SD_FLAG_CMD_WRITE);
        assert_eq!(lock.data_length, 512);
        assert_eq!(&payload[..1], b"v");
        match lock.body {
            RequestBody::Vdi { snapid, .. } => assert_eq!(snapid, CURRENT_VDI_ID),
            _ => panic!("LOCK_VDI must use the vdi shape"),
        }

        let (read, _) = &reqs[1];
        assert_eq!(read.opcode, Opcode::ReadObj);
        assert_eq!(read.data_length as usize, SD_INODE_SIZE);
        match read.body {
            RequestBody::Object { oid, copies, offset, .. } => {
                assert_eq!(oid, ObjectId::from_vid(7));
                assert_eq!(copies, 0);
                assert_eq!(offset, 0);
            }
            _ => panic!("READ_OBJ must use the object shape"),
        }
    }

    #[tokio::test]
    async fn test_sparse_read_issues_no_rpc() {
        // S1: every slot unallocated; the read never touches the wire
        let (daemon, _) = daemon_for(test_inode(7, 64 << 20));
        let mut session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        let mut buf = vec![0xFFu8; 8192];
        session.read_at(&mut buf, 0).await.unwrap();

        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(daemon.requests().len(), after_open);
    }

    #[tokio::test]
    async fn test_read_allocated_slot() {
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(3, 7);
        let (daemon, _) = daemon_for(inode);
        let mut session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        let mut buf = vec![0u8; 512];
        session.read_at(&mut buf, 3 * OS + 1024).await.unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));

        let reqs = data_requests(&daemon, after_open);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].opcode, Opcode::ReadObj);
        match reqs[0].body {
            RequestBody::Object { oid, copies, offset, .. } => {
                assert_eq!(oid, ObjectId::from_vid_data(7, 3));
                assert_eq!(copies, 3);
                assert_eq!(offset, 1024);
            }
            _ => unreachable!(),
        }
        assert_eq!(reqs[0].data_length, 512);
    }

    #[tokio::test]
    async fn test_in_place_write() {
        // S2: slot owned by this inode; plain WRITE_OBJ, no writeback
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(3, 7);
        let (daemon, _) = daemon_for(inode);
        let mut session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        session.write_at(&[1u8; 512], 3 * OS + 1024).await.unwrap();

        let reqs = data_requests(&daemon, after_open);
        assert_eq!(reqs.len(), 1);
        let req = &reqs[0];
        assert_eq!(req.opcode, Opcode::WriteObj);
        assert_eq!(req.flags, SD_FLAG_CMD_WRITE);
        assert_eq!(req.data_length, 512);
        match req.body {
            RequestBody::Object { oid, cow_oid, offset, .. } => {
                assert_eq!(oid, ObjectId::from_vid_data(7, 3));
                assert_eq!(cow_oid, ObjectId::new(0));
                assert_eq!(offset, 1024);
            }
            _ => unreachable!(),
        }
        assert_eq!(session.dirty_window(), (u32::MAX, 0));
    }

    #[tokio::test]
    async fn test_cow_allocation() {
        // S3: slot owned by a parent; CREATE_AND_WRITE with COW source,
        // then exactly one inode writeback
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(5, 4);
        let (daemon, _) = daemon_for(inode);
        let mut session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        session.write_at(&vec![2u8; 1 << 20], 5 * OS).await.unwrap();

        let reqs = daemon.requests().split_off(after_open);
        assert_eq!(reqs.len(), 2);

        let (create, _) = &reqs[0];
        assert_eq!(create.opcode, Opcode::CreateAndWriteObj);
        assert_eq!(create.flags, SD_FLAG_CMD_WRITE | SD_FLAG_CMD_COW);
        match create.body {
            RequestBody::Object { oid, cow_oid, offset, .. } => {
                assert_eq!(oid, ObjectId::from_vid_data(7, 5));
                assert_eq!(cow_oid, ObjectId::from_vid_data(4, 5));
                assert_eq!(offset, 0);
            }
            _ => unreachable!(),
        }

        let (wb, wb_payload) = &reqs[1];
        assert_eq!(wb.opcode, Opcode::WriteObj);
        assert_eq!(wb.data_length as usize, SD_INODE_SIZE);
        match wb.body {
            RequestBody::Object { oid, offset, .. } => {
                assert_eq!(oid, ObjectId::from_vid(7));
                assert_eq!(offset, 0);
            }
            _ => unreachable!(),
        }
        // the written-back table carries the allocation
        let wb_inode = Inode::decode(wb_payload).unwrap();
        assert_eq!(wb_inode.get_vid(5), 7);

        assert_eq!(session.inode().get_vid(5), 7);
        assert_eq!(session.dirty_window(), (5, 5));
    }

    #[tokio::test]
    async fn test_multi_object_span() {
        // S4: a span from OS-1024 across slots 0..=3, pieces in order
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(0, 7); // in place
        inode.set_vid(2, 4); // cow
        inode.set_vid(3, 7); // in place
        let (daemon, _) = daemon_for(inode);
        let mut session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        let len = (2 * OS + 2048) as usize;
        session.write_at(&vec![3u8; len], OS - 1024).await.unwrap();

        let reqs = data_requests(&daemon, after_open);
        // four data writes plus the inode writeback
        assert_eq!(reqs.len(), 5);

        let expect = [
            (Opcode::WriteObj, 0u32, OS - 1024, 1024u32),
            (Opcode::CreateAndWriteObj, 1, 0, OS as u32),
            (Opcode::CreateAndWriteObj, 2, 0, OS as u32),
            (Opcode::WriteObj, 3, 0, 1024),
        ];
        for (req, &(opcode, idx, obj_off, size)) in reqs.iter().zip(expect.iter()) {
            assert_eq!(req.opcode, opcode);
            assert_eq!(req.data_length, size);
            match req.body {
                RequestBody::Object { oid, offset, .. } => {
                    assert_eq!(oid, ObjectId::from_vid_data(7, idx));
                    assert_eq!(offset, obj_off);
                }
                _ => unreachable!(),
            }
        }
        // slot 2 went out as a copy-on-write of the parent object
        match reqs[2].body {
            RequestBody::Object { cow_oid, .. } => {
                assert_eq!(cow_oid, ObjectId::from_vid_data(4, 2))
            }
            _ => unreachable!(),
        }

        assert_eq!(reqs[4].opcode, Opcode::WriteObj);
        match reqs[4].body {
            RequestBody::Object { oid, .. } => assert_eq!(oid, ObjectId::from_vid(7)),
            _ => unreachable!(),
        }
        assert_eq!(session.dirty_window(), (1, 2));
    }

    #[tokio::test]
    async fn test_stale_reload_retries_piece() {
        // S5: the first CREATE_AND_WRITE hits READONLY; the engine
        // re-resolves the vdi, re-reads the inode, and redoes the piece
        // with a create/COW decision taken against the fresh table.
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(2, 3);
        let shared = Arc::new(Mutex::new(inode));

        let handler_inode = shared.clone();
        let daemon = MockDaemon::new(move |req: &SdReq, _: &[u8]| match req.opcode {
            Opcode::LockVdi => MockReply::vdi(handler_inode.lock().unwrap().vdi_id),
            Opcode::ReadObj => MockReply::data(handler_inode.lock().unwrap().encode()),
            Opcode::CreateAndWriteObj => {
                // freeze the volume: a snapshot moved it to vdi 9
                let mut inode = handler_inode.lock().unwrap();
                inode.vdi_id = 9;
                inode.parent_vdi_id = 7;
                for vid in inode.data_vdi_id.iter_mut() {
                    if *vid != 0 {
                        *vid = 9;
                    }
                }
                MockReply::result(SdError::ReadOnly.to_code())
            }
            _ => MockReply::success(),
        });

        let mut session = VdiSession::open(daemon.dialer(), "v").await.unwrap();
        let after_open = daemon.requests().len();

        session.write_at(&[4u8; 4096], 2 * OS).await.unwrap();

        let reqs = data_requests(&daemon, after_open);
        let ops: Vec<Opcode> = reqs.iter().map(|r| r.opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::CreateAndWriteObj,
                Opcode::LockVdi,
                Opcode::ReadObj,
                Opcode::WriteObj,
            ]
        );

        // first attempt: cow of the old parent object into vdi 7
        match reqs[0].body {
            RequestBody::Object { oid, cow_oid, .. } => {
                assert_eq!(oid, ObjectId::from_vid_data(7, 2));
                assert_eq!(cow_oid, ObjectId::from_vid_data(3, 2));
            }
            _ => unreachable!(),
        }
        assert_ne!(reqs[0].flags & SD_FLAG_CMD_COW, 0);

        // retry: slot 2 now belongs to vdi 9, plain in-place write
        match reqs[3].body {
            RequestBody::Object { oid, cow_oid, .. } => {
                assert_eq!(oid, ObjectId::from_vid_data(9, 2));
                assert_eq!(cow_oid, ObjectId::new(0));
            }
            _ => unreachable!(),
        }
        assert_eq!(reqs[3].flags & SD_FLAG_CMD_COW, 0);

        // no allocation succeeded, so no inode writeback
        assert_eq!(session.inode().vdi_id, 9);
    }

    #[tokio::test]
    async fn test_reload_failure_fails_the_write() {
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(2, 3);
        let shared = Arc::new(Mutex::new(inode));

        let handler_inode = shared.clone();
        let mut locked_once = false;
        let daemon = MockDaemon::new(move |req: &SdReq, _: &[u8]| match req.opcode {
            Opcode::LockVdi => {
                if locked_once {
                    MockReply::result(SdError::NoVdi.to_code())
                } else {
                    locked_once = true;
                    MockReply::vdi(handler_inode.lock().unwrap().vdi_id)
                }
            }
            Opcode::ReadObj => MockReply::data(handler_inode.lock().unwrap().encode()),
            Opcode::CreateAndWriteObj => MockReply::result(SdError::ReadOnly.to_code()),
            _ => MockReply::success(),
        });

        let mut session = VdiSession::open(daemon.dialer(), "v").await.unwrap();
        assert_eq!(
            session.write_at(&[0u8; 512], 2 * OS).await,
            Err(SdError::NoVdi)
        );
    }

    #[tokio::test]
    async fn test_allocation_is_idempotent() {
        // once a slot is allocated, later writes go in place with no
        // further writeback
        let (daemon, _) = daemon_for(test_inode(7, 64 << 20));
        let mut session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        session.write_at(&[5u8; 512], 6 * OS).await.unwrap();
        session.write_at(&[6u8; 512], 6 * OS).await.unwrap();

        let reqs = data_requests(&daemon, after_open);
        let ops: Vec<Opcode> = reqs.iter().map(|r| r.opcode).collect();
        assert_eq!(
            ops,
            vec![Opcode::CreateAndWriteObj, Opcode::WriteObj, Opcode::WriteObj]
        );
        // reqs[1] is the inode writeback, reqs[2] the second data write
        match reqs[2].body {
            RequestBody::Object { oid, .. } => {
                assert_eq!(oid, ObjectId::from_vid_data(7, 6))
            }
            _ => unreachable!(),
        }
        assert_eq!(session.dirty_window(), (6, 6));
    }

    #[tokio::test]
    async fn test_dirty_window_accumulates() {
        let (daemon, _) = daemon_for(test_inode(7, 64 << 20));
        let mut session = open_session(&daemon).await;

        session.write_at(&[0u8; 512], 9 * OS).await.unwrap();
        assert_eq!(session.dirty_window(), (9, 9));

        // the window only grows; writeback does not reset it
        session.write_at(&[0u8; 512], 2 * OS).await.unwrap();
        assert_eq!(session.dirty_window(), (2, 9));
    }

    #[tokio::test]
    async fn test_sync_tolerates_invalid_parms() {
        // S6: INVALID_PARMS means no object cache; still a success
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(0, 7);
        let shared = Arc::new(Mutex::new(inode));
        let handler_inode = shared.clone();
        let daemon = MockDaemon::new(move |req: &SdReq, _: &[u8]| match req.opcode {
            Opcode::LockVdi => MockReply::vdi(handler_inode.lock().unwrap().vdi_id),
            Opcode::ReadObj => MockReply::data(handler_inode.lock().unwrap().encode()),
            Opcode::FlushVdi => MockReply::result(SdError::InvalidParms.to_code()),
            _ => MockReply::success(),
        });

        let mut session = VdiSession::open(daemon.dialer(), "v").await.unwrap();
        let after_open = daemon.requests().len();
        session.sync().await.unwrap();

        let reqs = data_requests(&daemon, after_open);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].opcode, Opcode::FlushVdi);
        match reqs[0].body {
            RequestBody::Object { oid, .. } => assert_eq!(oid, ObjectId::from_vid(7)),
            _ => panic!("FLUSH_VDI addresses the inode object"),
        }
    }

    #[tokio::test]
    async fn test_close_releases_vdi() {
        let (daemon, _) = daemon_for(test_inode(7, 64 << 20));
        let session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        session.close().await;

        let reqs = data_requests(&daemon, after_open);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].opcode, Opcode::ReleaseVdi);
        assert_eq!(reqs[0].flags & SD_FLAG_CMD_WRITE, 0);
        match reqs[0].body {
            RequestBody::Vdi { vdi_id, .. } => assert_eq!(vdi_id, 7),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_close_shrugs_off_release_failure() {
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(0, 7);
        let shared = Arc::new(Mutex::new(inode));
        let handler_inode = shared.clone();
        let daemon = MockDaemon::new(move |req: &SdReq, _: &[u8]| match req.opcode {
            Opcode::LockVdi => MockReply::vdi(handler_inode.lock().unwrap().vdi_id),
            Opcode::ReadObj => MockReply::data(handler_inode.lock().unwrap().encode()),
            Opcode::ReleaseVdi => MockReply::result(SdError::VdiLocked.to_code()),
            _ => MockReply::success(),
        });

        let session = VdiSession::open(daemon.dialer(), "v").await.unwrap();
        session.close().await; // logged, not fatal
    }

    #[tokio::test]
    async fn test_read_failure_propagates() {
        let mut inode = test_inode(7, 64 << 20);
        inode.set_vid(1, 7);
        let shared = Arc::new(Mutex::new(inode));
        let handler_inode = shared.clone();
        let daemon = MockDaemon::new(move |req: &SdReq, _: &[u8]| match req.opcode {
            Opcode::LockVdi => MockReply::vdi(handler_inode.lock().unwrap().vdi_id),
            Opcode::ReadObj => match req.body {
                RequestBody::Object { oid, .. } if oid.is_vdi_obj() => {
                    MockReply::data(handler_inode.lock().unwrap().encode())
                }
                _ => MockReply::result(SdError::NoObj.to_code()),
            },
            _ => MockReply::success(),
        });

        let mut session = VdiSession::open(daemon.dialer(), "v").await.unwrap();
        let mut buf = vec![0u8; 512];
        assert_eq!(
            session.read_at(&mut buf, OS).await,
            Err(SdError::NoObj)
        );
    }

    #[tokio::test]
    async fn test_requests_are_serialized() {
        // a span across many slots arrives as one fully-framed request
        // after another, each answered before the next leaves
        let mut inode = test_inode(7, 64 << 20);
        for i in 0..8 {
            inode.set_vid(i, 7);
        }
        let (daemon, _) = daemon_for(inode);
        let mut session = open_session(&daemon).await;
        let after_open = daemon.requests().len();

        let len = (4 * OS) as usize;
        session.write_at(&vec![7u8; len], 0).await.unwrap();

        let reqs = data_requests(&daemon, after_open);
        assert_eq!(reqs.len(), 4);
        let ids: Vec<u32> = reqs.iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        for (k, req) in reqs.iter().enumerate() {
            match req.body {
                RequestBody::Object { oid, .. } => {
                    assert_eq!(oid, ObjectId::from_vid_data(7, k as u32))
                }
                _ => unreachable!(),
            }
        }
    }
}
