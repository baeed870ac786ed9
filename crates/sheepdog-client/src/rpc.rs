//! Typed object and VDI operations over a [`Connection`].
//!
//! Each wrapper builds the request header, runs the exchange, and turns
//! the result code into a typed outcome. Result-code policy lives here:
//! `READONLY` on a write is reported to the caller as a reload request,
//! `INVALID_PARMS` on a flush and `VDI_NOT_LOCKED` on a release are
//! success.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::error;

use sheepdog_proto::constants::SD_FLAG_CMD_WRITE;
use sheepdog_proto::wire::pack_name_tag;
use sheepdog_proto::{ObjectId, Opcode, ResponseBody, SdError, SdReq, SdResult};

use crate::conn::Connection;

/// Read `buf.len()` bytes of an object at `offset`.
pub async fn read_object<S>(
    conn: &mut Connection<S>,
    oid: ObjectId,
    copies: u32,
    buf: &mut [u8],
    offset: u64,
) -> SdResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut req = SdReq::object(Opcode::ReadObj, oid, ObjectId::new(0), copies, offset);
    req.data_length = buf.len() as u32;
    let (rsp, _) = conn.do_req(&mut req, &[], buf).await?;
    match rsp.err() {
        None => Ok(()),
        Some(e) => {
            error!("{} (oid: {})", e, oid);
            Err(e)
        }
    }
}

/// Write an object at `offset`.
///
/// With `create` the request becomes CREATE_AND_WRITE_OBJ carrying
/// `cow_oid` as the copy-on-write source (zero for a plain allocation).
/// Returns whether the caller must reload its inode: the server answers
/// `READONLY` when the target object was frozen by a concurrent
/// snapshot, which is not a failure.
#[allow(clippy::too_many_arguments)]
pub async fn write_object<S>(
    conn: &mut Connection<S>,
    oid: ObjectId,
    copies: u32,
    data: &[u8],
    offset: u64,
    create: bool,
    cow_oid: ObjectId,
    flags: u16,
) -> SdResult<bool>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let opcode = if create {
        Opcode::CreateAndWriteObj
    } else {
        Opcode::WriteObj
    };
    let mut req = SdReq::object(opcode, oid, cow_oid, copies, offset);
    req.flags = flags | SD_FLAG_CMD_WRITE;
    req.data_length = data.len() as u32;
    let (rsp, _) = conn.do_req(&mut req, data, &mut []).await?;
    match rsp.err() {
        None => Ok(false),
        Some(SdError::ReadOnly) => Ok(true),
        Some(e) => {
            error!("{} (oid: {}, cow_oid: {})", e, oid, cow_oid);
            Err(e)
        }
    }
}

/// Flush the server-side object cache for a VDI.
pub async fn flush_vdi<S>(conn: &mut Connection<S>, vid: u32) -> SdResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut req = SdReq::object(Opcode::FlushVdi, ObjectId::from_vid(vid), ObjectId::new(0), 0, 0);
    let (rsp, _) = conn.do_req(&mut req, &[], &mut []).await?;
    match rsp.err() {
        None => Ok(()),
        // INVALID_PARMS: the daemon runs without an object cache, nothing to flush
        Some(SdError::InvalidParms) => Ok(()),
        Some(e) => {
            error!("{}", e);
            Err(e)
        }
    }
}

/// Release the lock on a VDI.
///
/// Goes out without `SD_FLAG_CMD_WRITE` even though the other VDI
/// operations set it. `VDI_NOT_LOCKED` counts as released.
pub async fn release_vdi<S>(conn: &mut Connection<S>, vid: u32) -> SdResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut req = SdReq::vdi(Opcode::ReleaseVdi, 0, vid, 0, 0);
    let (rsp, _) = conn.do_req(&mut req, &[], &mut []).await?;
    match rsp.err() {
        None | Some(SdError::VdiNotLocked) => Ok(()),
        Some(e) => Err(e),
    }
}

/// Resolve a VDI name (and optional tag/snapshot id) to its VDI id.
///
/// `for_snapshot` looks the VDI up without taking the lock; the normal
/// path locks it as a side effect.
pub async fn find_vdi<S>(
    conn: &mut Connection<S>,
    name: &str,
    tag: &str,
    snapid: u32,
    for_snapshot: bool,
) -> SdResult<u32>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let opcode = if for_snapshot {
        Opcode::GetVdiInfo
    } else {
        Opcode::LockVdi
    };
    let payload = pack_name_tag(name, tag);
    let mut req = SdReq::vdi(opcode, 0, 0, 0, snapid);
    req.flags = SD_FLAG_CMD_WRITE;
    req.data_length = payload.len() as u32;
    let (rsp, _) = conn.do_req(&mut req, &payload, &mut []).await?;
    if let Some(e) = rsp.err() {
        error!("cannot get vdi info, {}, {} {} {}", e, name, snapid, tag);
        return Err(e);
    }
    match rsp.body {
        ResponseBody::Vdi { vdi_id } => Ok(vdi_id),
        _ => Err(SdError::SystemError),
    }
}
