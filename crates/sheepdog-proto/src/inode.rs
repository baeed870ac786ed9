//! The fixed-layout VDI inode.
//!
//! An inode is the metadata object of a VDI: identity, size, replication
//! policy, the snapshot lineage, and the indirection table mapping each
//! logical data-object slot to the VDI id that owns the physical object
//! backing it. It is stored as a single object of exactly [`SD_INODE_SIZE`]
//! bytes and must round-trip byte-for-byte through the codec.

use bytes::{Buf, BufMut};

use crate::constants::*;
use crate::error::{SdError, SdResult};

/// On-wire size of an inode object:
/// name + tag + five u64 fields + (u16, u8, u8) + three u32 ids +
/// child table + data indirection table.
pub const SD_INODE_SIZE: usize = SD_MAX_VDI_LEN
    + SD_MAX_VDI_TAG_LEN
    + 5 * 8
    + 4
    + 3 * 4
    + MAX_CHILDREN * 4
    + (MAX_DATA_OBJS as usize) * 4;

/// VDI inode.
///
/// The indirection table is a dense `2^20`-entry array: slot presence is
/// encoded by the zero value and is wire-observable, so it is never
/// stored sparsely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// VDI name (up to 256 bytes, NUL-padded on the wire).
    pub name: String,
    /// Snapshot tag.
    pub tag: String,
    /// Creation timestamp (epoch seconds).
    pub create_time: u64,
    /// Snapshot creation time (nonzero for snapshots).
    pub snap_ctime: u64,
    /// VM clock in nanoseconds.
    pub vm_clock_nsec: u64,
    /// Virtual disk size in bytes.
    pub vdi_size: u64,
    /// VM state size.
    pub vm_state_size: u64,
    /// Copy policy (0 = replicate).
    pub copy_policy: u16,
    /// Number of replicas.
    pub nr_copies: u8,
    /// log2 of the data object size.
    pub block_size_shift: u8,
    /// Snapshot id.
    pub snap_id: u32,
    /// VDI id.
    pub vdi_id: u32,
    /// Parent VDI id (for snapshots/clones).
    pub parent_vdi_id: u32,
    /// Child VDI ids; always [`MAX_CHILDREN`] entries.
    pub child_vdi_id: Vec<u32>,
    /// Indirection table: data object index → owning VDI id; always
    /// [`MAX_DATA_OBJS`] entries.
    pub data_vdi_id: Vec<u32>,
}

impl Inode {
    /// Create a zeroed inode.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            tag: String::new(),
            create_time: 0,
            snap_ctime: 0,
            vm_clock_nsec: 0,
            vdi_size: 0,
            vm_state_size: 0,
            copy_policy: 0,
            nr_copies: 0,
            block_size_shift: 0,
            snap_id: 0,
            vdi_id: 0,
            parent_vdi_id: 0,
            child_vdi_id: vec![0; MAX_CHILDREN],
            data_vdi_id: vec![0; MAX_DATA_OBJS as usize],
        }
    }

    /// The VDI id owning the data object at `idx`, 0 if unallocated.
    #[inline]
    pub fn get_vid(&self, idx: u32) -> u32 {
        self.data_vdi_id[idx as usize]
    }

    /// Set the owning VDI id for the data object at `idx`.
    #[inline]
    pub fn set_vid(&mut self, idx: u32, vid: u32) {
        self.data_vdi_id[idx as usize] = vid;
    }

    /// Whether the data object at `idx` can be written in place (it is
    /// owned by this inode rather than a parent snapshot).
    #[inline]
    pub fn is_writable_slot(&self, idx: u32) -> bool {
        self.vdi_id == self.get_vid(idx)
    }

    /// Whether this inode is a snapshot.
    pub fn is_snapshot(&self) -> bool {
        self.snap_ctime != 0
    }

    /// Decode an inode from exactly [`SD_INODE_SIZE`] bytes.
    pub fn decode(buf: &[u8]) -> SdResult<Self> {
        if buf.len() != SD_INODE_SIZE {
            return Err(SdError::InvalidParms);
        }
        let mut buf = buf;

        let name = take_padded_str(&mut buf, SD_MAX_VDI_LEN);
        let tag = take_padded_str(&mut buf, SD_MAX_VDI_TAG_LEN);

        let create_time = buf.get_u64_le();
        let snap_ctime = buf.get_u64_le();
        let vm_clock_nsec = buf.get_u64_le();
        let vdi_size = buf.get_u64_le();
        let vm_state_size = buf.get_u64_le();
        let copy_policy = buf.get_u16_le();
        let nr_copies = buf.get_u8();
        let block_size_shift = buf.get_u8();
        let snap_id = buf.get_u32_le();
        let vdi_id = buf.get_u32_le();
        let parent_vdi_id = buf.get_u32_le();

        let mut child_vdi_id = vec![0u32; MAX_CHILDREN];
        for c in &mut child_vdi_id {
            *c = buf.get_u32_le();
        }
        let mut data_vdi_id = vec![0u32; MAX_DATA_OBJS as usize];
        for d in &mut data_vdi_id {
            *d = buf.get_u32_le();
        }

        Ok(Self {
            name,
            tag,
            create_time,
            snap_ctime,
            vm_clock_nsec,
            vdi_size,
            vm_state_size,
            copy_policy,
            nr_copies,
            block_size_shift,
            snap_id,
            vdi_id,
            parent_vdi_id,
            child_vdi_id,
            data_vdi_id,
        })
    }

    /// Encode into exactly [`SD_INODE_SIZE`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SD_INODE_SIZE);
        put_padded_str(&mut buf, &self.name, SD_MAX_VDI_LEN);
        put_padded_str(&mut buf, &self.tag, SD_MAX_VDI_TAG_LEN);
        buf.put_u64_le(self.create_time);
        buf.put_u64_le(self.snap_ctime);
        buf.put_u64_le(self.vm_clock_nsec);
        buf.put_u64_le(self.vdi_size);
        buf.put_u64_le(self.vm_state_size);
        buf.put_u16_le(self.copy_policy);
        buf.put_u8(self.nr_copies);
        buf.put_u8(self.block_size_shift);
        buf.put_u32_le(self.snap_id);
        buf.put_u32_le(self.vdi_id);
        buf.put_u32_le(self.parent_vdi_id);
        for &c in &self.child_vdi_id {
            buf.put_u32_le(c);
        }
        for &d in &self.data_vdi_id {
            buf.put_u32_le(d);
        }
        debug_assert_eq!(buf.len(), SD_INODE_SIZE);
        buf
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a NUL-padded fixed-width string field.
fn take_padded_str(buf: &mut &[u8], width: usize) -> String {
    let raw = &buf[..width];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    let s = String::from_utf8_lossy(&raw[..end]).into_owned();
    buf.advance(width);
    s
}

/// Write a string as a NUL-padded fixed-width field, truncating if needed.
fn put_padded_str(buf: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (width - n), 0);
}
