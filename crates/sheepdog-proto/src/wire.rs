//! Fixed-layout request/response headers and their codec.
//!
//! Every message starts with a 48-byte header: a 16-byte common prefix
//! (protocol version, opcode, flags, epoch, id, data length) followed by a
//! 32-byte opcode-specific body. Integers are little-endian on the wire.
//! Payloads follow the header and are delimited by `data_length`.
//!
//! The header buffer is never reinterpreted through casts; each opcode
//! family gets a typed body variant and all conversion goes through
//! [`SdReq::encode`]/[`SdReq::decode`] (and the response equivalents).

use bytes::{Buf, BufMut};

use crate::constants::*;
use crate::error::{SdError, SdResult};
use crate::oid::ObjectId;

/// Size of every request and response header on the wire.
pub const SD_HDR_SIZE: usize = 48;

/// Client protocol opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    CreateAndWriteObj = 0x01,
    ReadObj = 0x02,
    WriteObj = 0x03,
    // 0x04 is used internally by the daemon
    DiscardObj = 0x05,

    NewVdi = 0x11,
    LockVdi = 0x12,
    ReleaseVdi = 0x13,
    GetVdiInfo = 0x14,
    ReadVdis = 0x15,
    FlushVdi = 0x16,
    DelVdi = 0x17,
}

/// The three 32-byte body shapes a header can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape {
    Generic,
    Object,
    Vdi,
}

impl Opcode {
    /// Parse a raw opcode byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::CreateAndWriteObj),
            0x02 => Some(Self::ReadObj),
            0x03 => Some(Self::WriteObj),
            0x05 => Some(Self::DiscardObj),
            0x11 => Some(Self::NewVdi),
            0x12 => Some(Self::LockVdi),
            0x13 => Some(Self::ReleaseVdi),
            0x14 => Some(Self::GetVdiInfo),
            0x15 => Some(Self::ReadVdis),
            0x16 => Some(Self::FlushVdi),
            0x17 => Some(Self::DelVdi),
            _ => None,
        }
    }

    /// The raw opcode byte.
    #[inline]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Which body shape this opcode travels in.
    ///
    /// FLUSH_VDI addresses the inode object through the `oid` field, so it
    /// uses the object shape in both directions.
    pub const fn shape(self) -> HeaderShape {
        match self {
            Self::CreateAndWriteObj
            | Self::ReadObj
            | Self::WriteObj
            | Self::DiscardObj
            | Self::FlushVdi => HeaderShape::Object,
            Self::NewVdi
            | Self::LockVdi
            | Self::ReleaseVdi
            | Self::GetVdiInfo
            | Self::ReadVdis
            | Self::DelVdi => HeaderShape::Vdi,
        }
    }
}

/// Opcode-specific body of a request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody {
    /// Raw opcode-specific words with no typed layout.
    Generic([u32; 8]),
    /// Object operations.
    Object {
        oid: ObjectId,
        cow_oid: ObjectId,
        copies: u32,
        offset: u64,
    },
    /// VDI operations.
    Vdi {
        vdi_size: u64,
        vdi_id: u32,
        copies: u32,
        snapid: u32,
    },
}

/// A request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdReq {
    pub opcode: Opcode,
    pub flags: u16,
    pub epoch: u32,
    pub id: u32,
    pub data_length: u32,
    pub body: RequestBody,
}

impl SdReq {
    /// Build an object-shape request.
    pub fn object(opcode: Opcode, oid: ObjectId, cow_oid: ObjectId, copies: u32, offset: u64) -> Self {
        Self {
            opcode,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length: 0,
            body: RequestBody::Object { oid, cow_oid, copies, offset },
        }
    }

    /// Build a VDI-shape request.
    pub fn vdi(opcode: Opcode, vdi_size: u64, vdi_id: u32, copies: u32, snapid: u32) -> Self {
        Self {
            opcode,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length: 0,
            body: RequestBody::Vdi { vdi_size, vdi_id, copies, snapid },
        }
    }

    /// Encode into exactly [`SD_HDR_SIZE`] bytes.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(SD_PROTO_VER);
        buf.put_u8(self.opcode.raw());
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.epoch);
        buf.put_u32_le(self.id);
        buf.put_u32_le(self.data_length);
        match self.body {
            RequestBody::Generic(words) => {
                for w in words {
                    buf.put_u32_le(w);
                }
            }
            RequestBody::Object { oid, cow_oid, copies, offset } => {
                buf.put_u64_le(oid.raw());
                buf.put_u64_le(cow_oid.raw());
                buf.put_u32_le(copies);
                buf.put_u32_le(0);
                buf.put_u64_le(offset);
            }
            RequestBody::Vdi { vdi_size, vdi_id, copies, snapid } => {
                buf.put_u64_le(vdi_size);
                buf.put_u32_le(vdi_id);
                buf.put_u32_le(copies);
                buf.put_u32_le(snapid);
                buf.put_u32_le(0);
                buf.put_u32_le(0);
                buf.put_u32_le(0);
            }
        }
    }

    /// Decode a [`SD_HDR_SIZE`]-byte header.
    pub fn decode(mut buf: &[u8]) -> SdResult<Self> {
        if buf.len() < SD_HDR_SIZE {
            return Err(SdError::InvalidParms);
        }
        let proto_ver = buf.get_u8();
        if proto_ver != SD_PROTO_VER {
            return Err(SdError::VerMismatch);
        }
        let opcode = Opcode::from_raw(buf.get_u8()).ok_or(SdError::InvalidParms)?;
        let flags = buf.get_u16_le();
        let epoch = buf.get_u32_le();
        let id = buf.get_u32_le();
        let data_length = buf.get_u32_le();
        let body = match opcode.shape() {
            HeaderShape::Generic => {
                let mut words = [0u32; 8];
                for w in &mut words {
                    *w = buf.get_u32_le();
                }
                RequestBody::Generic(words)
            }
            HeaderShape::Object => {
                let oid = ObjectId::new(buf.get_u64_le());
                let cow_oid = ObjectId::new(buf.get_u64_le());
                let copies = buf.get_u32_le();
                let _rsvd = buf.get_u32_le();
                let offset = buf.get_u64_le();
                RequestBody::Object { oid, cow_oid, copies, offset }
            }
            HeaderShape::Vdi => {
                let vdi_size = buf.get_u64_le();
                let vdi_id = buf.get_u32_le();
                let copies = buf.get_u32_le();
                let snapid = buf.get_u32_le();
                RequestBody::Vdi { vdi_size, vdi_id, copies, snapid }
            }
        };
        Ok(Self { opcode, flags, epoch, id, data_length, body })
    }
}

/// Opcode-specific body of a response header, after the result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBody {
    /// Raw opcode-specific words with no typed layout.
    Generic([u32; 7]),
    /// Object operations.
    Object { copies: u32 },
    /// VDI operations.
    Vdi { vdi_id: u32 },
}

/// A response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdRsp {
    pub opcode: Opcode,
    pub flags: u16,
    pub epoch: u32,
    pub id: u32,
    pub data_length: u32,
    pub result: u32,
    pub body: ResponseBody,
}

impl SdRsp {
    /// Build an object-shape response.
    pub fn object(opcode: Opcode, result: u32, copies: u32) -> Self {
        Self {
            opcode,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length: 0,
            result,
            body: ResponseBody::Object { copies },
        }
    }

    /// Build a VDI-shape response.
    pub fn vdi(opcode: Opcode, result: u32, vdi_id: u32) -> Self {
        Self {
            opcode,
            flags: 0,
            epoch: 0,
            id: 0,
            data_length: 0,
            result,
            body: ResponseBody::Vdi { vdi_id },
        }
    }

    /// The result code as an error. `None` means success.
    pub fn err(&self) -> Option<SdError> {
        SdError::from_code(self.result)
    }

    /// Encode into exactly [`SD_HDR_SIZE`] bytes.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(SD_PROTO_VER);
        buf.put_u8(self.opcode.raw());
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.epoch);
        buf.put_u32_le(self.id);
        buf.put_u32_le(self.data_length);
        buf.put_u32_le(self.result);
        match self.body {
            ResponseBody::Generic(words) => {
                for w in words {
                    buf.put_u32_le(w);
                }
            }
            ResponseBody::Object { copies } => {
                buf.put_u32_le(copies);
                for _ in 0..6 {
                    buf.put_u32_le(0);
                }
            }
            ResponseBody::Vdi { vdi_id } => {
                buf.put_u32_le(0);
                buf.put_u32_le(vdi_id);
                for _ in 0..5 {
                    buf.put_u32_le(0);
                }
            }
        }
    }

    /// Decode a [`SD_HDR_SIZE`]-byte header.
    pub fn decode(mut buf: &[u8]) -> SdResult<Self> {
        if buf.len() < SD_HDR_SIZE {
            return Err(SdError::InvalidParms);
        }
        let proto_ver = buf.get_u8();
        if proto_ver != SD_PROTO_VER {
            return Err(SdError::VerMismatch);
        }
        let opcode = Opcode::from_raw(buf.get_u8()).ok_or(SdError::InvalidParms)?;
        let flags = buf.get_u16_le();
        let epoch = buf.get_u32_le();
        let id = buf.get_u32_le();
        let data_length = buf.get_u32_le();
        let result = buf.get_u32_le();
        let body = match opcode.shape() {
            HeaderShape::Generic => {
                let mut words = [0u32; 7];
                for w in &mut words {
                    *w = buf.get_u32_le();
                }
                ResponseBody::Generic(words)
            }
            HeaderShape::Object => {
                let copies = buf.get_u32_le();
                ResponseBody::Object { copies }
            }
            HeaderShape::Vdi => {
                let _rsvd = buf.get_u32_le();
                let vdi_id = buf.get_u32_le();
                ResponseBody::Vdi { vdi_id }
            }
        };
        Ok(Self { opcode, flags, epoch, id, data_length, result, body })
    }
}

/// Pack a VDI name and tag into the `name[256] || tag[256]` payload used
/// by LOCK_VDI / GET_VDI_INFO / NEW_VDI / DEL_VDI. Both fields are
/// NUL-padded; overlong values are truncated.
pub fn pack_name_tag(name: &str, tag: &str) -> Vec<u8> {
    let mut buf = vec![0u8; SD_MAX_VDI_LEN + SD_MAX_VDI_TAG_LEN];
    let name = name.as_bytes();
    let n = name.len().min(SD_MAX_VDI_LEN);
    buf[..n].copy_from_slice(&name[..n]);
    let tag = tag.as_bytes();
    let t = tag.len().min(SD_MAX_VDI_TAG_LEN);
    buf[SD_MAX_VDI_LEN..SD_MAX_VDI_LEN + t].copy_from_slice(&tag[..t]);
    buf
}
