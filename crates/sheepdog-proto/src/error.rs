/// Sheepdog result codes and error type.
///
/// Every response header carries a 32-bit result code. `0x00` is success;
/// the remaining codes of the client protocol are represented here as a
/// single enum so they can be matched, logged, and converted back to their
/// wire value.

use thiserror::Error;

/// Unified error type for all sheepdog client operations.
///
/// Transport failures (connection closed, socket errors) fold into
/// [`SdError::Eio`]; everything else maps one-to-one onto a protocol
/// result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SdError {
    #[error("unknown error")]
    Unknown,
    #[error("no object found")]
    NoObj,
    #[error("I/O error")]
    Eio,
    #[error("VDI exists already")]
    VdiExist,
    #[error("invalid parameters")]
    InvalidParms,
    #[error("system error")]
    SystemError,
    #[error("VDI is already locked")]
    VdiLocked,
    #[error("no VDI found")]
    NoVdi,
    #[error("no base VDI found")]
    NoBaseVdi,
    #[error("failed to read the requested VDI")]
    VdiRead,
    #[error("failed to write the requested VDI")]
    VdiWrite,
    #[error("failed to read the base VDI")]
    BaseVdiRead,
    #[error("failed to write the base VDI")]
    BaseVdiWrite,
    #[error("failed to find the requested tag")]
    NoTag,
    #[error("the system is still booting")]
    Startup,
    #[error("VDI is not locked")]
    VdiNotLocked,
    #[error("the system is shutting down")]
    Shutdown,
    #[error("out of memory on the server")]
    NoMem,
    #[error("maximum number of VDIs reached")]
    FullVdi,
    #[error("protocol version mismatch")]
    VerMismatch,
    #[error("server has no space for new objects")]
    NoSpace,
    #[error("waiting for a format operation")]
    WaitForFormat,
    #[error("waiting for other nodes to join")]
    WaitForJoin,
    #[error("target node failed to join")]
    JoinFailed,
    #[error("server has stopped serving I/O requests")]
    Halt,
    #[error("object is read-only")]
    ReadOnly,
}

impl SdError {
    /// Convert a raw result code to an error. `None` means success.
    /// Codes this client does not know collapse to [`SdError::Unknown`].
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x00 => None,
            0x01 => Some(Self::Unknown),
            0x02 => Some(Self::NoObj),
            0x03 => Some(Self::Eio),
            0x04 => Some(Self::VdiExist),
            0x05 => Some(Self::InvalidParms),
            0x06 => Some(Self::SystemError),
            0x07 => Some(Self::VdiLocked),
            0x08 => Some(Self::NoVdi),
            0x09 => Some(Self::NoBaseVdi),
            0x0A => Some(Self::VdiRead),
            0x0B => Some(Self::VdiWrite),
            0x0C => Some(Self::BaseVdiRead),
            0x0D => Some(Self::BaseVdiWrite),
            0x0E => Some(Self::NoTag),
            0x0F => Some(Self::Startup),
            0x10 => Some(Self::VdiNotLocked),
            0x11 => Some(Self::Shutdown),
            0x12 => Some(Self::NoMem),
            0x13 => Some(Self::FullVdi),
            0x14 => Some(Self::VerMismatch),
            0x15 => Some(Self::NoSpace),
            0x16 => Some(Self::WaitForFormat),
            0x17 => Some(Self::WaitForJoin),
            0x18 => Some(Self::JoinFailed),
            0x19 => Some(Self::Halt),
            0x1A => Some(Self::ReadOnly),
            _ => Some(Self::Unknown),
        }
    }

    /// Convert to the raw protocol result code.
    pub fn to_code(self) -> u32 {
        match self {
            Self::Unknown => 0x01,
            Self::NoObj => 0x02,
            Self::Eio => 0x03,
            Self::VdiExist => 0x04,
            Self::InvalidParms => 0x05,
            Self::SystemError => 0x06,
            Self::VdiLocked => 0x07,
            Self::NoVdi => 0x08,
            Self::NoBaseVdi => 0x09,
            Self::VdiRead => 0x0A,
            Self::VdiWrite => 0x0B,
            Self::BaseVdiRead => 0x0C,
            Self::BaseVdiWrite => 0x0D,
            Self::NoTag => 0x0E,
            Self::Startup => 0x0F,
            Self::VdiNotLocked => 0x10,
            Self::Shutdown => 0x11,
            Self::NoMem => 0x12,
            Self::FullVdi => 0x13,
            Self::VerMismatch => 0x14,
            Self::NoSpace => 0x15,
            Self::WaitForFormat => 0x16,
            Self::WaitForJoin => 0x17,
            Self::JoinFailed => 0x18,
            Self::Halt => 0x19,
            Self::ReadOnly => 0x1A,
        }
    }
}

/// Result type alias for sheepdog operations.
pub type SdResult<T> = Result<T, SdError>;

impl From<std::io::Error> for SdError {
    fn from(_: std::io::Error) -> Self {
        SdError::Eio
    }
}
