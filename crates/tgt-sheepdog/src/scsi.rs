//! SCSI command descriptor and sense data.
//!
//! Only what crosses the backing-store boundary: the CDB, the pre-decoded
//! byte offset, the data buffers, and the completion status. CDB parsing
//! beyond the opcode byte is the target framework's business.

// Opcodes dispatched by the backing store (CDB byte 0)
pub const READ_6: u8 = 0x08;
pub const WRITE_6: u8 = 0x0A;
pub const READ_10: u8 = 0x28;
pub const WRITE_10: u8 = 0x2A;
pub const READ_12: u8 = 0xA8;
pub const WRITE_12: u8 = 0xAA;
pub const READ_16: u8 = 0x88;
pub const WRITE_16: u8 = 0x8A;
pub const SYNCHRONIZE_CACHE: u8 = 0x35;
pub const SYNCHRONIZE_CACHE_16: u8 = 0x91;

// SAM status codes
pub const SAM_STAT_GOOD: u8 = 0x00;
pub const SAM_STAT_CHECK_CONDITION: u8 = 0x02;

/// Sense key: medium error.
pub const MEDIUM_ERROR: u8 = 0x03;
/// Additional sense code: unrecovered read error.
pub const ASC_READ_ERROR: u16 = 0x1103;

/// Sense data attached to a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseData {
    pub key: u8,
    pub asc: u16,
}

/// One SCSI command as handed to the backing store.
#[derive(Debug, Default)]
pub struct ScsiCmd {
    /// Raw command descriptor block; byte 0 is the opcode.
    pub cdb: [u8; 16],
    /// Byte offset on the logical unit, decoded by the framework.
    pub offset: u64,
    /// Data-out payload (initiator to device; WRITE commands).
    pub out_buffer: Vec<u8>,
    /// Data-in payload (device to initiator; READ commands). The
    /// framework sizes it to the transfer length.
    pub in_buffer: Vec<u8>,
    /// SAM completion status.
    pub result: u8,
    /// Sense data when `result` is CHECK_CONDITION.
    pub sense: Option<SenseData>,
}

impl ScsiCmd {
    pub fn new(opcode: u8) -> Self {
        let mut cmd = Self::default();
        cmd.cdb[0] = opcode;
        cmd
    }

    /// The opcode byte.
    pub fn opcode(&self) -> u8 {
        self.cdb[0]
    }

    /// Fail the command as a medium error.
    pub fn set_medium_error(&mut self) {
        self.result = SAM_STAT_CHECK_CONDITION;
        self.sense = Some(SenseData {
            key: MEDIUM_ERROR,
            asc: ASC_READ_ERROR,
        });
    }
}
