/// Sheepdog protocol and system constants.

/// Client protocol version spoken by this backing store.
pub const SD_PROTO_VER: u8 = 0x01;

/// Default daemon address for client connections.
pub const SD_DEFAULT_ADDR: &str = "localhost";
/// Default listen port for client connections.
pub const SD_DEFAULT_PORT: u16 = 7000;

/// Request carries a payload written to the server.
pub const SD_FLAG_CMD_WRITE: u16 = 0x01;
/// Request is a copy-on-write allocation.
pub const SD_FLAG_CMD_COW: u16 = 0x02;
/// Writeback mode for the server-side object cache.
pub const SD_FLAG_CMD_CACHE: u16 = 0x04;
/// Bypass the server-side object cache.
pub const SD_FLAG_CMD_DIRECT: u16 = 0x08;

/// Data object size (4 MB).
pub const SD_DATA_OBJ_SIZE: u64 = 1 << 22;
/// Maximum data objects per VDI (20-bit data object index).
pub const MAX_DATA_OBJS: u64 = 1 << 20;
/// Maximum snapshot/clone children tracked in an inode.
pub const MAX_CHILDREN: usize = 1024;

/// Maximum VDI name length (bytes, NUL-padded on the wire).
pub const SD_MAX_VDI_LEN: usize = 256;
/// Maximum VDI tag length (bytes, NUL-padded on the wire).
pub const SD_MAX_VDI_TAG_LEN: usize = 256;

/// Total number of VDIs (24-bit VDI id space).
pub const SD_NR_VDIS: u32 = 1 << 24;

/// Maximum VDI size.
pub const SD_MAX_VDI_SIZE: u64 = SD_DATA_OBJ_SIZE * MAX_DATA_OBJS;

/// Snapshot id meaning "the current (writable) VDI".
pub const CURRENT_VDI_ID: u32 = 0;
