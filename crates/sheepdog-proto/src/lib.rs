//! # sheepdog-proto
//!
//! Client-side protocol layer for the sheepdog distributed object store.
//!
//! This crate defines the wire protocol spoken to a sheep daemon over TCP:
//! protocol constants, 64-bit object ID manipulation, result codes, the
//! fixed 48-byte request/response headers with their codec, and the
//! fixed-layout VDI inode.

pub mod constants;
pub mod error;
pub mod inode;
pub mod oid;
pub mod wire;

// Re-export commonly used types at the crate root
pub use error::{SdError, SdResult};
pub use inode::Inode;
pub use oid::ObjectId;
pub use wire::{Opcode, RequestBody, ResponseBody, SdReq, SdRsp};
