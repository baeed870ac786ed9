//! # tgt-sheepdog
//!
//! SCSI target backing store for sheepdog volumes: translates SCSI
//! READ/WRITE/SYNCHRONIZE_CACHE commands on a logical unit into volume
//! session calls, and maps failures into SCSI sense data.
//!
//! The target framework owns the threading: it calls [`BackingStore`]
//! methods from the logical unit's worker thread, one command at a time.
//! The store bridges those synchronous calls onto the async client with
//! a per-LU current-thread runtime.

pub mod backend;
pub mod scsi;
pub mod store;

pub use backend::{register, SheepdogStore, SheepdogTemplate};
pub use scsi::{ScsiCmd, SenseData};
pub use store::{BackingStore, BackingStoreTemplate, Registry};
