//! # sheepdog-client
//!
//! Client side of the sheepdog block protocol: dials the daemon, exchanges
//! framed requests over a single TCP connection per open volume, and runs
//! the per-volume I/O engine (sparse reads, copy-on-write allocation,
//! stale-inode reload, deferred inode writeback).
//!
//! The entry point is [`VdiSession`]: one session per open volume, owned
//! by a single caller for its whole lifetime.

pub mod conn;
pub mod net;
pub mod rpc;
pub mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use conn::Connection;
pub use net::{Dial, TcpDialer};
pub use session::VdiSession;
