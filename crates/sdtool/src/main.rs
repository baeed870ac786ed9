//! sdtool — inspect sheepdog VDIs from the command line.
//!
//! Talks to a sheep daemon over the client protocol. `info` looks a VDI
//! up without locking it; `read` and `flush` open a real volume session
//! (taking the lock) for the duration of the command.
//!
//! # Usage
//!
//! ```text
//! sdtool [OPTIONS] <COMMAND>
//!
//! Commands:
//!   info   Show VDI metadata
//!   read   Read a byte range of a VDI to stdout
//!   flush  Flush the daemon's object cache for a VDI
//!
//! Options:
//!   -a, --address <ADDRESS>  Sheep daemon address [default: 127.0.0.1]
//!   -p, --port <PORT>        Sheep daemon port [default: 7000]
//! ```

mod common;

use std::io::Write;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sheepdog_client::{rpc, Connection, Dial, TcpDialer, VdiSession};
use sheepdog_proto::inode::SD_INODE_SIZE;
use sheepdog_proto::{Inode, ObjectId, SdResult};

use crate::common::{exit_error, format_size, format_time, parse_size};

/// Sheepdog VDI inspection tool.
#[derive(Parser)]
#[command(name = "sdtool", version, about = "Sheepdog VDI inspection tool")]
struct Cli {
    /// Sheep daemon address
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    address: String,

    /// Sheep daemon port
    #[arg(short = 'p', long, default_value_t = 7000)]
    port: u16,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show VDI metadata
    Info {
        /// VDI name
        name: String,
    },
    /// Read a byte range of a VDI and write it to stdout
    Read {
        /// VDI name
        name: String,
        /// Byte offset
        #[arg(short = 'o', long, default_value_t = 0)]
        offset: u64,
        /// Length (e.g. 4096, 512K, 4M)
        #[arg(short = 'l', long, default_value = "4K")]
        length: String,
    },
    /// Flush the daemon's object cache for a VDI
    Flush {
        /// VDI name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let dialer = TcpDialer::new(cli.address, cli.port);

    match cli.command {
        Commands::Info { name } => {
            let inode = match fetch_inode(&dialer, &name).await {
                Ok(inode) => inode,
                Err(e) => exit_error(&format!("cannot read vdi '{}': {}", name, e)),
            };
            print_inode(&inode);
        }
        Commands::Read { name, offset, length } => {
            let length = parse_size(&length).unwrap_or_else(|e| exit_error(&e));
            if let Err(e) = read_range(&dialer, &name, offset, length).await {
                exit_error(&format!("read failed: {}", e));
            }
        }
        Commands::Flush { name } => {
            if let Err(e) = flush(&dialer, &name).await {
                exit_error(&format!("flush failed: {}", e));
            }
            println!("flushed '{}'", name);
        }
    }
}

/// Look a VDI up (without locking it) and read its inode.
async fn fetch_inode(dialer: &TcpDialer, name: &str) -> SdResult<Inode> {
    let stream = dialer.dial().await?;
    let mut conn = Connection::new(stream);
    let vid = rpc::find_vdi(&mut conn, name, "", 0, true).await?;

    let mut buf = vec![0u8; SD_INODE_SIZE];
    rpc::read_object(&mut conn, ObjectId::from_vid(vid), 0, &mut buf, 0).await?;
    Inode::decode(&buf)
}

fn print_inode(inode: &Inode) {
    println!("Name      {}", inode.name);
    println!("Id        {:#x}", inode.vdi_id);
    println!("Size      {}", format_size(inode.vdi_size));
    println!("Copies    {}", inode.nr_copies);
    println!("Created   {}", format_time(inode.create_time));
    if inode.is_snapshot() {
        println!("Snapshot  {} (tag '{}')", inode.snap_id, inode.tag);
    }
    if inode.parent_vdi_id != 0 {
        println!("Parent    {:#x}", inode.parent_vdi_id);
    }
    let allocated = inode.data_vdi_id.iter().filter(|&&v| v != 0).count() as u64;
    println!(
        "Used      {}",
        format_size(allocated * sheepdog_proto::constants::SD_DATA_OBJ_SIZE)
    );
}

/// Open a session, read the range, dump it to stdout.
async fn read_range(dialer: &TcpDialer, name: &str, offset: u64, length: u64) -> SdResult<()> {
    let mut session = VdiSession::open(dialer.clone(), name).await?;
    if offset + length > session.size() {
        let size = session.size();
        session.close().await;
        exit_error(&format!(
            "range {}..{} exceeds vdi size {}",
            offset,
            offset + length,
            size
        ));
    }

    let mut buf = vec![0u8; length as usize];
    let ret = session.read_at(&mut buf, offset).await;
    session.close().await;
    ret?;

    std::io::stdout()
        .write_all(&buf)
        .map_err(sheepdog_proto::SdError::from)?;
    Ok(())
}

/// Open a session just long enough to flush the volume.
async fn flush(dialer: &TcpDialer, name: &str) -> SdResult<()> {
    let mut session = VdiSession::open(dialer.clone(), name).await?;
    let ret = session.sync().await;
    session.close().await;
    ret
}
