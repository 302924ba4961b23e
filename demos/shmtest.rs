//! Shared memory smoke test
//!
//! Usage: shmtest <shm_name>
//!
//! Opens (or creates) a segment, writes a banner into it and prints what
//! the segment holds afterwards.

use std::process::ExitCode;

use osal::types::{ShmAttr, ShmMapAttr};
use osal::{OsalError, SharedMemory};

const SEGMENT_SIZE: usize = 4096;

fn run(name: &str) -> Result<(), OsalError> {
    osal::init(osal::OsalConfig::new())?;

    let shm = SharedMemory::open(name, ShmAttr::create_rw(), SEGMENT_SIZE)?;
    println!("{}: {} bytes, fd {}", shm.name(), shm.size(), shm.fd());

    let mut mapping = shm.map(ShmMapAttr::PROT_READ | ShmMapAttr::PROT_WRITE | ShmMapAttr::SHARED)?;

    let banner = format!("hello from pid {}\0", std::process::id());
    // SAFETY: the mapping is writable and private to this demo.
    let bytes = unsafe { mapping.as_mut_slice() };
    let n = banner.len().min(bytes.len());
    bytes[..n].copy_from_slice(&banner.as_bytes()[..n]);

    let text_len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    println!("content: {}", String::from_utf8_lossy(&bytes[..text_len]));

    mapping.unmap()?;
    shm.close()
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <shm_name>", args[0]);
        return ExitCode::from(1);
    }

    match run(&args[1]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shmtest: {}", e);
            ExitCode::from(e.code() as u8)
        }
    }
}
