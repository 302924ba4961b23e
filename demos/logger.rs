//! Log collector - prints messages from a shared memory log ring
//!
//! Usage: logger <shm_name>
//!
//! Attaches to a ring set up by `osal::io::shm_setup` in another process
//! and copies every message to standard output.

use std::io::Write;
use std::process::ExitCode;

use osal::config::IO_FORMAT_BUF_SIZE;
use osal::io::ShmLog;
use osal::{OsalError, Timer};

const POLL_NS: u64 = 1_000_000_000;

fn run(name: &str) -> Result<(), OsalError> {
    osal::init(osal::OsalConfig::new())?;
    let log = ShmLog::attach(name)?;

    println!(
        "attached to {}: {} slots of {} bytes",
        name,
        log.max_messages(),
        log.max_message_size()
    );

    let mut buf = vec![0u8; log.max_message_size().max(IO_FORMAT_BUF_SIZE)];
    let mut out = std::io::stdout();
    loop {
        match log.get_message(&mut buf, Some(&Timer::with_timeout(POLL_NS))) {
            Ok(len) => {
                out.write_all(&buf[..len])
                    .and_then(|_| out.flush())
                    .map_err(|_| OsalError::OperationFailed)?;
            }
            Err(OsalError::Unavailable) => continue,
            Err(e) => return Err(e),
        }
    }
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
            eprintln!("logger: {}", e);
            ExitCode::from(e.code() as u8)
        }
    }
}
