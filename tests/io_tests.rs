//! Tests for the shared memory logging ring
//!
//! The process-wide sink is global state; tests touching it take the
//! `serial` lock.

use std::sync::MutexGuard;

use osal::io::ShmLog;
use osal::{OsalError, OsalResult, SharedMemory, Timer};

fn serial() -> MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn unique(tag: &str) -> String {
    format!("osal_io_{}_{}", tag, std::process::id())
}

/// Ring `name` created from scratch
fn fresh(tag: &str, max_messages: usize, max_message_size: usize) -> (String, ShmLog) {
    let name = unique(tag);
    let _ = SharedMemory::unlink(&name);
    let log = ShmLog::create(&name, max_messages, max_message_size).unwrap();
    (name, log)
}

fn next(log: &ShmLog) -> OsalResult<Vec<u8>> {
    let mut buf = vec![0u8; log.max_message_size()];
    let len = log.get_message(&mut buf, Some(&Timer::with_timeout(100_000_000)))?;
    buf.truncate(len);
    Ok(buf)
}

#[cfg(test)]
mod ring_tests {
    use super::*;
    use osal::task::{self, TaskAttr};
    use osal::types::ShmAttr;
    use std::sync::Arc;

    #[test]
    fn test_write_then_read() {
        let (name, log) = fresh("basic", 8, 64);
        assert!(!log.has_message());

        log.write(b"first").unwrap();
        log.write(b"second").unwrap();
        assert!(log.has_message());

        assert_eq!(next(&log).unwrap(), b"first");
        assert_eq!(next(&log).unwrap(), b"second");
        assert!(!log.has_message());

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_drops_oldest_when_full() {
        let (name, log) = fresh("drop", 4, 16);

        for i in 0..6 {
            log.write(format!("m{}", i).as_bytes()).unwrap();
        }

        // One slot stays free to tell full from empty
        assert_eq!(next(&log).unwrap(), b"m3");
        assert_eq!(next(&log).unwrap(), b"m4");
        assert_eq!(next(&log).unwrap(), b"m5");
        // Tokens of the dropped messages do not produce phantom reads
        assert_eq!(next(&log), Err(OsalError::Unavailable));

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_truncation() {
        let (name, log) = fresh("trunc", 4, 8);

        log.write(b"0123456789").unwrap();
        assert_eq!(next(&log).unwrap(), b"0123456");

        log.write(b"abcdef").unwrap();
        let mut small = [0u8; 3];
        assert_eq!(log.get_message(&mut small, None), Ok(3));
        assert_eq!(&small, b"abc");

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_timeout_unavailable() {
        let (name, log) = fresh("timeout", 4, 16);

        let start = Timer::now();
        let mut buf = [0u8; 16];
        assert_eq!(
            log.get_message(&mut buf, Some(&Timer::with_timeout(20_000_000))),
            Err(OsalError::Unavailable)
        );
        assert!(Timer::now().saturating_sub(&start) >= 20_000_000);

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_bad_geometry() {
        let name = unique("geometry");
        assert_eq!(ShmLog::create(&name, 1, 16).err(), Some(OsalError::InvalidParam));
        assert_eq!(ShmLog::create(&name, 4, 0).err(), Some(OsalError::InvalidParam));
        assert_eq!(ShmLog::create(&name, usize::MAX, 16).err(), Some(OsalError::InvalidParam));
    }

    #[test]
    fn test_existing_ring_keeps_geometry() {
        let (name, log) = fresh("adopt", 4, 16);
        log.write(b"kept").unwrap();

        let again = ShmLog::create(&name, 8, 32).unwrap();
        assert_eq!(again.max_messages(), 4);
        assert_eq!(again.max_message_size(), 16);
        assert_eq!(next(&again).unwrap(), b"kept");

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_attach() {
        let (name, writer) = fresh("attach", 16, 128);
        let reader = ShmLog::attach(&name).unwrap();
        assert_eq!(reader.max_messages(), 16);
        assert_eq!(reader.max_message_size(), 128);

        writer.write(b"across handles").unwrap();
        assert_eq!(next(&reader).unwrap(), b"across handles");

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_attach_rejects_non_rings() {
        let missing = unique("missing");
        let _ = SharedMemory::unlink(&missing);
        assert_eq!(ShmLog::attach(&missing).err(), Some(OsalError::NotFound));

        let plain = unique("plain");
        let _ = SharedMemory::unlink(&plain);
        let shm = SharedMemory::open(&plain, ShmAttr::create_rw(), 4096).unwrap();
        assert_eq!(ShmLog::attach(&plain).err(), Some(OsalError::InvalidParam));

        shm.close().unwrap();
        SharedMemory::unlink(&plain).unwrap();
    }

    #[test]
    fn test_reinitializes_plain_object() {
        let name = unique("reinit");
        let _ = SharedMemory::unlink(&name);
        let shm = SharedMemory::open(&name, ShmAttr::create_rw(), 16).unwrap();

        let log = ShmLog::create(&name, 4, 32).unwrap();
        assert_eq!(log.max_messages(), 4);
        log.write(b"fresh").unwrap();
        assert_eq!(next(&log).unwrap(), b"fresh");

        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_blocking_consumer() {
        let (name, log) = fresh("blocking", 32, 32);
        let log = Arc::new(log);

        let consumer = {
            let log = Arc::clone(&log);
            task::create(&TaskAttr::new("log_reader"), move || {
                let mut received = Vec::new();
                let mut buf = [0u8; 32];
                for _ in 0..20 {
                    let len = log.get_message(&mut buf, None).unwrap();
                    received.push(String::from_utf8_lossy(&buf[..len]).into_owned());
                }
                received
            })
            .unwrap()
        };

        for i in 0..20 {
            log.write(format!("line {}", i).as_bytes()).unwrap();
            osal::time::sleep(1_000_000).unwrap();
        }

        let received = consumer.join().unwrap().unwrap();
        assert_eq!(received, (0..20).map(|i| format!("line {}", i)).collect::<Vec<_>>());

        SharedMemory::unlink(&name).unwrap();
    }
}

#[cfg(test)]
mod corruption_tests {
    use super::*;
    use osal::ipc::shm::ShmMapping;
    use osal::types::{ShmAttr, ShmMapAttr};

    /// `max_message_size` follows the `u32` magic and the `u64` slot count
    const MAX_MESSAGE_SIZE_OFFSET: usize = 16;
    const WRITTEN: u32 = 777;
    const READ: u32 = 123;
    const WILD: u32 = 50_000_000;

    /// Second, independent mapping of the ring's backing object
    fn raw_view(name: &str) -> (SharedMemory, ShmMapping) {
        let attr = ShmAttr::new().with_rdwr(true).with_map(true);
        let shm = SharedMemory::open(name, attr, 0).unwrap();
        let map = shm
            .map(ShmMapAttr::PROT_READ | ShmMapAttr::PROT_WRITE | ShmMapAttr::SHARED)
            .unwrap();
        (shm, map)
    }

    fn load_u32(map: &ShmMapping, offset: usize) -> u32 {
        unsafe { map.as_ptr().add(offset).cast::<u32>().read_volatile() }
    }

    fn store_u32(map: &ShmMapping, offset: usize, value: u32) {
        unsafe { map.as_ptr().add(offset).cast::<u32>().write_volatile(value) }
    }

    fn store_u64(map: &ShmMapping, offset: usize, value: u64) {
        unsafe { map.as_ptr().add(offset).cast::<u64>().write_volatile(value) }
    }

    /// Ring of 1024 slots with `WRITTEN` messages written and `READ` taken,
    /// plus the header offsets of its read and write index
    fn indexed_ring(tag: &str) -> (String, ShmLog, usize, usize) {
        let (name, log) = fresh(tag, 1024, 8);
        for _ in 0..WRITTEN {
            log.write(b"m").unwrap();
        }
        for _ in 0..READ {
            assert_eq!(next(&log).unwrap(), b"m");
        }

        let (_shm, view) = raw_view(&name);
        let find = |value: u32| {
            (MAX_MESSAGE_SIZE_OFFSET + 8..256)
                .step_by(4)
                .find(|&off| load_u32(&view, off) == value)
                .unwrap()
        };
        let read_off = find(READ);
        let write_off = find(WRITTEN);
        assert_eq!(read_off + 4, write_off);

        (name, log, read_off, write_off)
    }

    #[test]
    fn test_zero_slot_size_not_adopted() {
        let (name, log) = fresh("zero_slot", 4, 16);
        drop(log);

        let (_shm, view) = raw_view(&name);
        store_u64(&view, MAX_MESSAGE_SIZE_OFFSET, 0);

        assert_eq!(ShmLog::attach(&name).err(), Some(OsalError::InvalidParam));

        let log = ShmLog::create(&name, 4, 16).unwrap();
        assert_eq!(log.max_message_size(), 16);
        log.write(b"hello").unwrap();
        assert_eq!(next(&log).unwrap(), b"hello");

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_wild_indices_not_adopted() {
        let (name, log, read_off, write_off) = indexed_ring("wild_open");
        drop(log);
        let (_shm, view) = raw_view(&name);

        store_u32(&view, write_off, WILD);
        assert_eq!(ShmLog::attach(&name).err(), Some(OsalError::InvalidParam));

        // Reinitialized with the requested geometry
        let log = ShmLog::create(&name, 4, 16).unwrap();
        assert_eq!(log.max_messages(), 4);
        assert_eq!(log.max_message_size(), 16);
        log.write(b"fresh").unwrap();
        assert_eq!(next(&log).unwrap(), b"fresh");
        drop(log);

        store_u32(&view, read_off, WILD);
        assert_eq!(ShmLog::attach(&name).err(), Some(OsalError::InvalidParam));

        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_wild_indices_while_attached() {
        let (name, log, read_off, write_off) = indexed_ring("wild_live");
        let (_shm, view) = raw_view(&name);

        store_u32(&view, write_off, WILD);
        log.write(b"after").unwrap();
        assert_eq!(load_u32(&view, read_off), 0);
        assert_eq!(load_u32(&view, write_off), 1);
        assert_eq!(next(&log).unwrap(), b"after");

        log.write(b"pending").unwrap();
        store_u32(&view, read_off, WILD);
        assert!(log.has_message());
        // The reset discards the pending message; surplus tokens are drained
        assert_eq!(next(&log), Err(OsalError::Unavailable));
        assert!(!log.has_message());

        log.write(b"again").unwrap();
        assert_eq!(next(&log).unwrap(), b"again");

        SharedMemory::unlink(&name).unwrap();
    }
}

#[cfg(test)]
mod sink_tests {
    use super::*;
    use osal::io::{self, shm_close, shm_get_message, shm_setup, shm_sink};
    use osal::osal_printf;

    #[test]
    fn test_printf_roundtrip() {
        let _serial = serial();
        let name = unique("shm_io");
        let _ = SharedMemory::unlink(&name);

        shm_setup(&name, 1024, 512).unwrap();
        assert!(shm_sink().is_some());

        osal_printf!("abcd\n").unwrap();
        let mut buf = [0u8; 512];
        let deadline = Timer::with_timeout(2_000_000_000);
        let len = shm_get_message(&mut buf, Some(&deadline)).unwrap();
        assert_eq!(&buf[..len], b"abcd\n");

        io::puts("line").unwrap();
        let len = shm_get_message(&mut buf, Some(&deadline)).unwrap();
        assert_eq!(&buf[..len], b"line\n");

        osal_printf!("{} + {} = {}", 2, 2, 4).unwrap();
        let len = shm_get_message(&mut buf, Some(&deadline)).unwrap();
        assert_eq!(&buf[..len], b"2 + 2 = 4");

        shm_close();
        assert!(shm_sink().is_none());
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_format_buffer_limit() {
        let _serial = serial();
        let name = unique("wide");
        let _ = SharedMemory::unlink(&name);

        shm_setup(&name, 4, 1024).unwrap();
        osal_printf!("{}", "x".repeat(1000)).unwrap();

        let mut buf = [0u8; 1024];
        let len = shm_get_message(&mut buf, Some(&Timer::with_timeout(1_000_000_000))).unwrap();
        assert_eq!(len, osal::config::IO_FORMAT_BUF_SIZE);
        assert!(buf[..len].iter().all(|&b| b == b'x'));

        shm_close();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_without_sink() {
        let _serial = serial();
        shm_close();

        let mut buf = [0u8; 16];
        assert_eq!(
            shm_get_message(&mut buf, Some(&Timer::with_timeout(1_000_000))),
            Err(OsalError::Unavailable)
        );
        // Falls back to standard output
        osal_printf!("osal stdout fallback\n").unwrap();
    }
}
