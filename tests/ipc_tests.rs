//! Tests for message queues and shared memory
//!
//! Objects are named after the test and the process id so concurrent runs
//! do not collide. Every test holds the `serial` lock: the descriptor limit
//! test lowers a process-wide resource limit.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, Once};

use osal::{OsalError, Timer};

fn serial() -> MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn unique(tag: &str) -> String {
    format!("/osal_{}_{}", tag, std::process::id())
}

/// Install a SIGUSR1 handler that interrupts blocking calls
fn install_sigusr1() {
    static ONCE: Once = Once::new();

    extern "C" fn on_signal(_: libc::c_int) {}

    ONCE.call_once(|| unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = on_signal as usize;
        sa.sa_flags = 0; // no SA_RESTART
        libc::sigemptyset(&mut sa.sa_mask);
        assert_eq!(libc::sigaction(libc::SIGUSR1, &sa, std::ptr::null_mut()), 0);
    });
}

/// Keep signalling `thread` until `done` is set
fn pester(thread: &AtomicU64, done: &AtomicBool) {
    while thread.load(Ordering::Acquire) == 0 {
        osal::time::sleep(1_000_000).unwrap();
    }
    while !done.load(Ordering::Acquire) {
        unsafe { libc::pthread_kill(thread.load(Ordering::Acquire) as libc::pthread_t, libc::SIGUSR1) };
        osal::time::sleep(50_000_000).unwrap();
    }
}

#[cfg(test)]
mod mq_tests {
    use super::*;
    use osal::task::{self, TaskAttr};
    use osal::types::{MqAttr, MqFlags};
    use osal::MessageQueue;

    const MSG_SIZE: usize = std::mem::size_of::<u64>();

    fn fresh(tag: &str, attr: &MqAttr) -> (String, MessageQueue) {
        let name = unique(tag);
        let _ = MessageQueue::unlink(&name);
        let mq = MessageQueue::open(&name, attr).unwrap();
        (name, mq)
    }

    #[test]
    fn test_timed_send_delayed_consumer() {
        const MESSAGES: u64 = 100;
        const TIMEOUT_NS: u64 = 10_000_000;
        let _serial = serial();

        let (name, mq) = fresh("timed", &MqAttr::new(10, MSG_SIZE).with_mode(0o600));
        let mq = Arc::new(mq);

        let producer = {
            let mq = Arc::clone(&mq);
            task::create(&TaskAttr::new("mq_producer"), move || {
                let mut timeouts = 0u32;
                for i in 0..MESSAGES {
                    let deadline = Timer::with_timeout(TIMEOUT_NS);
                    loop {
                        match mq.timedsend(&i.to_ne_bytes(), 0, &deadline) {
                            Ok(()) => break,
                            Err(OsalError::Timeout) => timeouts += 1,
                            Err(e) => panic!("timedsend: {}", e),
                        }
                    }
                }
                timeouts
            })
            .unwrap()
        };

        osal::time::sleep(1_000_000_000).unwrap();

        let consumer = {
            let mq = Arc::clone(&mq);
            task::create(&TaskAttr::new("mq_consumer"), move || {
                let mut timeouts = 0u32;
                let mut received = Vec::new();
                let mut buf = [0u8; MSG_SIZE];
                for _ in 0..MESSAGES {
                    let deadline = Timer::with_timeout(TIMEOUT_NS);
                    loop {
                        match mq.timedreceive(&mut buf, &deadline) {
                            Ok((len, _)) => {
                                assert_eq!(len, MSG_SIZE);
                                received.push(u64::from_ne_bytes(buf));
                                break;
                            }
                            Err(OsalError::Timeout) => timeouts += 1,
                            Err(e) => panic!("timedreceive: {}", e),
                        }
                    }
                }
                (timeouts, received)
            })
            .unwrap()
        };

        let send_timeouts = producer.join().unwrap().unwrap();
        let (recv_timeouts, received) = consumer.join().unwrap().unwrap();

        assert!(send_timeouts >= 100, "send timeouts {}", send_timeouts);
        assert_eq!(recv_timeouts, 0);
        assert_eq!(received, (0..MESSAGES).collect::<Vec<_>>());

        Arc::try_unwrap(mq).unwrap().close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_priority_order() {
        let _serial = serial();
        let (name, mq) = fresh("prio", &MqAttr::new(4, 16));

        mq.send(b"low", 1).unwrap();
        mq.send(b"high", 5).unwrap();
        mq.send(b"high2", 5).unwrap();
        assert_eq!(mq.attr().unwrap().current_messages, 3);

        let mut buf = [0u8; 16];
        let mut next = || {
            let (len, prio) = mq.receive(&mut buf).unwrap();
            (buf[..len].to_vec(), prio)
        };
        assert_eq!(next(), (b"high".to_vec(), 5));
        assert_eq!(next(), (b"high2".to_vec(), 5));
        assert_eq!(next(), (b"low".to_vec(), 1));

        mq.close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_geometry_reported() {
        let _serial = serial();
        let (name, mq) = fresh("geometry", &MqAttr::new(5, 12));

        let status = mq.attr().unwrap();
        assert_eq!(status.max_messages, 5);
        assert_eq!(status.max_message_size, 12);
        assert_eq!(status.current_messages, 0);
        assert_eq!(mq.max_message_size(), 12);
        assert_eq!(mq.name(), name);

        // Reopening keeps the original geometry
        let again = MessageQueue::open(&name, &MqAttr::new(2, 4)).unwrap();
        assert_eq!(again.max_message_size(), 12);

        again.close().unwrap();
        mq.close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_oversize_message() {
        let _serial = serial();
        let (name, mq) = fresh("oversize", &MqAttr::new(2, MSG_SIZE));

        assert_eq!(mq.send(&[0u8; MSG_SIZE + 1], 0), Err(OsalError::InvalidParam));
        assert_eq!(
            mq.timedsend(&[0u8; MSG_SIZE + 1], 0, &Timer::with_timeout(1_000_000)),
            Err(OsalError::InvalidParam)
        );
        mq.send(&[0u8; MSG_SIZE], 0).unwrap();

        let mut small = [0u8; MSG_SIZE - 1];
        assert_eq!(mq.receive(&mut small), Err(OsalError::InvalidParam));

        mq.close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_nonblocking_busy() {
        let _serial = serial();
        let attr = MqAttr::new(1, MSG_SIZE).with_flags(MqFlags::RDWR | MqFlags::CREAT | MqFlags::NONBLOCK);
        let (name, mq) = fresh("nonblock", &attr);

        let mut buf = [0u8; MSG_SIZE];
        assert_eq!(mq.receive(&mut buf), Err(OsalError::Busy));
        mq.send(&7u64.to_ne_bytes(), 0).unwrap();
        assert_eq!(mq.send(&8u64.to_ne_bytes(), 0), Err(OsalError::Busy));
        assert_eq!(mq.receive(&mut buf).unwrap(), (MSG_SIZE, 0));
        assert_eq!(u64::from_ne_bytes(buf), 7);

        mq.close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_timeouts() {
        let _serial = serial();
        let (name, mq) = fresh("timeout", &MqAttr::new(1, MSG_SIZE));

        let mut buf = [0u8; MSG_SIZE];
        let start = Timer::now();
        assert_eq!(
            mq.timedreceive(&mut buf, &Timer::with_timeout(20_000_000)),
            Err(OsalError::Timeout)
        );
        assert!(Timer::now().saturating_sub(&start) >= 20_000_000);

        mq.send(&[1u8; MSG_SIZE], 0).unwrap();
        assert_eq!(
            mq.timedsend(&[2u8; MSG_SIZE], 0, &Timer::with_timeout(20_000_000)),
            Err(OsalError::Timeout)
        );

        mq.close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_bad_names() {
        let _serial = serial();
        let attr = MqAttr::new(1, MSG_SIZE);

        for name in ["noslash", "/", "/a/b", "/nul\0byte"] {
            assert_eq!(MessageQueue::open(name, &attr).err(), Some(OsalError::InvalidParam), "{:?}", name);
        }
        let long = format!("/{}", "q".repeat(osal::config::MQ_NAME_MAX + 1));
        assert_eq!(MessageQueue::open(&long, &attr).err(), Some(OsalError::InvalidParam));
        assert_eq!(MessageQueue::unlink("noslash"), Err(OsalError::InvalidParam));
    }

    #[test]
    fn test_missing_queue() {
        let _serial = serial();
        let name = unique("missing");
        let _ = MessageQueue::unlink(&name);

        let attr = MqAttr::new(1, MSG_SIZE).with_flags(MqFlags::RDWR);
        assert_eq!(MessageQueue::open(&name, &attr).err(), Some(OsalError::NotFound));
        assert_eq!(MessageQueue::unlink(&name), Err(OsalError::NotFound));
    }

    #[test]
    fn test_exclusive_create() {
        let _serial = serial();
        let (name, mq) = fresh("excl", &MqAttr::new(1, MSG_SIZE));

        let attr = MqAttr::new(1, MSG_SIZE).with_flags(MqFlags::RDWR | MqFlags::CREAT | MqFlags::EXCL);
        assert_eq!(MessageQueue::open(&name, &attr).err(), Some(OsalError::PermissionDenied));

        mq.close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_receive_interrupted() {
        let _serial = serial();
        install_sigusr1();
        let (name, mq) = fresh("recv_intr", &MqAttr::new(1, MSG_SIZE));
        let mq = Arc::new(mq);
        let thread = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicBool::new(false));

        let waiter = {
            let (mq, thread, done) = (Arc::clone(&mq), Arc::clone(&thread), Arc::clone(&done));
            task::create(&TaskAttr::new("mq_recv"), move || {
                thread.store(unsafe { libc::pthread_self() } as u64, Ordering::Release);
                let mut buf = [0u8; MSG_SIZE];
                let result = mq.receive(&mut buf);
                done.store(true, Ordering::Release);
                result
            })
            .unwrap()
        };

        pester(&thread, &done);
        assert_eq!(waiter.join().unwrap(), Some(Err(OsalError::Interrupted)));

        Arc::try_unwrap(mq).unwrap().close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_send_interrupted() {
        let _serial = serial();
        install_sigusr1();
        let (name, mq) = fresh("send_intr", &MqAttr::new(1, MSG_SIZE));
        mq.send(&[0u8; MSG_SIZE], 0).unwrap();
        let mq = Arc::new(mq);
        let thread = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicBool::new(false));

        let waiter = {
            let (mq, thread, done) = (Arc::clone(&mq), Arc::clone(&thread), Arc::clone(&done));
            task::create(&TaskAttr::new("mq_send"), move || {
                thread.store(unsafe { libc::pthread_self() } as u64, Ordering::Release);
                let result = mq.send(&[1u8; MSG_SIZE], 0);
                done.store(true, Ordering::Release);
                result
            })
            .unwrap()
        };

        pester(&thread, &done);
        assert_eq!(waiter.join().unwrap(), Some(Err(OsalError::Interrupted)));

        Arc::try_unwrap(mq).unwrap().close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn test_timedsend_absorbs_signals() {
        let _serial = serial();
        install_sigusr1();
        let (name, mq) = fresh("timed_intr", &MqAttr::new(1, MSG_SIZE));
        mq.send(&[0u8; MSG_SIZE], 0).unwrap();
        let mq = Arc::new(mq);
        let thread = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicBool::new(false));

        let waiter = {
            let (mq, thread, done) = (Arc::clone(&mq), Arc::clone(&thread), Arc::clone(&done));
            task::create(&TaskAttr::new("mq_timed"), move || {
                thread.store(unsafe { libc::pthread_self() } as u64, Ordering::Release);
                let sent = mq.timedsend(&[1u8; MSG_SIZE], 0, &Timer::with_timeout(300_000_000));
                let mut buf = [0u8; MSG_SIZE];
                mq.receive(&mut buf).unwrap();
                let received = mq.timedreceive(&mut buf, &Timer::with_timeout(300_000_000));
                done.store(true, Ordering::Release);
                (sent, received.map(|_| ()))
            })
            .unwrap()
        };

        pester(&thread, &done);
        assert_eq!(
            waiter.join().unwrap(),
            Some((Err(OsalError::Timeout), Err(OsalError::Timeout)))
        );

        Arc::try_unwrap(mq).unwrap().close().unwrap();
        MessageQueue::unlink(&name).unwrap();
    }
}

#[cfg(test)]
mod shm_tests {
    use super::*;
    use osal::types::{ShmAttr, ShmMapAttr};
    use osal::SharedMemory;

    const RW_SHARED: ShmMapAttr = ShmMapAttr::PROT_READ
        .union(ShmMapAttr::PROT_WRITE)
        .union(ShmMapAttr::SHARED);

    fn fresh(tag: &str, size: usize) -> (String, SharedMemory) {
        let name = unique(tag);
        let _ = SharedMemory::unlink(&name);
        let shm = SharedMemory::open(&name, ShmAttr::create_rw(), size).unwrap();
        (name, shm)
    }

    #[test]
    fn test_bad_names() {
        let _serial = serial();
        let attr = ShmAttr::create_rw();

        assert_eq!(SharedMemory::open("", attr, 64).err(), Some(OsalError::InvalidParam));
        assert_eq!(SharedMemory::open("/", attr, 64).err(), Some(OsalError::InvalidParam));
        assert_eq!(SharedMemory::open("a/b", attr, 64).err(), Some(OsalError::InvalidParam));

        let long = "s".repeat(osal::config::SHM_NAME_MAX + 1);
        assert_eq!(SharedMemory::open(&long, attr, 64).err(), Some(OsalError::InvalidParam));
    }

    #[test]
    fn test_leading_slash_optional() {
        let _serial = serial();
        let (name, shm) = fresh("slash", 64);
        assert_eq!(shm.name(), name);

        let bare = SharedMemory::open(&name[1..], ShmAttr::new().with_rdwr(true), 0).unwrap();
        assert_eq!(bare.name(), name);
        assert_eq!(bare.size(), 64);

        bare.close().unwrap();
        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_size_roundtrip() {
        let _serial = serial();
        let (name, shm) = fresh("size", 4096);
        assert_eq!(shm.size(), 4096);
        assert!(shm.fd() >= 0);

        let reopened = SharedMemory::open(&name, ShmAttr::create_rw(), 0).unwrap();
        assert_eq!(reopened.size(), 4096);

        // An existing larger object keeps its size
        let smaller = SharedMemory::open(&name, ShmAttr::create_rw(), 100).unwrap();
        assert_eq!(smaller.size(), 4096);

        let truncated = SharedMemory::open(&name, ShmAttr::create_rw().with_trunc(true), 8192).unwrap();
        assert_eq!(truncated.size(), 8192);

        for h in [shm, reopened, smaller, truncated] {
            h.close().unwrap();
        }
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_shared_mappings() {
        let _serial = serial();
        let (name, shm) = fresh("shared", 4096);
        let other = SharedMemory::open(&name, ShmAttr::new().with_rdwr(true), 0).unwrap();

        let mut writer = shm.map(RW_SHARED).unwrap();
        let reader = other.map(ShmMapAttr::PROT_READ | ShmMapAttr::SHARED).unwrap();
        assert_eq!(writer.len(), 4096);
        assert!(!reader.is_empty());

        unsafe { writer.as_mut_slice()[..5].copy_from_slice(b"hello") };
        assert_eq!(unsafe { &reader.as_slice()[..5] }, b"hello");

        // Mappings outlive the descriptors
        shm.close().unwrap();
        other.close().unwrap();
        unsafe { writer.as_mut_slice()[4095] = 0xA5 };
        assert_eq!(unsafe { reader.as_slice()[4095] }, 0xA5);

        writer.unmap().unwrap();
        drop(reader);
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_private_mapping() {
        let _serial = serial();
        let (name, shm) = fresh("private", 4096);

        let shared = shm.map(RW_SHARED).unwrap();
        let mut private = shm
            .map(ShmMapAttr::PROT_READ | ShmMapAttr::PROT_WRITE | ShmMapAttr::PRIVATE)
            .unwrap();

        unsafe { private.as_mut_slice()[0] = 1 };
        assert_eq!(unsafe { shared.as_slice()[0] }, 0);

        drop(private);
        drop(shared);
        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_map_needs_sharing_mode() {
        let _serial = serial();
        let (name, shm) = fresh("sharing", 4096);

        assert_eq!(shm.map(ShmMapAttr::PROT_READ).err(), Some(OsalError::InvalidParam));
        assert_eq!(
            shm.map(ShmMapAttr::PROT_READ | ShmMapAttr::SHARED | ShmMapAttr::PRIVATE).err(),
            Some(OsalError::InvalidParam)
        );

        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_map_empty_object() {
        let _serial = serial();
        let (name, shm) = fresh("empty", 0);
        assert_eq!(shm.size(), 0);
        assert_eq!(shm.map(RW_SHARED).err(), Some(OsalError::InvalidParam));

        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_write_to_readonly_object() {
        let _serial = serial();
        let (name, shm) = fresh("rdonly", 4096);

        let ro = SharedMemory::open(&name, ShmAttr::new().with_rdonly(true), 0).unwrap();
        assert_eq!(ro.map(RW_SHARED).err(), Some(OsalError::PermissionDenied));
        assert!(ro.map(ShmMapAttr::PROT_READ | ShmMapAttr::SHARED).is_ok());

        ro.close().unwrap();
        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_exclusive_create() {
        let _serial = serial();
        let (name, shm) = fresh("excl", 64);

        let attr = ShmAttr::create_rw().with_excl(true);
        assert_eq!(SharedMemory::open(&name, attr, 64).err(), Some(OsalError::PermissionDenied));

        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }

    #[test]
    fn test_unlink() {
        let _serial = serial();
        let (name, shm) = fresh("unlink", 64);
        shm.close().unwrap();

        SharedMemory::unlink(&name).unwrap();
        assert_eq!(SharedMemory::unlink(&name), Err(OsalError::NotFound));
        assert_eq!(
            SharedMemory::open(&name, ShmAttr::new().with_rdwr(true), 0).err(),
            Some(OsalError::NotFound)
        );
    }

    #[test]
    fn test_failed_sizing_removes_object() {
        let _serial = serial();
        let name = unique("oversize");
        let _ = SharedMemory::unlink(&name);

        assert_eq!(
            SharedMemory::open(&name, ShmAttr::create_rw(), usize::MAX).err(),
            Some(OsalError::InvalidParam)
        );
        assert_eq!(
            SharedMemory::open(&name, ShmAttr::new().with_rdwr(true), 0).err(),
            Some(OsalError::NotFound)
        );

        let excl = ShmAttr::create_rw().with_excl(true);
        assert_eq!(
            SharedMemory::open(&name, excl, usize::MAX).err(),
            Some(OsalError::InvalidParam)
        );
        assert_eq!(SharedMemory::unlink(&name), Err(OsalError::NotFound));

        // The name is free for a regular create afterwards
        let shm = SharedMemory::open(&name, ShmAttr::create_rw(), 64).unwrap();
        assert_eq!(shm.size(), 64);
        shm.close().unwrap();
        SharedMemory::unlink(&name).unwrap();
    }
}

#[cfg(test)]
mod limit_tests {
    use super::*;
    use osal::types::{MqAttr, ShmAttr};
    use osal::{MessageQueue, SharedMemory};

    /// Run `f` with no descriptors left to open
    fn with_no_descriptors<T>(f: impl FnOnce() -> T) -> T {
        let mut saved: libc::rlimit = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut saved) }, 0);

        let lowered = libc::rlimit { rlim_cur: 0, rlim_max: saved.rlim_max };
        assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lowered) }, 0);
        let result = f();
        assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &saved) }, 0);
        result
    }

    #[test]
    fn test_descriptor_limit() {
        let _serial = serial();
        let shm_name = unique("limit_shm");
        let mq_name = unique("limit_mq");

        let (shm, mq) = with_no_descriptors(|| {
            (
                SharedMemory::open(&shm_name, ShmAttr::create_rw(), 64).err(),
                MessageQueue::open(&mq_name, &MqAttr::new(1, 8)).err(),
            )
        });

        assert_eq!(shm, Some(OsalError::SystemLimitReached));
        assert_eq!(mq, Some(OsalError::SystemLimitReached));

        let _ = SharedMemory::unlink(&shm_name);
        let _ = MessageQueue::unlink(&mq_name);
    }
}
