//! Clock access and absolute sleeps

use crate::config::ClockSource;
use crate::error::{OsalError, OsalResult};
use crate::port::ClockBackend;
use crate::time::Timer;

use super::{clock_id, to_timespec, unmapped, Posix};

impl ClockBackend for Posix {
    fn now(clock: ClockSource) -> Timer {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // Both clock ids always exist on Linux, so this cannot fail.
        unsafe { libc::clock_gettime(clock_id(clock), &mut ts) };
        Timer {
            sec: ts.tv_sec as u64,
            nsec: ts.tv_nsec as u64,
        }
    }

    fn sleep_until(clock: ClockSource, deadline: &Timer) -> OsalResult<()> {
        let ts = to_timespec(deadline);

        loop {
            // SAFETY: `ts` is a valid timespec; no remainder is requested.
            let rc = unsafe {
                libc::clock_nanosleep(
                    clock_id(clock),
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };

            match rc {
                0 => return Ok(()),
                libc::EINTR => continue,
                libc::EINVAL => return Err(OsalError::InvalidParam),
                e => return Err(unmapped("clock_nanosleep", e)),
            }
        }
    }
}
