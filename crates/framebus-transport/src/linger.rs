use std::os::fd::RawFd;

use crate::error::{Result, TransportError};

/// Set `SO_LINGER` to `{on, 0}` so `close` drops queued data immediately.
pub(crate) fn set_zero_linger(fd: RawFd) -> Result<()> {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };

    // SAFETY: `linger` is a valid, initialized `libc::linger` that outlives the call,
    // and `fd` is an open socket descriptor owned by the caller.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            (&linger as *const libc::linger).cast::<libc::c_void>(),
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(TransportError::Io(std::io::Error::last_os_error()))
    }
}
