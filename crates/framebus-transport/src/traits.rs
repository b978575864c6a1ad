use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// Connected blocking byte stream, TCP or Unix domain socket.
pub struct IpcStream {
    inner: Inner,
}

enum Inner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

// Both std stream types share the method names used here.
macro_rules! each {
    ($inner:expr, $stream:ident => $body:expr) => {
        match $inner {
            Inner::Tcp($stream) => $body,
            #[cfg(unix)]
            Inner::Unix($stream) => $body,
        }
    };
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        each!(&mut self.inner, s => s.read(buf))
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        each!(&mut self.inner, s => s.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        each!(&mut self.inner, s => s.flush())
    }
}

impl IpcStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            inner: Inner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: Inner::Unix(stream),
        }
    }

    /// `None` blocks forever. An expired timeout surfaces as `WouldBlock`
    /// or `TimedOut` from `read`.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(each!(&self.inner, s => s.set_read_timeout(timeout))?)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(each!(&self.inner, s => s.set_write_timeout(timeout))?)
    }

    /// A second handle on the same connection, for a dedicated reader.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            Inner::Tcp(s) => Inner::Tcp(s.try_clone()?),
            #[cfg(unix)]
            Inner::Unix(s) => Inner::Unix(s.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Close both directions. A clone blocked in `read` sees EOF.
    pub fn shutdown(&self) -> Result<()> {
        match each!(&self.inner, s => s.shutdown(Shutdown::Both)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Drop unsent bytes on close instead of lingering. No-op for Unix
    /// domain sockets.
    pub fn set_zero_linger(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            Inner::Tcp(s) => {
                use std::os::fd::AsRawFd;
                crate::linger::set_zero_linger(s.as_raw_fd())
            }
            #[cfg(not(unix))]
            Inner::Tcp(_) => Ok(()),
            #[cfg(unix)]
            Inner::Unix(_) => Ok(()),
        }
    }

    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            Inner::Tcp(_) => "tcp",
            #[cfg(unix)]
            Inner::Unix(_) => "ipc",
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IpcStream")
            .field(&self.transport_name())
            .finish()
    }
}
