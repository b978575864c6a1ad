use std::fs::Metadata;
use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

// `sockaddr_un.sun_path`, including the trailing NUL.
#[cfg(target_os = "linux")]
const SUN_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_LEN: usize = 104;

/// Identity of the socket file a listener created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketFile {
    dev: u64,
    ino: u64,
}

impl SocketFile {
    fn of(metadata: &Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    fn still_at(self, path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|m| m.file_type().is_socket() && Self::of(&m) == self)
            .unwrap_or(false)
    }
}

/// Listener for `ipc://` endpoints.
///
/// Dropping it unlinks the socket file, unless something else has been put
/// at that path in the meantime.
#[derive(Debug)]
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    file: SocketFile,
}

impl UnixDomainSocket {
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind at `path` with permission bits `mode`.
    ///
    /// A leftover socket at `path` is replaced. Any other kind of file makes
    /// the bind fail and is left alone.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;
        clear_stale(&path)?;

        let fail = |source| TransportError::Bind {
            endpoint: format!("ipc://{}", path.display()),
            source,
        };
        let listener = UnixListener::bind(&path).map_err(fail)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(fail)?;
        let file = SocketFile::of(&std::fs::symlink_metadata(&path).map_err(fail)?);

        info!(path = %path.display(), mode, "bound unix socket");
        Ok(Self {
            listener,
            path,
            file,
        })
    }

    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = %self.path.display(), "accepted unix connection");
        Ok(IpcStream::from_unix(stream))
    }

    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        check_path_len(path)?;
        match UnixStream::connect(path) {
            Ok(stream) => {
                debug!(path = %path.display(), "connected unix socket");
                Ok(IpcStream::from_unix(stream))
            }
            Err(source) => Err(TransportError::Connect {
                endpoint: format!("ipc://{}", path.display()),
                source,
            }),
        }
    }

    #[cfg(feature = "async")]
    pub(crate) fn try_clone_listener(&self) -> Result<UnixListener> {
        Ok(self.listener.try_clone()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        if self.file.still_at(&self.path) {
            debug!(path = %self.path.display(), "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = %self.path.display(), "socket file replaced, leaving it");
        }
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len < SUN_PATH_LEN {
        return Ok(());
    }
    Err(TransportError::PathTooLong {
        path: path.to_path_buf(),
        len,
        max: SUN_PATH_LEN,
    })
}

fn clear_stale(path: &Path) -> Result<()> {
    let fail = |source| TransportError::Bind {
        endpoint: format!("ipc://{}", path.display()),
        source,
    };
    match std::fs::symlink_metadata(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(fail(err)),
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(path = %path.display(), "replacing stale socket file");
            std::fs::remove_file(path).map_err(fail)
        }
        Ok(_) => Err(fail(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        ))),
    }
}
