//! Unix domain sockets as a stand-in for a UART.
//!
//! A simulated target binds a socket path and the master connects to it; both
//! ends then see a plain byte link with the same loss-free but unframed
//! semantics as a serial port.

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::traits::StreamLink;

/// A link carried over a connected Unix domain socket.
pub type UnixLink = StreamLink<UnixStream>;

/// Listening side of a Unix domain socket link.
///
/// The socket file is removed on drop, unless the path has been replaced by
/// something else in the meantime.
pub struct UnixLinkListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl UnixLinkListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `path`.
    ///
    /// A stale socket file at `path` is removed first; any other kind of file
    /// is left alone and reported as a bind error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(LinkError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |path: &Path, source: std::io::Error| LinkError::Bind {
            path: path.to_path_buf(),
            source,
        };

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "listening for link connections");

        Ok(Self {
            listener,
            path,
            created_inode: (created.dev(), created.ino()),
        })
    }

    /// Accept one connection (blocking) and return it as a non-blocking link.
    pub fn accept(&self) -> Result<UnixLink> {
        let (stream, _addr) = self.listener.accept().map_err(LinkError::Accept)?;
        stream.set_nonblocking(true)?;
        debug!("accepted link connection");
        Ok(StreamLink::new(stream))
    }

    /// Accept one pending connection, or return `None` if none is waiting.
    ///
    /// Only returns `None` after [`set_nonblocking`](Self::set_nonblocking)
    /// has been enabled; otherwise this blocks like [`accept`](Self::accept).
    pub fn try_accept(&self) -> Result<Option<UnixLink>> {
        match self.accept() {
            Ok(link) => Ok(Some(link)),
            Err(LinkError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Switch the listening socket between blocking and polled accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixLinkListener {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

/// Connect to a listening socket and return a non-blocking link.
pub fn connect_unix(path: impl AsRef<Path>) -> Result<UnixLink> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|source| LinkError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    stream.set_nonblocking(true)?;
    debug!(?path, "connected link over unix domain socket");
    Ok(StreamLink::new(stream))
}
