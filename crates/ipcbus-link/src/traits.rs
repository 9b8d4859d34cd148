use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::error::{LinkError, Result};

const READ_CHUNK_SIZE: usize = 256;

/// Pause between retries while the transmit side is full.
const WRITE_BACKOFF: Duration = Duration::from_micros(100);

/// A byte-oriented duplex channel to the peer processor.
///
/// The link has no framing and no buffering guarantees: bytes written may
/// be lost or corrupted, and `read_byte` only reports what has already
/// arrived. Timeouts are the caller's concern.
pub trait Link {
    /// Write the whole buffer to the link (blocking until accepted).
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Poll for one received byte.
    ///
    /// Returns `Ok(None)` when nothing is available right now.
    fn read_byte(&mut self) -> Result<Option<u8>>;
}

impl<L: Link + ?Sized> Link for &mut L {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }
}

/// [`Link`] over any non-blocking `Read + Write` stream.
///
/// `WouldBlock` and `TimedOut` on read mean "no byte yet"; a zero-length
/// read means the far end is gone and is reported as [`LinkError::Closed`].
pub struct StreamLink<T> {
    inner: T,
    rx: BytesMut,
}

impl<T: Read + Write> StreamLink<T> {
    /// Wrap a stream that has already been put in non-blocking mode.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            rx: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the link and return the inner stream.
    ///
    /// Bytes already pulled from the stream but not yet handed out by
    /// [`Link::read_byte`] are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => {
                    self.rx.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(false)
                }
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }
}

impl<T: Read + Write> Link for StreamLink<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(WRITE_BACKOFF),
                Err(err) => return Err(LinkError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(WRITE_BACKOFF),
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        if self.rx.is_empty() && !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.rx.get_u8()))
    }
}

impl<T> std::fmt::Debug for StreamLink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLink")
            .field("buffered", &self.rx.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Duplex stream: reads come from a script, writes are captured.
    struct ScriptedStream {
        reads: Vec<std::io::Result<Vec<u8>>>,
        written: Vec<u8>,
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.reads.is_empty() {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            match self.reads.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(err) => Err(err),
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            // Accept at most two bytes per call to exercise the partial-write loop.
            let n = buf.len().min(2);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn read_byte_reports_empty_on_would_block() {
        let mut link = StreamLink::new(ScriptedStream {
            reads: Vec::new(),
            written: Vec::new(),
        });
        assert!(link.read_byte().unwrap().is_none());
    }

    #[test]
    fn read_byte_drains_buffered_chunk() {
        let mut link = StreamLink::new(ScriptedStream {
            reads: vec![Ok(vec![1, 2, 3])],
            written: Vec::new(),
        });

        assert_eq!(link.read_byte().unwrap(), Some(1));
        assert_eq!(link.read_byte().unwrap(), Some(2));
        assert_eq!(link.read_byte().unwrap(), Some(3));
        assert_eq!(link.read_byte().unwrap(), None);
    }

    #[test]
    fn interrupted_read_retries() {
        let mut link = StreamLink::new(ScriptedStream {
            reads: vec![
                Err(std::io::Error::from(ErrorKind::Interrupted)),
                Ok(vec![0x7E]),
            ],
            written: Vec::new(),
        });
        assert_eq!(link.read_byte().unwrap(), Some(0x7E));
    }

    #[test]
    fn zero_length_read_is_closed() {
        let mut link = StreamLink::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(link.read_byte(), Err(LinkError::Closed)));
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut link = StreamLink::new(ScriptedStream {
            reads: Vec::new(),
            written: Vec::new(),
        });
        link.write_all(&[0x7E, 1, 2, 3, 4, 0x7E]).unwrap();
        assert_eq!(link.get_ref().written, vec![0x7E, 1, 2, 3, 4, 0x7E]);
    }

    /// Stream whose transmit side is full for the first few attempts.
    struct Congested {
        stalls: usize,
        written: Vec<u8>,
    }

    impl Read for Congested {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }

    impl Write for Congested {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.stalls > 0 {
                self.stalls -= 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn full_transmit_buffer_backs_off_between_retries() {
        let mut link = StreamLink::new(Congested {
            stalls: 5,
            written: Vec::new(),
        });
        let start = std::time::Instant::now();
        link.write_all(&[0x7E, 0x01, 0x7E]).unwrap();

        assert!(start.elapsed() >= WRITE_BACKOFF * 5);
        assert_eq!(link.get_ref().stalls, 0);
        assert_eq!(link.get_ref().written, [0x7E, 0x01, 0x7E]);
    }

    #[test]
    fn mutable_reference_is_a_link() {
        fn poll<L: Link>(mut link: L) -> Option<u8> {
            link.read_byte().unwrap()
        }

        let mut link = StreamLink::new(ScriptedStream {
            reads: vec![Ok(vec![9])],
            written: Vec::new(),
        });
        assert_eq!(poll(&mut link), Some(9));
    }

    #[test]
    #[cfg(unix)]
    fn unix_pair_roundtrip() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        right.set_nonblocking(true).unwrap();
        let mut tx = StreamLink::new(left);
        let mut rx = StreamLink::new(right);

        assert!(rx.read_byte().unwrap().is_none());
        tx.write_all(b"ab").unwrap();

        let mut got = Vec::new();
        while got.len() < 2 {
            if let Some(byte) = rx.read_byte().unwrap() {
                got.push(byte);
            }
        }
        assert_eq!(got, b"ab");
    }
}
