//! Byte links under the transport.
//!
//! The transport works on a raw byte stream; frame boundaries are recovered
//! by the scanner, so any stream works.
//!
//! # Implementations
//!
//! - [`LoopbackLink`]: in-memory pair for tests and the simulated mcu
//! - [`FileLink`]: a tty (or any file) opened by path, in non-blocking mode

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::termios::{FlushArg, tcflush};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Non-blocking byte stream.
pub trait SerialLink: Send {
    /// Read what is available; `Ok(0)` when nothing is.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Discard output that has not been transmitted yet.
    fn flush_output(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn flush_output(&mut self) -> io::Result<()> {
        (**self).flush_output()
    }
}

// ─── LoopbackLink ───────────────────────────────────────────────────

type Pipe = Arc<Mutex<VecDeque<u8>>>;

/// One end of an in-memory byte pipe pair.
#[derive(Debug, Clone)]
pub struct LoopbackLink {
    rx: Pipe,
    tx: Pipe,
}

impl LoopbackLink {
    /// Two connected ends: bytes written on one are read on the other.
    pub fn pair() -> (Self, Self) {
        let a: Pipe = Arc::default();
        let b: Pipe = Arc::default();
        (
            Self {
                rx: a.clone(),
                tx: b.clone(),
            },
            Self { rx: b, tx: a },
        )
    }

    /// Bytes waiting to be read on this end.
    pub fn available(&self) -> usize {
        self.rx.lock().len()
    }
}

impl SerialLink for LoopbackLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock();
        let n = buf.len().min(rx.len());
        for (dst, src) in buf.iter_mut().zip(rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.tx.lock().extend(data);
        Ok(())
    }

    fn flush_output(&mut self) -> io::Result<()> {
        // Written bytes are delivered immediately; nothing is pending.
        Ok(())
    }
}

// ─── FileLink ───────────────────────────────────────────────────────

/// Serial device (or any file) in non-blocking mode.
///
/// Line settings such as the baud rate are left as configured on the
/// device.
#[derive(Debug)]
pub struct FileLink {
    file: File,
    path: PathBuf,
}

impl FileLink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let flags = OFlag::from_bits_truncate(fcntl(&file, FcntlArg::F_GETFL)?);
        fcntl(&file, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
        info!(path = %path.display(), "serial link opened");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SerialLink for FileLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            other => other,
        }
    }

    fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            match self.file.write(data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_micros(100));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn flush_output(&mut self) -> io::Result<()> {
        if let Err(e) = tcflush(&self.file, FlushArg::TCOFLUSH) {
            // Not a tty.
            debug!(path = %self.path.display(), %e, "tcflush skipped");
        }
        Ok(())
    }
}
