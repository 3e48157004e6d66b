//! Positional-write sinks shared by concurrent download parts.

use std::io;
use std::sync::Mutex;

/// A sink that supports positional writes from multiple concurrent callers.
///
/// Multi-part downloads may complete out of order; each part routes its
/// bytes to the correct offset instead of appending.
pub trait WriteAt: Send + Sync {
    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()>;
}

/// Growable in-memory sink backing a single artifact download.
#[derive(Debug, Default)]
pub struct VecSink {
    buf: Mutex<Vec<u8>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_inner().unwrap()
    }
}

impl WriteAt for VecSink {
    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let offset = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds usize"))?;
        let mut buf = self.buf.lock().unwrap();
        let end = offset + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset..end].copy_from_slice(data);
        Ok(())
    }
}
