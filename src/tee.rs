use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::util::lock_unpoisoned;

/// Shared sink that receives a copy of every decoded response byte.
///
/// Handles returned by `clone` write into the same buffer; [`TeeBuffer::detach`]
/// makes an independent copy.
#[derive(Clone, Debug, Default)]
pub struct TeeBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl TeeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&lock_unpoisoned(&self.inner))
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock_unpoisoned(&self.inner).clear();
    }

    /// Returns a new buffer seeded with the current contents.
    pub fn detach(&self) -> Self {
        Self {
            inner: Arc::new(Mutex::new(lock_unpoisoned(&self.inner).clone())),
        }
    }

    pub(crate) fn append(&self, bytes: &[u8]) {
        lock_unpoisoned(&self.inner).extend_from_slice(bytes);
    }
}

/// Reader adapter that copies everything it yields into a [`TeeBuffer`].
pub(crate) struct TeeReader<R> {
    inner: R,
    sink: TeeBuffer,
}

impl<R> TeeReader<R> {
    pub(crate) fn new(inner: R, sink: TeeBuffer) -> Self {
        Self { inner, sink }
    }
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.sink.append(&buf[..read]);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::{TeeBuffer, TeeReader};

    #[test]
    fn tee_reader_copies_every_read() {
        let tee = TeeBuffer::new();
        let mut reader = TeeReader::new(Cursor::new(b"hello world".to_vec()), tee.clone());
        let mut out = String::new();
        reader.read_to_string(&mut out).expect("read");
        assert_eq!(out, "hello world");
        assert_eq!(tee.contents().as_ref(), b"hello world");
    }

    #[test]
    fn detached_buffer_is_independent() {
        let tee = TeeBuffer::new();
        tee.append(b"seed");
        let detached = tee.detach();
        tee.append(b"-more");
        assert_eq!(detached.contents().as_ref(), b"seed");
        assert_eq!(tee.contents().as_ref(), b"seed-more");
    }
}
