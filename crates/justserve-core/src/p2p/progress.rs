//! Byte counting for outgoing payloads.

use std::io::{self, Write};

/// Passes writes through to `inner` and reports the running total after
/// every write.
#[derive(Debug)]
pub struct CountingWriter<W, F> {
    inner: W,
    written: u64,
    on_write: F,
}

impl<W, F> CountingWriter<W, F>
where
    W: Write,
    F: FnMut(u64),
{
    /// Wrap `inner`, calling `on_write` with the total so far.
    pub fn new(inner: W, on_write: F) -> Self {
        Self {
            inner,
            written: 0,
            on_write,
        }
    }

    /// Bytes accepted by the inner writer so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<W, F> Write for CountingWriter<W, F>
where
    W: Write,
    F: FnMut(u64),
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n > 0 {
            self.written += n as u64;
            (self.on_write)(self.written);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
