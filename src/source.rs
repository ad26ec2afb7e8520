use std::io::Read;

use crate::error::Error;

const CHUNK: usize = 8 * 1024;

/// Pull-based byte reader with bounded lookahead and bulk-read capability.
///
/// `peek` never advances the cursor and returns the available prefix at end
/// of input (an empty slice once the source is exhausted). `read_bytes` may
/// return fewer bytes than asked for at end of input; callers inspect the
/// returned length.
pub trait PeekRead {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error>;

    fn read_byte(&mut self) -> Result<u8, Error>;

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error>;

    /// Reads up to (not including) `marker`, or to end of input when the
    /// marker never appears. The cursor is left on the marker.
    fn read_until(&mut self, marker: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        loop {
            let matched = {
                let window = self.peek(marker.len())?;
                if window.is_empty() {
                    return Ok(out);
                }
                window == marker
            };
            if matched {
                return Ok(out);
            }
            out.push(self.read_byte()?);
        }
    }
}

/// In-memory source used for nested parses of decoded stream buffers.
pub struct MemReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MemReader<'a> {
    pub fn new(buf: &'a [u8]) -> MemReader<'a> {
        MemReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

impl PeekRead for MemReader<'_> {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error> {
        let end = (self.pos + n).min(self.buf.len());
        Ok(&self.buf[self.pos..end])
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        if self.pos >= self.buf.len() {
            return Err(Error::UnexpectedEof);
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let end = (self.pos + n).min(self.buf.len());
        let out = self.buf[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }

    fn read_until(&mut self, marker: &[u8]) -> Result<Vec<u8>, Error> {
        let rest = &self.buf[self.pos..];
        match memchr::memmem::find(rest, marker) {
            Some(found) => {
                let out = rest[..found].to_vec();
                self.pos += found;
                Ok(out)
            }
            None => {
                let out = rest.to_vec();
                self.pos = self.buf.len();
                Ok(out)
            }
        }
    }
}

/// Streaming source over an arbitrary reader, used for the outer document.
///
/// Buffers in `CHUNK`-sized pulls. A bulk read larger than the buffered
/// amount drains the buffer, reads the remainder directly from the
/// underlying reader and resets the buffer.
pub struct BufSource<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> BufSource<R> {
    pub fn new(inner: R) -> BufSource<R> {
        BufSource {
            inner,
            buf: Vec::with_capacity(CHUNK),
            pos: 0,
        }
    }

    fn fill(&mut self, n: usize) -> Result<(), Error> {
        if self.pos >= CHUNK {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        while self.buf.len() - self.pos < n {
            let mut chunk = [0u8; CHUNK];
            let read = self.inner.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }
}

impl<R: Read> PeekRead for BufSource<R> {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error> {
        self.fill(n)?;
        let end = (self.pos + n).min(self.buf.len());
        Ok(&self.buf[self.pos..end])
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        self.fill(1)?;
        if self.pos >= self.buf.len() {
            return Err(Error::UnexpectedEof);
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(n.min(1 << 20));
        let buffered = self.buf.len() - self.pos;
        let take = buffered.min(n);
        out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
        self.pos += take;

        if out.len() < n {
            // Buffer exhausted: pull the rest straight from the reader,
            // then reset the buffered state.
            self.buf.clear();
            self.pos = 0;
            let mut chunk = [0u8; CHUNK];
            while out.len() < n {
                let want = (n - out.len()).min(CHUNK);
                let read = self.inner.read(&mut chunk[..want])?;
                if read == 0 {
                    break;
                }
                out.extend_from_slice(&chunk[..read]);
            }
        }
        Ok(out)
    }
}
