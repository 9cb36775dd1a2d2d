use std::io::{self, Read};

use crate::error::IamfError;

/// Largest allocation made ahead of the bytes it is for.
const READ_CHUNK: usize = 64 * 1024;

/// Reader with a small lookahead buffer.
///
/// OBU headers are parsed from the buffer before deciding whether to
/// consume them, so the underlying reader never needs to seek.
pub(crate) struct ByteSource<R> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> ByteSource<R> {
    pub fn new(reader: R) -> Self {
        ByteSource {
            reader,
            buf: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    /// Buffered, unconsumed bytes.
    pub fn peek(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Buffer until `want` bytes are available or the reader ends.
    ///
    /// Returns the number of bytes available.
    pub fn fill(&mut self, want: usize) -> Result<usize, IamfError> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let mut chunk = [0_u8; 64];
        while self.buf.len() < want && !self.eof {
            let n = (want - self.buf.len()).min(chunk.len());
            match self.reader.read(&mut chunk[..n]) {
                Ok(0) => self.eof = true,
                Ok(read) => self.buf.extend_from_slice(&chunk[..read]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self.buf.len())
    }

    /// Consume `n` bytes, reading past the buffer if needed.
    pub fn skip(&mut self, n: usize, what: &'static str) -> Result<(), IamfError> {
        let buffered = self.buf.len() - self.pos;
        if n <= buffered {
            self.pos += n;
            return Ok(());
        }

        self.pos = self.buf.len();
        let rest = (n - buffered) as u64;
        let skipped = io::copy(&mut (&mut self.reader).take(rest), &mut io::sink())?;
        if skipped < rest {
            self.eof = true;
            return Err(IamfError::Truncated(what));
        }

        Ok(())
    }

    /// Consume exactly `n` bytes into a new vec.
    ///
    /// Memory grows with the bytes actually read, so a large declared size
    /// over a short reader fails with [`IamfError::Truncated`].
    pub fn read_vec(&mut self, n: usize, what: &'static str) -> Result<Vec<u8>, IamfError> {
        let mut out = Vec::new();
        out.try_reserve_exact(n.min(READ_CHUNK))?;

        let buffered = (self.buf.len() - self.pos).min(n);
        out.extend_from_slice(&self.buf[self.pos..self.pos + buffered]);
        self.pos += buffered;

        while out.len() < n {
            let want = (n - out.len()).min(READ_CHUNK);
            out.try_reserve(want)?;
            let read = (&mut self.reader).take(want as u64).read_to_end(&mut out)?;
            if read == 0 {
                self.eof = true;
                return Err(IamfError::Truncated(what));
            }
        }

        Ok(out)
    }
}
