use crate::error::IamfError;
use crate::obu::leb128;

/// MSB-first bit cursor over a byte slice.
///
/// Every read is bounds checked. Running past the end yields
/// [`IamfError::Truncated`] naming the structure being read.
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Position in bits.
    pos: usize,
    what: &'static str,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        BitReader { data, pos: 0, what }
    }

    fn truncated(&self) -> IamfError {
        IamfError::Truncated(self.what)
    }

    #[inline(always)]
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    /// Whole bytes left after the current (possibly partial) byte.
    pub fn bytes_left(&self) -> usize {
        self.data.len() - self.byte_pos()
    }

    /// Byte offset, rounding a partially consumed byte up.
    pub fn byte_pos(&self) -> usize {
        ((self.pos + 7) / 8).min(self.data.len())
    }

    /// Skip to the next byte boundary.
    pub fn byte_align(&mut self) {
        self.pos = (self.pos + 7) / 8 * 8;
    }

    /// Read up to 64 bits.
    #[inline(always)]
    pub fn read_bits(&mut self, num: usize) -> Result<u64, IamfError> {
        let v = self.peek_bits(num)?;
        self.pos += num;
        Ok(v)
    }

    pub fn peek_bits(&self, num: usize) -> Result<u64, IamfError> {
        debug_assert!(num <= 64);
        if self.bits_left() < num {
            return Err(self.truncated());
        }

        let mut r = 0_u64;
        let mut pos = self.pos;

        for _ in 0..num {
            let byte = self.data[pos / 8];
            let bit = (byte >> (7 - pos % 8)) & 1;
            r = (r << 1) | bit as u64;
            pos += 1;
        }

        Ok(r)
    }

    pub fn skip_bits(&mut self, num: usize) -> Result<(), IamfError> {
        if self.bits_left() < num {
            return Err(self.truncated());
        }
        self.pos += num;
        Ok(())
    }

    /// Read a single bit flag.
    pub fn read_bit_flag(&mut self) -> Result<bool, IamfError> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_u8(&mut self) -> Result<u8, IamfError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, IamfError> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Big endian two's complement 16 bit value.
    pub fn read_i16(&mut self) -> Result<i16, IamfError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u24(&mut self) -> Result<u32, IamfError> {
        Ok(self.read_bits(24)? as u32)
    }

    pub fn read_u32(&mut self) -> Result<u32, IamfError> {
        Ok(self.read_bits(32)? as u32)
    }

    /// Read a leb128 value. Returns the value and the number of bytes it occupied.
    pub fn read_leb128(&mut self) -> Result<(u32, usize), IamfError> {
        let what = self.what;
        let mut next = || self.read_u8().ok();
        leb128::decode(&mut next).map_err(|e| match e {
            IamfError::Truncated(_) => IamfError::Truncated(what),
            e => e,
        })
    }

    /// Read a leb128 value, discarding its encoded length.
    pub fn read_leb(&mut self) -> Result<u32, IamfError> {
        self.read_leb128().map(|(v, _)| v)
    }

    /// Borrow the next `num` bytes. Aligns to a byte boundary first.
    pub fn read_bytes(&mut self, num: usize) -> Result<&'a [u8], IamfError> {
        self.byte_align();
        let start = self.byte_pos();
        if self.data.len() - start < num {
            return Err(self.truncated());
        }
        self.pos += num * 8;
        Ok(&self.data[start..start + num])
    }

    pub fn skip_bytes(&mut self, num: usize) -> Result<(), IamfError> {
        self.read_bytes(num).map(|_| ())
    }

    /// Consume everything up to the end. Aligns to a byte boundary first.
    pub fn read_rest(&mut self) -> &'a [u8] {
        self.byte_align();
        let start = self.byte_pos();
        self.pos = self.data.len() * 8;
        &self.data[start..]
    }
}

/// MSB-first bit writer into a growable buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    acc: u8,
    /// Bits used in `acc`.
    used: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter::default()
    }

    /// Write the low `num` bits of `value`, up to 64.
    pub fn put_bits(&mut self, num: usize, value: u64) {
        debug_assert!(num <= 64);
        for i in (0..num).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.acc = (self.acc << 1) | bit;
            self.used += 1;
            if self.used == 8 {
                self.buf.push(self.acc);
                self.acc = 0;
                self.used = 0;
            }
        }
    }

    pub fn put_bit_flag(&mut self, v: bool) {
        self.put_bits(1, v as u64);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put_bits(8, v as u64);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put_bits(16, v as u64);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_u16(v as u16);
    }

    pub fn put_u24(&mut self, v: u32) {
        self.put_bits(24, v as u64);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put_bits(32, v as u64);
    }

    pub fn put_leb128(&mut self, v: u32) {
        let mut tmp = [0_u8; leb128::MAX_LEB128_SIZE];
        let n = leb128::encode(v, &mut tmp);
        self.put_bytes(&tmp[..n]);
    }

    /// Append whole bytes. Pads to a byte boundary first.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.byte_align();
        self.buf.extend_from_slice(bytes);
    }

    /// Zero pad to the next byte boundary.
    pub fn byte_align(&mut self) {
        if self.used > 0 {
            self.put_bits(8 - self.used, 0);
        }
    }

    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8 + self.used
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.byte_align();
        self.buf
    }
}
