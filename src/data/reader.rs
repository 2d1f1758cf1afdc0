//! Sequential/random-access read cursor over a [`Block`].
//!
//! Every typed read comes in two flavours:
//!
//! - `peek_*(offset)` reads at `position + offset` and never moves the cursor;
//! - `read_*()` peeks at the current position, then advances past the value.
//!
//! Reads that would run past the end fail with [`DataError::UnexpectedEof`].
//!
//! # Position sentinel
//! [`Reader::set_position`] clamps to `size + 1`, one past the last valid
//! position.  Format parsers treat that as "no more entries"; any read from
//! it fails.

use std::path::Path;

use super::{macroman, Block, ByteOrder, DataError, DataResult, Scalar};

pub struct Reader {
    data:     Block,
    position: usize,
    order:    ByteOrder,
    saved:    Vec<usize>,
    owns:     bool,
}

macro_rules! typed_reads {
    ($($t:ty => $peek:ident, $read:ident;)*) => {
        $(
            #[inline]
            pub fn $peek(&self, offset: usize) -> DataResult<$t> {
                self.peek_scalar::<$t>(offset)
            }

            #[inline]
            pub fn $read(&mut self) -> DataResult<$t> {
                let value = self.$peek(0)?;
                self.advance(<$t as Scalar>::WIDTH);
                Ok(value)
            }
        )*
    };
}

impl Reader {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Read a block without taking ownership of it.  The reader holds a
    /// zero-copy view; the caller's block stays usable.
    pub fn new(data: &Block) -> Self {
        Self::with_data(data.share(), false)
    }

    /// Read a block the reader owns.
    pub fn from_block(data: Block) -> Self {
        Self::with_data(data, true)
    }

    /// Load the whole file at `path` and read it.
    pub fn from_file<P: AsRef<Path>>(path: P, order: ByteOrder) -> DataResult<Self> {
        Ok(Self::from_block(Block::from_file(path, order)?))
    }

    fn with_data(data: Block, owns: bool) -> Self {
        let order = data.byte_order();
        Self { data, position: 0, order, saved: Vec::new(), owns }
    }

    // ── State ────────────────────────────────────────────────────────────────

    pub fn data(&self) -> &Block { &self.data }

    pub fn owns_data(&self) -> bool { self.owns }

    pub fn into_block(self) -> Block { self.data }

    #[inline]
    pub fn size(&self) -> usize { self.data.size() }

    #[inline]
    pub fn position(&self) -> usize { self.position }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.size().saturating_sub(self.position)
    }

    #[inline]
    pub fn eof(&self) -> bool {
        self.position >= self.size()
    }

    /// Move to `position`, clamped to `[0, size + 1]`.
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.size().saturating_add(1));
    }

    /// Relative move; saturates at both ends of the clamped range.
    pub fn move_by(&mut self, delta: i64) {
        let target = if delta < 0 {
            self.position.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            self.position.saturating_add(delta as usize)
        };
        self.set_position(target);
    }

    pub fn save_position(&mut self) {
        self.saved.push(self.position);
    }

    pub fn restore_position(&mut self) -> DataResult<()> {
        let position = self.saved.pop().ok_or(DataError::PositionStackUnderflow)?;
        self.set_position(position);
        Ok(())
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder { self.order }

    /// Change the order used by subsequent typed reads.  The block's own
    /// order is untouched.
    pub fn change_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// Run `f` with `order` in effect, restoring the previous order after.
    pub fn with_byte_order<T>(&mut self, order: ByteOrder, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.order, order);
        let result = f(self);
        self.order = previous;
        result
    }

    #[inline]
    fn advance(&mut self, count: usize) {
        self.set_position(self.position.saturating_add(count));
    }

    fn peek_scalar<T: Scalar>(&self, offset: usize) -> DataResult<T> {
        let at = self.position.saturating_add(offset);
        self.data.get_at::<T>(at, self.order)
    }

    // ── Integers ─────────────────────────────────────────────────────────────

    typed_reads! {
        u8  => peek_u8,  read_u8;
        i8  => peek_i8,  read_i8;
        u16 => peek_u16, read_u16;
        i16 => peek_i16, read_i16;
        u32 => peek_u32, read_u32;
        i32 => peek_i32, read_i32;
        u64 => peek_u64, read_u64;
        i64 => peek_i64, read_i64;
    }

    /// 24-bit unsigned integer.
    pub fn peek_triple(&self, offset: usize) -> DataResult<u32> {
        let b = self.peek_array::<3>(offset)?;
        Ok(match self.order {
            ByteOrder::Msb => u32::from_be_bytes([0, b[0], b[1], b[2]]),
            ByteOrder::Lsb => u32::from_le_bytes([b[0], b[1], b[2], 0]),
        })
    }

    pub fn read_triple(&mut self) -> DataResult<u32> {
        let value = self.peek_triple(0)?;
        self.advance(3);
        Ok(value)
    }

    /// Signed 16.16 fixed-point number.
    pub fn peek_fixed_point(&self, offset: usize) -> DataResult<f64> {
        Ok(f64::from(self.peek_i32(offset)?) / 65536.0)
    }

    pub fn read_fixed_point(&mut self) -> DataResult<f64> {
        let value = self.peek_fixed_point(0)?;
        self.advance(4);
        Ok(value)
    }

    // ── Raw bytes ────────────────────────────────────────────────────────────

    fn peek_array<const N: usize>(&self, offset: usize) -> DataResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.peek_bytes(offset, N)?);
        Ok(out)
    }

    pub fn peek_bytes(&self, offset: usize, length: usize) -> DataResult<Vec<u8>> {
        let at = self.position.saturating_add(offset);
        let size = self.size();
        match at.checked_add(length) {
            Some(end) if end <= size => Ok(self.data.bytes()[at..end].to_vec()),
            _ => Err(DataError::UnexpectedEof {
                offset: at,
                need:   length,
                have:   size.saturating_sub(at),
            }),
        }
    }

    pub fn read_bytes(&mut self, length: usize) -> DataResult<Vec<u8>> {
        let bytes = self.peek_bytes(0, length)?;
        self.advance(length);
        Ok(bytes)
    }

    /// Zero-copy view of `length` bytes at `position + offset`.
    pub fn peek_data(&self, offset: usize, length: usize) -> DataResult<Block> {
        let at = self.position.saturating_add(offset);
        self.data.slice(at, length, false).map_err(|_| DataError::UnexpectedEof {
            offset: at,
            need:   length,
            have:   self.size().saturating_sub(at),
        })
    }

    pub fn read_data(&mut self, length: usize) -> DataResult<Block> {
        let block = self.peek_data(0, length)?;
        self.advance(length);
        Ok(block)
    }

    /// Like [`Reader::read_data`] but the result owns a private copy.
    pub fn read_data_copy(&mut self, length: usize) -> DataResult<Block> {
        let view = self.read_data(length)?;
        let copy = Block::from_bytes(&view.bytes(), view.byte_order());
        Ok(copy)
    }

    // ── Strings ──────────────────────────────────────────────────────────────

    /// Pascal string: a length byte followed by that many MacRoman bytes.
    pub fn peek_pstr(&self, offset: usize) -> DataResult<String> {
        let length = self.peek_u8(offset)? as usize;
        Ok(macroman::decode(&self.peek_bytes(offset + 1, length)?))
    }

    pub fn read_pstr(&mut self) -> DataResult<String> {
        let length = self.peek_u8(0)? as usize;
        let value = macroman::decode(&self.peek_bytes(1, length)?);
        self.advance(1 + length);
        Ok(value)
    }

    /// C string.  With `size == None` reads up to the terminating NUL and
    /// consumes it.  With `Some(n)` consumes exactly `n` bytes and keeps the
    /// text before the first NUL within them.
    pub fn read_cstr(&mut self, size: Option<usize>) -> DataResult<String> {
        let (value, consumed) = self.scan_cstr(size)?;
        self.advance(consumed);
        Ok(value)
    }

    pub fn peek_cstr(&self, size: Option<usize>) -> DataResult<String> {
        Ok(self.scan_cstr(size)?.0)
    }

    fn scan_cstr(&self, size: Option<usize>) -> DataResult<(String, usize)> {
        match size {
            Some(n) => {
                let raw = self.peek_bytes(0, n)?;
                let end = raw.iter().position(|&b| b == 0).unwrap_or(n);
                Ok((macroman::decode(&raw[..end]), n))
            }
            None => {
                let bytes = self.data.bytes();
                let tail = bytes.get(self.position..).unwrap_or(&[]);
                let end = tail.iter().position(|&b| b == 0).ok_or(DataError::UnexpectedEof {
                    offset: self.position,
                    need:   tail.len() + 1,
                    have:   tail.len(),
                })?;
                Ok((macroman::decode(&tail[..end]), end + 1))
            }
        }
    }

    /// Four-byte resource type code.
    pub fn read_code(&mut self) -> DataResult<String> {
        Ok(macroman::decode(&self.read_bytes(4)?))
    }
}
