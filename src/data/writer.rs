//! Growable write cursor producing an owned [`Block`].
//!
//! Writes at the current position overwrite existing bytes and extend the
//! block when they run past its end.  Offsets that are only known once the
//! rest of the file has been written are back-filled with [`Writer::patch`].

use std::path::Path;

use super::{macroman, Block, ByteOrder, DataError, DataResult, Scalar};

pub struct Writer {
    data:     Block,
    position: usize,
    order:    ByteOrder,
    saved:    Vec<usize>,
}

macro_rules! typed_writes {
    ($($t:ty => $write:ident;)*) => {
        $(
            #[inline]
            pub fn $write(&mut self, value: $t) {
                self.write_scalar(value);
            }
        )*
    };
}

impl Writer {
    pub fn new(order: ByteOrder) -> Self {
        Self::with_capacity(0, order)
    }

    pub fn with_capacity(capacity: usize, order: ByteOrder) -> Self {
        let mut data = Block::new(capacity, order);
        data.resize(0);
        Self { data, position: 0, order, saved: Vec::new() }
    }

    // ── State ────────────────────────────────────────────────────────────────

    #[inline]
    pub fn size(&self) -> usize { self.data.size() }

    #[inline]
    pub fn position(&self) -> usize { self.position }

    /// Move to `position`, clamped to the current size.  Writing at `size`
    /// appends.
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.size());
    }

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

    pub fn change_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn with_byte_order<T>(&mut self, order: ByteOrder, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.order, order);
        let result = f(self);
        self.order = previous;
        result
    }

    /// Seek to `position`, run `f`, then return to where the cursor was.
    pub fn patch<T>(&mut self, position: usize, f: impl FnOnce(&mut Self) -> T) -> T {
        let resume = self.position;
        self.set_position(position);
        let result = f(self);
        self.set_position(resume);
        result
    }

    // ── Raw writes ───────────────────────────────────────────────────────────

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        if end > self.size() {
            self.data.resize(end);
        }
        self.data.write_bytes(self.position, bytes);
        self.position = end;
    }

    pub fn write_data(&mut self, data: &Block) {
        self.write_bytes(&data.bytes());
    }

    /// Append zeros until the output is `size` bytes long.  Never truncates;
    /// the cursor ends at the new end.
    pub fn pad_to_size(&mut self, size: usize) {
        if size > self.size() {
            self.data.resize(size);
        }
        self.position = self.size();
    }

    fn write_scalar<T: Scalar>(&mut self, value: T) {
        let mut buf = [0u8; 8];
        value.encode(self.order, &mut buf[..T::WIDTH]);
        self.write_bytes(&buf[..T::WIDTH]);
    }

    // ── Integers ─────────────────────────────────────────────────────────────

    typed_writes! {
        u8  => write_u8;
        i8  => write_i8;
        u16 => write_u16;
        i16 => write_i16;
        u32 => write_u32;
        i32 => write_i32;
        u64 => write_u64;
        i64 => write_i64;
    }

    /// Low 24 bits of `value`.
    pub fn write_triple(&mut self, value: u32) {
        let b = value.to_be_bytes();
        match self.order {
            ByteOrder::Msb => self.write_bytes(&b[1..]),
            ByteOrder::Lsb => self.write_bytes(&[b[3], b[2], b[1]]),
        }
    }

    pub fn write_fixed_point(&mut self, value: f64) {
        self.write_i32((value * 65536.0).round() as i32);
    }

    // ── Strings ──────────────────────────────────────────────────────────────

    /// Pascal string, MacRoman encoded and truncated to 255 bytes.
    pub fn write_pstr(&mut self, value: &str) {
        let mut bytes = macroman::encode(value);
        bytes.truncate(u8::MAX as usize);
        self.write_u8(bytes.len() as u8);
        self.write_bytes(&bytes);
    }

    /// C string.  `None` writes the text and a NUL.  `Some(n)` writes exactly
    /// `n` bytes: the text truncated to `n - 1` and NUL padded.
    pub fn write_cstr(&mut self, value: &str, size: Option<usize>) {
        let mut bytes = macroman::encode(value);
        match size {
            None => {
                bytes.push(0);
                self.write_bytes(&bytes);
            }
            Some(n) => {
                bytes.resize(n.saturating_sub(1), 0);
                bytes.resize(n, 0);
                self.write_bytes(&bytes);
            }
        }
    }

    // ── Output ───────────────────────────────────────────────────────────────

    pub fn data(&self) -> &Block { &self.data }

    pub fn into_block(self) -> Block { self.data }

    pub fn to_vec(&self) -> Vec<u8> { self.data.to_vec() }

    /// Flush the output to `path`.  A partially written file is removed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DataResult<()> {
        self.data.save(path)
    }
}

impl Default for Writer {
    fn default() -> Self {
        Writer::new(ByteOrder::Msb)
    }
}
