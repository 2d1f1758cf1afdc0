//! Byte-addressable buffers and the cursors that read and write them.
//!
//! Every resource format is a sequence of fixed-offset reads and writes
//! against a [`Block`].  A block is a view over a reference-counted backing
//! allocation, so a whole file can be loaded once and every resource payload
//! handed out as a zero-copy slice of it.
//!
//! # Byte order
//! A block carries a native [`ByteOrder`], but [`Reader`] and [`Writer`]
//! keep their own order which may be switched mid-stream.  The rez format
//! depends on this: its header is little-endian while its map is big-endian.

use std::io;
use std::path::PathBuf;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use thiserror::Error;

pub mod block;
pub mod macroman;
pub mod reader;
pub mod writer;

pub use block::{Block, Ownership, SharedBuffer};
pub use reader::Reader;
pub use writer::Writer;

/// Width in bytes of the machine word every allocation is padded to.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

// ── ByteOrder ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Most significant byte first (big-endian).
    #[default]
    Msb,
    /// Least significant byte first (little-endian).
    Lsb,
}

impl ByteOrder {
    pub fn name(self) -> &'static str {
        match self {
            ByteOrder::Msb => "msb",
            ByteOrder::Lsb => "lsb",
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("requested size {requested} exceeds allocated capacity {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },
    #[error("slice {offset:#x}+{length} exceeds block size {size}")]
    SliceOutOfBounds { offset: usize, length: usize, size: usize },
    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof { offset: usize, need: usize, have: usize },
    #[error("restore_position called with no saved position")]
    PositionStackUnderflow,
}

pub type DataResult<T> = Result<T, DataError>;

// ── Scalar codec ─────────────────────────────────────────────────────────────

/// A fixed-width integer that can be decoded from and encoded into raw bytes
/// in either byte order.
pub trait Scalar: Copy {
    const WIDTH: usize;
    fn decode(bytes: &[u8], order: ByteOrder) -> Self;
    fn encode(self, order: ByteOrder, out: &mut [u8]);
}

impl Scalar for u8 {
    const WIDTH: usize = 1;
    fn decode(bytes: &[u8], _: ByteOrder) -> Self { bytes[0] }
    fn encode(self, _: ByteOrder, out: &mut [u8]) { out[0] = self; }
}

impl Scalar for i8 {
    const WIDTH: usize = 1;
    fn decode(bytes: &[u8], _: ByteOrder) -> Self { bytes[0] as i8 }
    fn encode(self, _: ByteOrder, out: &mut [u8]) { out[0] = self as u8; }
}

macro_rules! scalar_impl {
    ($t:ty, $width:expr, $read:ident, $write:ident) => {
        impl Scalar for $t {
            const WIDTH: usize = $width;

            #[inline]
            fn decode(bytes: &[u8], order: ByteOrder) -> Self {
                match order {
                    ByteOrder::Msb => BigEndian::$read(bytes),
                    ByteOrder::Lsb => LittleEndian::$read(bytes),
                }
            }

            #[inline]
            fn encode(self, order: ByteOrder, out: &mut [u8]) {
                match order {
                    ByteOrder::Msb => BigEndian::$write(out, self),
                    ByteOrder::Lsb => LittleEndian::$write(out, self),
                }
            }
        }
    };
}

scalar_impl!(u16, 2, read_u16, write_u16);
scalar_impl!(i16, 2, read_i16, write_i16);
scalar_impl!(u32, 4, read_u32, write_u32);
scalar_impl!(i32, 4, read_i32, write_i32);
scalar_impl!(u64, 8, read_u64, write_u64);
scalar_impl!(i64, 8, read_i64, write_i64);

/// Round `size` up to the next multiple of [`WORD_SIZE`].
#[inline]
pub fn word_aligned(size: usize) -> usize {
    size.div_ceil(WORD_SIZE) * WORD_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_honours_order() {
        let mut buf = [0u8; 4];
        0x0102_0304u32.encode(ByteOrder::Msb, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
        0x0102_0304u32.encode(ByteOrder::Lsb, &mut buf);
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(u32::decode(&buf, ByteOrder::Lsb), 0x0102_0304);
        assert_eq!(i16::decode(&[0xFF, 0xFE], ByteOrder::Msb), -2);
    }

    #[test]
    fn word_alignment() {
        assert_eq!(word_aligned(0), 0);
        assert_eq!(word_aligned(1), WORD_SIZE);
        assert_eq!(word_aligned(WORD_SIZE), WORD_SIZE);
        assert_eq!(word_aligned(WORD_SIZE + 1), WORD_SIZE * 2);
    }
}
