//! [`Block`]: a word-padded, reference-counted byte buffer view.
//!
//! # Ownership
//! A block is always exactly one of:
//!
//! | Ownership | Meaning |
//! |-----------|---------|
//! | `Owned`   | holds its own allocation, padded to [`WORD_SIZE`] |
//! | `Slice`   | zero-copy view into another block's allocation |
//! | `Foreign` | wraps a caller-supplied [`SharedBuffer`] it never owns |
//!
//! The backing allocation is an `Rc<RefCell<Vec<u8>>>`, so it is released
//! exactly once, when the last block viewing it is dropped.  Writes through
//! any view are visible through every other view of the same range.
//!
//! Blocks are `!Send`: sharing one across threads requires copying it.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use super::{word_aligned, ByteOrder, DataError, DataResult, Scalar, WORD_SIZE};

/// Caller-owned storage that a [`Block`] can wrap without taking ownership.
pub type SharedBuffer = Rc<RefCell<Vec<u8>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Slice,
    Foreign,
}

pub struct Block {
    storage:   SharedBuffer,
    start:     usize,
    size:      usize,
    raw_size:  usize,
    order:     ByteOrder,
    ownership: Ownership,
}

impl Block {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Allocate `capacity` bytes, padded up to the next machine word.
    pub fn new(capacity: usize, order: ByteOrder) -> Self {
        let raw_size = word_aligned(capacity);
        Self {
            storage:   Rc::new(RefCell::new(vec![0u8; raw_size])),
            start:     0,
            size:      capacity,
            raw_size,
            order,
            ownership: Ownership::Owned,
        }
    }

    /// Load the entire file at `path` into a new owning block.
    pub fn from_file<P: AsRef<Path>>(path: P, order: ByteOrder) -> DataResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| DataError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::from_vec(bytes, order))
    }

    /// Take ownership of `bytes`.
    pub fn from_vec(mut bytes: Vec<u8>, order: ByteOrder) -> Self {
        let size = bytes.len();
        let raw_size = word_aligned(size);
        bytes.resize(raw_size, 0);
        Self {
            storage:   Rc::new(RefCell::new(bytes)),
            start:     0,
            size,
            raw_size,
            order,
            ownership: Ownership::Owned,
        }
    }

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Self {
        Self::from_vec(bytes.to_vec(), order)
    }

    /// Wrap caller storage.  The block never owns it; the caller's handle
    /// keeps it alive and sees every write made through the block.
    pub fn from_shared(buffer: SharedBuffer, order: ByteOrder) -> Self {
        let size = buffer.borrow().len();
        Self {
            storage:   buffer,
            start:     0,
            size,
            raw_size:  size,
            order,
            ownership: Ownership::Foreign,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, ByteOrder::Msb)
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    /// Logical size in bytes (never includes padding).
    #[inline]
    pub fn size(&self) -> usize { self.size }

    /// Size of the underlying allocation available to this block.
    #[inline]
    pub fn raw_size(&self) -> usize { self.raw_size }

    #[inline]
    pub fn is_empty(&self) -> bool { self.size == 0 }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder { self.order }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    #[inline]
    pub fn ownership(&self) -> Ownership { self.ownership }

    /// Number of blocks (and foreign handles) currently sharing the
    /// backing allocation.
    pub fn users(&self) -> usize {
        Rc::strong_count(&self.storage)
    }

    /// True when both blocks view the same backing allocation.
    pub fn shares_storage_with(&self, other: &Block) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    // ── Raw access ───────────────────────────────────────────────────────────

    /// Borrow the logical bytes.
    pub fn bytes(&self) -> Ref<'_, [u8]> {
        let (start, end) = (self.start, self.start + self.size);
        Ref::map(self.storage.borrow(), |v| &v[start..end])
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes().to_vec()
    }

    /// Write the logical bytes to `path`.
    ///
    /// The bytes are staged in a sibling temporary file and renamed into
    /// place, so on failure `path` keeps whatever it held before and no
    /// partial file is left behind.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DataResult<()> {
        let path = path.as_ref();
        let io_err = |source: io::Error| DataError::Io { path: path.to_owned(), source };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        staged.write_all(&self.bytes()).map_err(io_err)?;
        if let Ok(existing) = std::fs::metadata(path) {
            staged.as_file().set_permissions(existing.permissions()).map_err(io_err)?;
        }
        staged.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    // ── Slicing ──────────────────────────────────────────────────────────────

    /// Zero-copy view over the whole block.
    pub fn share(&self) -> Block {
        Block {
            storage:   Rc::clone(&self.storage),
            start:     self.start,
            size:      self.size,
            raw_size:  self.size,
            order:     self.order,
            ownership: Ownership::Slice,
        }
    }

    /// A view of `length` bytes at `offset`.
    ///
    /// With `copy == false` the result shares this block's allocation and
    /// nothing is allocated.  With `copy == true` the bytes are copied into a
    /// fresh owning block.  Ranges past the end are rejected, never clamped.
    pub fn slice(&self, offset: usize, length: usize, copy: bool) -> DataResult<Block> {
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= self.size)
            .ok_or(DataError::SliceOutOfBounds { offset, length, size: self.size })?;

        if copy {
            return Ok(Block::from_bytes(&self.bytes()[offset..end], self.order));
        }
        Ok(Block {
            storage:   Rc::clone(&self.storage),
            start:     self.start + offset,
            size:      length,
            raw_size:  length,
            order:     self.order,
            ownership: Ownership::Slice,
        })
    }

    // ── Typed access ─────────────────────────────────────────────────────────

    /// Read the `index`-th element of width `T::WIDTH` in the block's order.
    pub fn get<T: Scalar>(&self, index: usize) -> DataResult<T> {
        let offset = index.checked_mul(T::WIDTH).ok_or(DataError::UnexpectedEof {
            offset: usize::MAX,
            need:   T::WIDTH,
            have:   0,
        })?;
        self.get_at(offset, self.order)
    }

    pub fn get_at<T: Scalar>(&self, offset: usize, order: ByteOrder) -> DataResult<T> {
        self.check_range(offset, T::WIDTH)?;
        let bytes = self.bytes();
        Ok(T::decode(&bytes[offset..offset + T::WIDTH], order))
    }

    pub fn set_at<T: Scalar>(&mut self, offset: usize, value: T, order: ByteOrder) -> DataResult<()> {
        self.check_range(offset, T::WIDTH)?;
        let mut buf = [0u8; 8];
        value.encode(order, &mut buf[..T::WIDTH]);
        self.write_bytes(offset, &buf[..T::WIDTH]);
        Ok(())
    }

    fn check_range(&self, offset: usize, need: usize) -> DataResult<()> {
        match offset.checked_add(need) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(DataError::UnexpectedEof {
                offset,
                need,
                have: self.size.saturating_sub(offset),
            }),
        }
    }

    /// Number of bytes a write of `bytes` at `start` may touch.
    fn clamped(&self, start: usize, bytes: usize) -> usize {
        bytes.min(self.size.saturating_sub(start))
    }

    // ── Bulk operations ──────────────────────────────────────────────────────

    /// Copy `src` in at `start`, truncated to the remaining space.
    /// Returns the number of bytes written.
    pub fn write_bytes(&mut self, start: usize, src: &[u8]) -> usize {
        let count = self.clamped(start, src.len());
        if count == 0 {
            return 0;
        }
        let begin = self.start + start;
        self.storage.borrow_mut()[begin..begin + count].copy_from_slice(&src[..count]);
        count
    }

    /// Copy `length` bytes from `src` (starting at `src_offset`) to
    /// `dst_offset`.  The source range must exist; the destination is clamped.
    pub fn copy_from(
        &mut self,
        src:        &Block,
        src_offset: usize,
        length:     usize,
        dst_offset: usize,
    ) -> DataResult<usize> {
        src.check_range(src_offset, length)?;
        let count = self.clamped(dst_offset, length);
        if count == 0 {
            return Ok(0);
        }
        if self.shares_storage_with(src) {
            let from = src.start + src_offset;
            let to = self.start + dst_offset;
            self.storage.borrow_mut().copy_within(from..from + count, to);
        } else {
            let bytes = src.bytes();
            self.write_bytes(dst_offset, &bytes[src_offset..src_offset + count]);
        }
        Ok(count)
    }

    /// Fill `bytes` bytes from `start` with `value`.  Returns bytes written.
    pub fn fill(&mut self, value: u8, bytes: usize, start: usize) -> usize {
        self.fill_word(start, bytes, [value; WORD_SIZE])
    }

    /// Fill with a repeating 32-bit pattern, encoded in the block's order.
    pub fn fill_pattern(&mut self, pattern: u32, bytes: usize, start: usize) -> usize {
        let mut encoded = [0u8; 4];
        pattern.encode(self.order, &mut encoded);
        let mut word = [0u8; WORD_SIZE];
        for (i, b) in word.iter_mut().enumerate() {
            *b = encoded[i % 4];
        }
        self.fill_word(start, bytes, word)
    }

    fn fill_word(&mut self, start: usize, bytes: usize, word: [u8; WORD_SIZE]) -> usize {
        let count = self.clamped(start, bytes);
        if count == 0 {
            return 0;
        }
        let begin = self.start + start;
        let mut storage = self.storage.borrow_mut();
        let region = &mut storage[begin..begin + count];

        let mut chunks = region.chunks_exact_mut(WORD_SIZE);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&word);
        }
        for (i, b) in chunks.into_remainder().iter_mut().enumerate() {
            *b = word[i];
        }
        count
    }

    /// Zero the logical region.
    pub fn clear(&mut self) {
        let size = self.size;
        self.fill(0, size, 0);
    }

    /// Grow the logical size within the padded allocation.  Only an owning
    /// block can grow, and never past `raw_size`.
    pub fn increase_size_to(&mut self, size: usize) -> DataResult<()> {
        if size <= self.size {
            return Ok(());
        }
        if self.ownership != Ownership::Owned || size > self.raw_size {
            return Err(DataError::CapacityExceeded {
                requested: size,
                capacity:  self.raw_size,
            });
        }
        self.size = size;
        Ok(())
    }

    /// Set the logical size, reallocating geometrically when the padded
    /// allocation is too small.  A slice or foreign block is first detached
    /// into a private owned copy, as is an owned block with live views, so
    /// the views it shared with are unaffected.
    pub fn resize(&mut self, size: usize) {
        if self.ownership != Ownership::Owned || Rc::strong_count(&self.storage) > 1 {
            let detached = Block::from_bytes(&self.bytes(), self.order);
            *self = detached;
        }
        if size > self.raw_size {
            let raw_size = word_aligned(size.max(self.raw_size.saturating_mul(2)));
            self.storage.borrow_mut().resize(raw_size, 0);
            self.raw_size = raw_size;
        }
        if size < self.size {
            let (from, to) = (size, self.size);
            self.storage.borrow_mut()[from..to].fill(0);
        }
        self.size = size;
    }
}

// ── Trait impls ──────────────────────────────────────────────────────────────

impl Clone for Block {
    /// Owning blocks deep-copy; slices and foreign wrappers share storage.
    fn clone(&self) -> Self {
        match self.ownership {
            Ownership::Owned => {
                let mut copy = Block::new(self.size, self.order);
                copy.write_bytes(0, &self.bytes());
                copy
            }
            Ownership::Slice | Ownership::Foreign => Block {
                storage:   Rc::clone(&self.storage),
                start:     self.start,
                size:      self.size,
                raw_size:  self.raw_size,
                order:     self.order,
                ownership: self.ownership,
            },
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && *self.bytes() == *other.bytes()
    }
}

impl Eq for Block {}

impl Default for Block {
    fn default() -> Self {
        Block::empty()
    }
}

impl From<Vec<u8>> for Block {
    fn from(bytes: Vec<u8>) -> Self {
        Block::from_vec(bytes, ByteOrder::Msb)
    }
}

impl From<&[u8]> for Block {
    fn from(bytes: &[u8]) -> Self {
        Block::from_bytes(bytes, ByteOrder::Msb)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.bytes();
        let preview = &bytes[..bytes.len().min(16)];
        f.debug_struct("Block")
            .field("size", &self.size)
            .field("raw_size", &self.raw_size)
            .field("order", &self.order)
            .field("ownership", &self.ownership)
            .field("head", &hex::encode(preview))
            .finish()
    }
}
