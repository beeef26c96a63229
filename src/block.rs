use std::{mem, num::NonZeroUsize};

/// Link value naming the sentinel node, which lives outside the segment.
pub(crate) const BASE: usize = usize::MAX;

/// Link value stored in the header of a block owned by a caller.
pub(crate) const IN_USE: usize = usize::MAX - 1;

/// Bookkeeping header in front of every block, free or allocated.
///
/// The header is also the allocator's unit of size: a segment is a slice of
/// headers, and payload bytes overlay the units that follow a block's header.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
  /// Unit index of the next free block, [`BASE`] for the sentinel, or
  /// [`IN_USE`] while the block is allocated.
  pub(crate) next: usize,
  /// Block size in units, header included.
  pub(crate) size: usize,
}

/// Size in bytes of one header, and therefore of one unit.
pub const UNIT: usize = mem::size_of::<Header>();

// Payload bytes alias header storage, so every byte of a header must be initialized.
const _: () = assert!(UNIT == 2 * mem::size_of::<usize>(), "header must not contain padding");
const _: () = assert!(UNIT == mem::align_of::<Header>());

impl Header {
  pub(crate) const fn new(
    size: usize,
    next: usize,
  ) -> Self {
    Self { next, size }
  }

  pub(crate) fn is_in_use(&self) -> bool {
    self.next == IN_USE
  }
}

/// Handle to the payload of an allocated block.
///
/// Holds the unit index of the first payload unit; the header sits exactly one
/// unit before it, so a payload is never at index zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(NonZeroUsize);

impl Payload {
  pub(crate) fn from_header(offset: usize) -> Self {
    match NonZeroUsize::new(offset + 1) {
      Some(unit) => Self(unit),
      None => unreachable!("header offset {offset} overflows"),
    }
  }

  /// Rebuilds a payload handle from a unit index previously returned by [`Payload::unit`].
  pub fn from_unit(unit: usize) -> Option<Self> {
    NonZeroUsize::new(unit).map(Self)
  }

  /// Unit index of the first payload byte inside the segment.
  pub fn unit(self) -> usize {
    self.0.get()
  }

  /// Byte offset of the first payload byte from the start of the segment.
  pub fn byte_offset(self) -> usize {
    self.unit() * UNIT
  }

  /// Unit index of the block header, one unit before the payload.
  pub fn header(self) -> usize {
    self.0.get() - 1
  }
}

/// A free block as seen while walking the free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Unit index of the block header.
  pub offset: usize,
  /// Size in units, header included.
  pub size: usize,
}
