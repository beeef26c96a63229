//! Segments backed by the operating system.

use std::{io, ptr};

use libc::{c_void, intptr_t};

use crate::{
  UNIT, align_to,
  block::Header,
  error::GrowError,
  segment::{Segment, StableSegment},
};

fn page_size() -> usize {
  // SAFETY: sysconf has no preconditions.
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size > 0 { size as usize } else { 4096 }
}

fn bytes_for(units: usize) -> Result<usize, GrowError> {
  units
    .checked_mul(UNIT)
    .filter(|bytes| *bytes <= isize::MAX as usize)
    .ok_or(GrowError::Overflow { units })
}

/// Segment carved from one private anonymous mapping.
///
/// The whole address range is reserved inaccessible on first growth and pages
/// are made readable and writable as the segment grows, so units never move
/// and the segment can hand out raw pointers.
#[derive(Debug)]
pub struct MmapSegment {
  base: *mut Header,
  reserved: usize,
  len: usize,
  committed_bytes: usize,
}

// SAFETY: the mapping is owned exclusively by the segment.
unsafe impl Send for MmapSegment {}

impl MmapSegment {
  /// Segment able to grow up to `reserve_bytes`, rounded down to whole units.
  ///
  /// Nothing is mapped until the first call to [`Segment::grow`].
  pub const fn new(reserve_bytes: usize) -> Self {
    Self {
      base: ptr::null_mut(),
      reserved: reserve_bytes / UNIT,
      len: 0,
      committed_bytes: 0,
    }
  }

  /// Number of units the segment can hold in total.
  pub fn capacity(&self) -> usize {
    self.reserved
  }

  fn reserve(&mut self) -> Result<(), GrowError> {
    let bytes = align_to!(bytes_for(self.reserved)?, page_size());

    // SAFETY: anonymous mapping with a null hint, no existing memory is touched.
    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        bytes,
        libc::PROT_NONE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(io::Error::last_os_error().into());
    }

    self.base = address.cast();
    Ok(())
  }
}

impl Segment for MmapSegment {
  fn len(&self) -> usize {
    self.len
  }

  fn grow(
    &mut self,
    units: usize,
  ) -> Result<usize, GrowError> {
    let end = self
      .len
      .checked_add(units)
      .ok_or(GrowError::Overflow { units })?;

    if end > self.reserved {
      return Err(GrowError::Exhausted { units });
    }

    if self.base.is_null() {
      self.reserve()?;
    }

    let wanted = align_to!(bytes_for(end)?, page_size());
    if wanted > self.committed_bytes {
      // SAFETY: committed_bytes and wanted are page aligned and lie inside the reservation.
      let status = unsafe {
        libc::mprotect(
          self.base.cast::<u8>().add(self.committed_bytes).cast::<c_void>(),
          wanted - self.committed_bytes,
          libc::PROT_READ | libc::PROT_WRITE,
        )
      };
      if status != 0 {
        return Err(io::Error::last_os_error().into());
      }
      self.committed_bytes = wanted;
    }

    let previous = self.len;
    self.len = end;
    Ok(previous)
  }

  fn span(
    &self,
    start: usize,
    len: usize,
  ) -> &[Header] {
    assert!(start <= self.len && len <= self.len - start, "span outside segment");
    // SAFETY: the range is committed, readable and aligned for Header.
    unsafe { std::slice::from_raw_parts(self.base.add(start), len) }
  }

  fn span_mut(
    &mut self,
    start: usize,
    len: usize,
  ) -> &mut [Header] {
    assert!(start <= self.len && len <= self.len - start, "span outside segment");
    // SAFETY: the range is committed, writable, aligned for Header and borrowed mutably from self.
    unsafe { std::slice::from_raw_parts_mut(self.base.add(start), len) }
  }
}

// SAFETY: the mapping is never moved or unmapped before drop.
unsafe impl StableSegment for MmapSegment {
  fn as_ptr(&self) -> *mut Header {
    self.base
  }
}

impl Drop for MmapSegment {
  fn drop(&mut self) {
    if self.base.is_null() {
      return;
    }
    if let Ok(bytes) = bytes_for(self.reserved) {
      // SAFETY: base and the rounded size describe the mapping created in reserve.
      unsafe {
        libc::munmap(self.base.cast(), align_to!(bytes, page_size()));
      }
    }
  }
}

/// Segment grown with `sbrk(2)`, the process data segment itself.
///
/// The allocator must be the only party moving the program break; when it
/// finds the break somewhere else than where it left it, growth fails with
/// [`GrowError::Discontiguous`].
#[derive(Debug)]
pub struct SbrkSegment {
  base: *mut Header,
  len: usize,
}

// SAFETY: the committed range belongs to the segment alone.
unsafe impl Send for SbrkSegment {}

impl SbrkSegment {
  pub const fn new() -> Self {
    Self {
      base: ptr::null_mut(),
      len: 0,
    }
  }

  /// Current program break, as reported by `sbrk(0)`.
  pub fn program_break() -> *mut c_void {
    // SAFETY: sbrk(0) only queries the break.
    unsafe { libc::sbrk(0) }
  }

  fn extend(bytes: usize) -> Result<*mut c_void, GrowError> {
    // SAFETY: extending the break does not invalidate any existing memory.
    let address = unsafe { libc::sbrk(bytes as intptr_t) };

    if address == usize::MAX as *mut c_void {
      return Err(io::Error::last_os_error().into());
    }

    Ok(address)
  }

  fn give_back(bytes: usize) {
    // SAFETY: returns exactly the bytes obtained by the last extend call.
    unsafe {
      libc::sbrk(-(bytes as intptr_t));
    }
  }
}

impl Default for SbrkSegment {
  fn default() -> Self {
    Self::new()
  }
}

impl Segment for SbrkSegment {
  fn len(&self) -> usize {
    self.len
  }

  fn grow(
    &mut self,
    units: usize,
  ) -> Result<usize, GrowError> {
    let end = self
      .len
      .checked_add(units)
      .ok_or(GrowError::Overflow { units })?;
    let bytes = bytes_for(units)?;

    if self.base.is_null() {
      let current = Self::program_break() as usize;
      let padding = align_to!(current, UNIT) - current;
      let total = bytes
        .checked_add(padding)
        .ok_or(GrowError::Overflow { units })?;

      let address = Self::extend(total)?;
      if address as usize != current {
        Self::give_back(total);
        return Err(GrowError::Discontiguous);
      }

      // SAFETY: padding is smaller than UNIT and total covers it.
      self.base = unsafe { address.cast::<u8>().add(padding) }.cast();
    } else {
      // SAFETY: base..base + len is the range already committed by this segment.
      let expected = unsafe { self.base.add(self.len) };

      let address = Self::extend(bytes)?;
      if address != expected.cast::<c_void>() {
        Self::give_back(bytes);
        return Err(GrowError::Discontiguous);
      }
    }

    let previous = self.len;
    self.len = end;
    Ok(previous)
  }

  fn span(
    &self,
    start: usize,
    len: usize,
  ) -> &[Header] {
    assert!(start <= self.len && len <= self.len - start, "span outside segment");
    // SAFETY: the range lies below the break this segment moved and is aligned for Header.
    unsafe { std::slice::from_raw_parts(self.base.add(start), len) }
  }

  fn span_mut(
    &mut self,
    start: usize,
    len: usize,
  ) -> &mut [Header] {
    assert!(start <= self.len && len <= self.len - start, "span outside segment");
    // SAFETY: as in span, and borrowed mutably from self.
    unsafe { std::slice::from_raw_parts_mut(self.base.add(start), len) }
  }
}

// SAFETY: the break is never lowered below committed units, so they never move.
unsafe impl StableSegment for SbrkSegment {
  fn as_ptr(&self) -> *mut Header {
    self.base
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mmap_grow_and_write() {
    let mut segment = MmapSegment::new(64 * 1024);

    assert_eq!(segment.capacity(), 64 * 1024 / UNIT);
    assert!(segment.as_ptr().is_null());

    assert_eq!(segment.grow(3).unwrap(), 0);
    let base = segment.as_ptr();
    assert!(!base.is_null());
    assert_eq!(base as usize % UNIT, 0);

    segment.span_mut(0, 3)[2] = Header::new(9, 1);
    assert_eq!(segment.grow(1000).unwrap(), 3);
    assert_eq!(segment.as_ptr(), base);
    assert_eq!(segment.span(2, 1)[0], Header::new(9, 1));

    segment.span_mut(1002, 1)[0] = Header::new(4, 2);
    assert_eq!(segment.span(1002, 1)[0].size, 4);
  }

  #[test]
  fn test_mmap_exhausted() {
    let mut segment = MmapSegment::new(16 * UNIT);

    assert_eq!(segment.grow(10).unwrap(), 0);
    assert!(matches!(segment.grow(7), Err(GrowError::Exhausted { units: 7 })));
    assert_eq!(segment.len(), 10);
    assert_eq!(segment.grow(6).unwrap(), 10);
  }

  #[test]
  #[should_panic(expected = "span outside segment")]
  fn test_mmap_span_bounds() {
    let mut segment = MmapSegment::new(4096);
    segment.grow(2).unwrap();

    segment.span(1, 2);
  }

  #[test]
  #[ignore = "moves the program break under the test harness allocator; run with --ignored --test-threads=1"]
  fn test_sbrk_grow() {
    let mut segment = SbrkSegment::new();

    match segment.grow(4) {
      Ok(previous) => {
        assert_eq!(previous, 0);
        assert_eq!(segment.as_ptr() as usize % UNIT, 0);
        segment.span_mut(0, 4)[3] = Header::new(1, 0);
        assert_eq!(segment.span(3, 1)[0], Header::new(1, 0));
      }
      Err(GrowError::Discontiguous) => assert!(segment.is_empty()),
      Err(error) => panic!("unexpected sbrk failure: {error}"),
    }
  }
}
