//! Growth primitives the free list draws memory from.
//!
//! A segment behaves like the classic program break: it can only be extended,
//! never shrunk, and every extension returns the previous boundary. Memory is
//! addressed by unit index from the start of the segment.

use crate::{block::Header, error::GrowError};

/// A contiguous, monotonically growing run of units.
pub trait Segment {
  /// Number of committed units.
  fn len(&self) -> usize;

  /// Commits `units` more units and returns the previous length.
  ///
  /// On failure the segment is left untouched.
  fn grow(
    &mut self,
    units: usize,
  ) -> Result<usize, GrowError>;

  /// Units `start..start + len`. Panics when the range is not committed.
  fn span(
    &self,
    start: usize,
    len: usize,
  ) -> &[Header];

  /// Mutable units `start..start + len`. Panics when the range is not committed.
  fn span_mut(
    &mut self,
    start: usize,
    len: usize,
  ) -> &mut [Header];

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Segment whose units never move once committed.
///
/// # Safety
///
/// `as_ptr` must return the same address for the life of the segment, and the
/// first `len()` units behind it must stay valid for reads and writes.
pub unsafe trait StableSegment: Segment {
  fn as_ptr(&self) -> *mut Header;
}

/// Heap-backed segment, optionally capped at a fixed number of units.
///
/// Growing past the cap reports [`GrowError::Exhausted`], which is how tests
/// stand in for an operating system that is out of memory.
#[derive(Debug, Default)]
pub struct VecSegment {
  units: Vec<Header>,
  limit: Option<usize>,
}

impl VecSegment {
  pub fn new() -> Self {
    Self::default()
  }

  /// Segment that refuses to grow beyond `limit` units.
  pub fn with_limit(limit: usize) -> Self {
    Self {
      units: Vec::new(),
      limit: Some(limit),
    }
  }

  /// Changes the cap; already committed units are kept.
  pub fn set_limit(
    &mut self,
    limit: Option<usize>,
  ) {
    self.limit = limit;
  }
}

impl Segment for VecSegment {
  fn len(&self) -> usize {
    self.units.len()
  }

  fn grow(
    &mut self,
    units: usize,
  ) -> Result<usize, GrowError> {
    let previous = self.units.len();
    let end = previous
      .checked_add(units)
      .ok_or(GrowError::Overflow { units })?;

    if self.limit.is_some_and(|limit| end > limit) {
      return Err(GrowError::Exhausted { units });
    }

    self
      .units
      .try_reserve_exact(units)
      .map_err(|_| GrowError::Exhausted { units })?;
    self.units.resize(end, Header::default());

    Ok(previous)
  }

  fn span(
    &self,
    start: usize,
    len: usize,
  ) -> &[Header] {
    &self.units[start..start + len]
  }

  fn span_mut(
    &mut self,
    start: usize,
    len: usize,
  ) -> &mut [Header] {
    &mut self.units[start..start + len]
  }
}
