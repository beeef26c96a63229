use std::slice;

use crate::{
  UNIT,
  block::{BASE, BlockInfo, Header, IN_USE, Payload},
  config::Config,
  error::{AllocError, GrowError, Result},
  segment::Segment,
  units,
};

macro_rules! event {
  ($list:expr, $level:ident, $($arg:tt)+) => {
    if $list.config.log_events() {
      log::$level!($($arg)+);
    }
  };
}

/// A position in the free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
  /// The zero-sized sentinel anchoring the list.
  Base,
  /// The free block whose header is at this unit index.
  Block(usize),
}

impl Node {
  fn from_link(link: usize) -> Self {
    if link == BASE { Node::Base } else { Node::Block(link) }
  }

  fn link(self) -> usize {
    match self {
      Node::Base => BASE,
      Node::Block(offset) => offset,
    }
  }
}

/// Counters describing the current shape of a [`FreeList`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
  /// Successful growths of the segment.
  pub grows: usize,
  /// Units obtained from the segment so far.
  pub committed_units: usize,
  /// Blocks in the free list, sentinel excluded.
  pub free_blocks: usize,
  /// Units held by those blocks.
  pub free_units: usize,
}

/// Next-fit allocator over a circular list of free blocks.
///
/// Free blocks are linked through their headers into a circular list anchored
/// by a zero-sized sentinel. Each search starts right after the cursor left by
/// the previous call; oversized blocks are split and their tail handed out, so
/// the remaining free part keeps its header and its place in the list. Freed
/// blocks are spliced in right after the cursor and are never merged with
/// their neighbours.
#[derive(Debug)]
pub struct FreeList<S: Segment> {
  segment: S,
  base: Header,
  cursor: Option<usize>,
  config: Config,
  grows: usize,
}

impl<S: Segment> FreeList<S> {
  pub const fn new(segment: S) -> Self {
    Self::with_config(segment, Config::new())
  }

  pub const fn with_config(
    segment: S,
    config: Config,
  ) -> Self {
    Self {
      segment,
      base: Header::new(0, BASE),
      cursor: None,
      config,
      grows: 0,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn segment(&self) -> &S {
    &self.segment
  }

  /// Mutable access to the segment, e.g. to change the limit of a
  /// [`VecSegment`](crate::VecSegment). Committed units must not be touched.
  pub fn segment_mut(&mut self) -> &mut S {
    &mut self.segment
  }

  /// Allocates a block with room for at least `bytes` bytes of payload.
  ///
  /// The block takes `ceil(bytes / UNIT) + 1` units, one of them being its
  /// header, so even `allocate(0)` hands out a distinct one-unit block. When
  /// no free block is large enough the segment is grown once; if that fails
  /// the free list is left exactly as it was.
  pub fn allocate(
    &mut self,
    bytes: usize,
  ) -> Result<Payload> {
    // Never overflows: UNIT > 1.
    let units = units!(bytes) + 1;

    self
      .find_and_consume(units)
      .map_err(|source| AllocError::OutOfMemory {
        bytes,
        units,
        source,
      })
  }

  /// Returns the block behind `payload` to the free list.
  ///
  /// Payloads outside the segment, or whose header is not tagged as handed
  /// out, are rejected without touching any state. The tag lives in the
  /// header's link field, so a caller that overwrote the header can still
  /// corrupt the list.
  pub fn deallocate(
    &mut self,
    payload: Payload,
  ) -> Result<()> {
    let size = match self.check(payload) {
      Ok(size) => size,
      Err(error) => {
        event!(self, warn, "rejected free of unit {}: {}", payload.unit(), error);
        return Err(error);
      }
    };

    let offset = payload.header();
    self.insert(offset);
    event!(self, trace, "freed {} units at unit {}", size, offset);

    Ok(())
  }

  /// Payload bytes of a live allocation.
  pub fn payload(
    &self,
    payload: Payload,
  ) -> Result<&[u8]> {
    let size = self.check(payload)?;
    let span = self.segment.span(payload.unit(), size - 1);

    // SAFETY: Header has no padding, so the span is fully initialized bytes.
    Ok(unsafe { slice::from_raw_parts(span.as_ptr().cast::<u8>(), span.len() * UNIT) })
  }

  /// Mutable payload bytes of a live allocation.
  pub fn payload_mut(
    &mut self,
    payload: Payload,
  ) -> Result<&mut [u8]> {
    let size = self.check(payload)?;
    let span = self.segment.span_mut(payload.unit(), size - 1);

    // SAFETY: as in payload; any byte pattern is a valid Header.
    Ok(unsafe { slice::from_raw_parts_mut(span.as_mut_ptr().cast::<u8>(), span.len() * UNIT) })
  }

  /// Usable bytes of a live allocation, at least the amount requested.
  pub fn payload_len(
    &self,
    payload: Payload,
  ) -> Result<usize> {
    Ok((self.check(payload)? - 1) * UNIT)
  }

  /// Position the next search starts after, `None` before the first use.
  pub fn cursor(&self) -> Option<Node> {
    self.cursor.map(Node::from_link)
  }

  /// Free blocks in list order, starting after the sentinel.
  pub fn free_blocks(&self) -> FreeBlocks<'_, S> {
    let next = match self.cursor {
      Some(_) => self.base.next,
      None => BASE,
    };

    FreeBlocks { list: self, next }
  }

  /// Number of `next` hops needed to come back to `start`.
  ///
  /// `None` when `start` is not on the list. Before first use only the
  /// self-linked sentinel is there.
  pub fn walk_from(
    &self,
    start: Node,
  ) -> Option<usize> {
    if self.cursor.is_none() {
      return (start == Node::Base).then_some(1);
    }

    let limit = self.free_blocks().count() + 1;
    let start = start.link();
    if start != BASE && (start >= self.segment.len() || self.node(start).is_in_use()) {
      return None;
    }

    let mut current = start;
    for steps in 1..=limit {
      current = self.node(current).next;
      if current == start {
        return Some(steps);
      }
      if current != BASE && current >= self.segment.len() {
        return None;
      }
    }

    None
  }

  pub fn stats(&self) -> Stats {
    let (free_blocks, free_units) = self
      .free_blocks()
      .fold((0, 0), |(count, units), block| (count + 1, units + block.size));

    Stats {
      grows: self.grows,
      committed_units: self.segment.len(),
      free_blocks,
      free_units,
    }
  }

  /// Size in units of the live block behind `payload`.
  fn check(
    &self,
    payload: Payload,
  ) -> Result<usize> {
    let unit = payload.unit();
    let offset = payload.header();

    if offset >= self.segment.len() {
      return Err(AllocError::InvalidPointer { unit });
    }

    let header = self.node(offset);
    if !header.is_in_use() {
      return Err(AllocError::DoubleFree { unit });
    }
    if header.size == 0 || header.size > self.segment.len() - offset {
      return Err(AllocError::InvalidPointer { unit });
    }

    Ok(header.size)
  }

  fn node(
    &self,
    at: usize,
  ) -> &Header {
    if at == BASE {
      &self.base
    } else {
      &self.segment.span(at, 1)[0]
    }
  }

  fn node_mut(
    &mut self,
    at: usize,
  ) -> &mut Header {
    if at == BASE {
      &mut self.base
    } else {
      &mut self.segment.span_mut(at, 1)[0]
    }
  }

  /// Returns the cursor, setting up the self-linked sentinel on first use.
  fn init(&mut self) -> usize {
    match self.cursor {
      Some(cursor) => cursor,
      None => {
        self.base = Header::new(0, BASE);
        self.cursor = Some(BASE);
        BASE
      }
    }
  }

  fn find_and_consume(
    &mut self,
    units: usize,
  ) -> std::result::Result<Payload, GrowError> {
    let initialized = self.cursor.is_some();
    let mut previous = self.init();
    let mut current = self.node(previous).next;

    loop {
      let block = *self.node(current);

      if block.size == units {
        self.node_mut(previous).next = block.next;
        self.node_mut(current).next = IN_USE;
        self.cursor = Some(previous);

        event!(self, trace, "exact fit of {} units at unit {}", units, current);
        return Ok(Payload::from_header(current));
      }

      if block.size > units {
        let remaining = block.size - units;
        let tail = current + remaining;

        self.node_mut(current).size = remaining;
        *self.node_mut(tail) = Header::new(units, IN_USE);
        self.cursor = Some(previous);

        event!(
          self,
          trace,
          "split block at unit {}: {} units left, {} units handed out at unit {}",
          current,
          remaining,
          units,
          tail
        );
        return Ok(Payload::from_header(tail));
      }

      // Back at the cursor: every free block has been seen.
      if Some(current) == self.cursor {
        previous = match self.request_memory(units) {
          Ok(cursor) => cursor,
          Err(error) => {
            // A first call that fails leaves the list uninitialized.
            if !initialized {
              self.cursor = None;
            }
            return Err(error);
          }
        };
      } else {
        previous = current;
      }
      current = self.node(previous).next;
    }
  }

  /// Grows the segment by at least the growth granularity and frees the new
  /// units as one block. Returns the position to resume searching from.
  fn request_memory(
    &mut self,
    units: usize,
  ) -> std::result::Result<usize, GrowError> {
    let units = units.max(self.config.growth_units());

    let offset = match self.segment.grow(units) {
      Ok(offset) => offset,
      Err(error) => {
        event!(self, debug, "growth by {} units failed: {}", units, error);
        return Err(error);
      }
    };

    *self.node_mut(offset) = Header::new(units, IN_USE);
    let cursor = self.insert(offset);
    self.grows += 1;

    event!(self, debug, "grew segment by {} units at unit {}", units, offset);
    Ok(cursor)
  }

  /// Splices the block at `offset` in right after the cursor; its size is kept.
  fn insert(
    &mut self,
    offset: usize,
  ) -> usize {
    let cursor = self.init();
    let next = self.node(cursor).next;

    self.node_mut(offset).next = next;
    self.node_mut(cursor).next = offset;

    cursor
  }
}

/// Iterator over the free blocks of a [`FreeList`], see [`FreeList::free_blocks`].
pub struct FreeBlocks<'a, S: Segment> {
  list: &'a FreeList<S>,
  next: usize,
}

impl<S: Segment> Iterator for FreeBlocks<'_, S> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.next == BASE {
      return None;
    }

    let offset = self.next;
    let header = self.list.node(offset);
    self.next = header.next;

    Some(BlockInfo {
      offset,
      size: header.size,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::segment::VecSegment;

  fn list(growth_units: usize) -> FreeList<VecSegment> {
    let config = Config::new().with_growth_units(growth_units).unwrap().quiet();
    FreeList::with_config(VecSegment::new(), config)
  }

  #[test]
  fn test_uninitialized() {
    let list = list(16);

    assert_eq!(list.cursor(), None);
    assert_eq!(list.free_blocks().count(), 0);
    assert_eq!(list.walk_from(Node::Base), Some(1));
    assert_eq!(list.walk_from(Node::Block(0)), None);
    assert_eq!(list.stats(), Stats::default());
  }

  #[test]
  fn test_insert_into_uninitialized_list() {
    let mut list = list(16);
    list.segment_mut().grow(4).unwrap();
    *list.node_mut(0) = Header::new(4, IN_USE);

    assert_eq!(list.insert(0), BASE);

    assert_eq!(list.cursor(), Some(Node::Base));
    assert_eq!(list.base.next, 0);
    assert_eq!(list.node(0).next, BASE);
    assert_eq!(
      list.free_blocks().collect::<Vec<_>>(),
      vec![BlockInfo { offset: 0, size: 4 }]
    );
    assert_eq!(list.walk_from(Node::Base), Some(2));
    assert_eq!(list.walk_from(Node::Block(0)), Some(2));
  }

  #[test]
  fn test_failed_first_allocation_keeps_list_uninitialized() {
    let config = Config::new().quiet();
    let mut list = FreeList::with_config(VecSegment::with_limit(0), config);

    assert!(list.allocate(0).is_err());

    assert_eq!(list.cursor(), None);
    assert_eq!(list.base, Header::new(0, BASE));
    assert_eq!(list.stats(), Stats::default());
  }

  #[test]
  fn test_first_allocation_splits_growth_tail() {
    let mut list = list(16);

    let payload = list.allocate(UNIT).unwrap();

    // 16 units grown, 2 taken from the end.
    assert_eq!(payload.header(), 14);
    assert_eq!(list.cursor(), Some(Node::Base));
    assert_eq!(
      list.free_blocks().collect::<Vec<_>>(),
      vec![BlockInfo { offset: 0, size: 14 }]
    );
    assert!(list.node(14).is_in_use());
    assert_eq!(list.node(14).size, 2);
  }

  #[test]
  fn test_unit_rounding() {
    let mut list = list(64);

    for (bytes, units) in [(0, 1), (1, 2), (UNIT, 2), (UNIT + 1, 3), (3 * UNIT, 4)] {
      let payload = list.allocate(bytes).unwrap();
      assert_eq!(list.node(payload.header()).size, units, "{bytes} bytes");
      assert_eq!(list.payload_len(payload).unwrap(), (units - 1) * UNIT);
    }
  }

  #[test]
  fn test_request_clamped_to_growth_units() {
    let mut list = list(8);

    list.allocate(0).unwrap();
    assert_eq!(list.segment().len(), 8);

    // Larger than the granularity: exactly what is needed.
    let payload = list.allocate(20 * UNIT).unwrap();
    assert_eq!(list.segment().len(), 8 + 21);
    assert_eq!(payload.header(), 8);
    assert_eq!(list.stats().grows, 2);
  }

  #[test]
  fn test_exact_fit_unlinks_and_tags() {
    let mut list = list(4);

    let payload = list.allocate(3 * UNIT).unwrap();

    assert_eq!(payload.header(), 0);
    assert!(list.node(0).is_in_use());
    assert_eq!(list.free_blocks().count(), 0);
    assert_eq!(list.base.next, BASE);
  }

  #[test]
  fn test_insert_after_cursor() {
    let mut list = list(32);

    let a = list.allocate(UNIT).unwrap();
    let b = list.allocate(UNIT).unwrap();
    list.deallocate(a).unwrap();
    list.deallocate(b).unwrap();

    // Each free lands right after the cursor, which stays at the sentinel.
    let offsets: Vec<_> = list.free_blocks().map(|block| block.offset).collect();
    assert_eq!(offsets, vec![b.header(), a.header(), 0]);
    assert_eq!(list.cursor(), Some(Node::Base));
  }

  #[test]
  fn test_cursor_moves_to_predecessor() {
    let mut list = list(32);

    let a = list.allocate(UNIT).unwrap();
    let b = list.allocate(0).unwrap();
    list.deallocate(a).unwrap();
    list.deallocate(b).unwrap();

    // List: base -> b(1) -> a(2) -> remainder(29). A 2-unit request skips b.
    let c = list.allocate(UNIT).unwrap();
    assert_eq!(c, a);
    assert_eq!(list.cursor(), Some(Node::Block(b.header())));
  }

  #[test]
  fn test_free_rejections() {
    let mut list = list(16);

    assert!(matches!(
      list.deallocate(Payload::from_unit(3).unwrap()),
      Err(AllocError::InvalidPointer { unit: 3 })
    ));

    let payload = list.allocate(UNIT).unwrap();
    let before = list.free_blocks().collect::<Vec<_>>();

    assert!(matches!(
      list.deallocate(Payload::from_unit(1).unwrap()),
      Err(AllocError::DoubleFree { unit: 1 })
    ));
    assert!(matches!(
      list.deallocate(Payload::from_unit(100).unwrap()),
      Err(AllocError::InvalidPointer { unit: 100 })
    ));
    assert_eq!(list.free_blocks().collect::<Vec<_>>(), before);

    list.deallocate(payload).unwrap();
    assert!(matches!(
      list.deallocate(payload),
      Err(AllocError::DoubleFree { .. })
    ));
    assert!(list.payload(payload).is_err());
  }

  #[test]
  fn test_corrupted_size_rejected() {
    let mut list = list(16);

    let payload = list.allocate(UNIT).unwrap();
    list.node_mut(payload.header()).size = 40;

    assert!(matches!(
      list.deallocate(payload),
      Err(AllocError::InvalidPointer { .. })
    ));
  }

  #[test]
  fn test_payload_bytes() {
    let mut list = list(16);

    let payload = list.allocate(20).unwrap();
    let bytes = list.payload_mut(payload).unwrap();
    assert_eq!(bytes.len(), 2 * UNIT);
    bytes.fill(0x5A);

    assert!(list.payload(payload).unwrap().iter().all(|byte| *byte == 0x5A));
    assert!(list.node(payload.header()).is_in_use());
    assert_eq!(list.node(payload.header()).size, 3);
  }

  #[test]
  fn test_walk_from() {
    let mut list = list(16);

    let a = list.allocate(UNIT).unwrap();
    list.allocate(UNIT).unwrap();
    list.deallocate(a).unwrap();

    assert_eq!(list.walk_from(Node::Base), Some(3));
    assert_eq!(list.walk_from(Node::Block(a.header())), Some(3));
    assert_eq!(list.walk_from(Node::Block(0)), Some(3));
    assert_eq!(list.walk_from(Node::Block(12)), None);
  }

  #[test]
  fn test_overflow() {
    let mut list = list(16);

    assert!(matches!(
      list.allocate(usize::MAX),
      Err(AllocError::OutOfMemory { .. })
    ));
    assert_eq!(list.stats().committed_units, 0);
  }
}
