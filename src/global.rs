use std::{
  alloc::{GlobalAlloc, Layout},
  ptr,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{UNIT, block::Payload, config::Config, freelist::FreeList, segment::StableSegment};

/// A [`FreeList`] behind a mutex, usable as `#[global_allocator]`.
///
/// ```rust,ignore
/// use rfreelist::{LockedFreeList, MmapSegment};
///
/// #[global_allocator]
/// static ALLOCATOR: LockedFreeList<MmapSegment> = LockedFreeList::new(MmapSegment::new(1 << 30));
/// ```
///
/// Payloads are aligned to [`UNIT`]; layouts asking for more get a null
/// pointer. Logging is always off here, since a logger may allocate itself.
pub struct LockedFreeList<S: StableSegment> {
  inner: Mutex<FreeList<S>>,
}

impl<S: StableSegment> LockedFreeList<S> {
  pub const fn new(segment: S) -> Self {
    Self::with_config(segment, Config::new())
  }

  pub const fn with_config(
    segment: S,
    config: Config,
  ) -> Self {
    Self {
      inner: Mutex::new(FreeList::with_config(segment, config.quiet())),
    }
  }

  /// Locks the allocator for direct use or inspection.
  pub fn lock(&self) -> MutexGuard<'_, FreeList<S>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

// SAFETY: every payload handed out is UNIT aligned, at least layout.size() bytes
// long, and stays valid until freed because a StableSegment never moves.
unsafe impl<S: StableSegment> GlobalAlloc for LockedFreeList<S> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > UNIT {
      return ptr::null_mut();
    }

    let mut list = self.lock();
    match list.allocate(layout.size()) {
      // SAFETY: the payload unit lies inside the committed segment.
      Ok(payload) => unsafe { list.segment().as_ptr().add(payload.unit()).cast() },
      Err(_) => ptr::null_mut(),
    }
  }

  unsafe fn dealloc(
    &self,
    address: *mut u8,
    _layout: Layout,
  ) {
    let mut list = self.lock();
    let base = list.segment().as_ptr() as usize;

    let Some(offset) = (address as usize).checked_sub(base) else {
      return;
    };
    if offset % UNIT != 0 {
      return;
    }

    // GlobalAlloc cannot report a bad free, rejected pointers are dropped.
    if let Some(payload) = Payload::from_unit(offset / UNIT) {
      let _ = list.deallocate(payload);
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::os::MmapSegment;

  #[test]
  fn test_alignment_limit() {
    let allocator = LockedFreeList::new(MmapSegment::new(1 << 20));
    let layout = Layout::from_size_align(64, 2 * UNIT).unwrap();

    // SAFETY: the layout has a non-zero size.
    let address = unsafe { allocator.alloc(layout) };

    assert!(address.is_null());
    assert_eq!(allocator.lock().stats().committed_units, 0);
  }

  #[test]
  fn test_logging_forced_off() {
    let allocator = LockedFreeList::new(MmapSegment::new(1 << 20));

    assert!(!allocator.lock().config().log_events());
  }
}
