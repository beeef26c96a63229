/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use rfreelist::align_to;
///
/// assert_eq!(align_to!(13usize, 16), 16);
/// assert_eq!(align_to!(32usize, 16), 32);
/// assert_eq!(align_to!(0usize, 8), 0);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Number of whole units needed to hold `bytes` bytes of payload.
///
/// The header unit is not included, see [`FreeList::allocate`](crate::FreeList::allocate).
///
/// ```rust
/// use rfreelist::{UNIT, units};
///
/// assert_eq!(units!(0usize), 0);
/// assert_eq!(units!(1usize), 1);
/// assert_eq!(units!(UNIT), 1);
/// assert_eq!(units!(UNIT + 1), 2);
/// ```
#[macro_export]
macro_rules! units {
  ($bytes:expr) => {
    usize::div_ceil($bytes, $crate::UNIT)
  };
}

#[cfg(test)]
mod tests {
  use crate::UNIT;

  #[test]
  fn test_align_to() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (UNIT * i + 1)..=(UNIT * (i + 1));

      let expected_alignment = UNIT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align_to!(size, UNIT));
      }
    }
  }

  #[test]
  fn test_units() {
    assert_eq!(units!(0usize), 0);

    for i in 1..10 {
      for size in (UNIT * (i - 1) + 1)..=(UNIT * i) {
        assert_eq!(i, units!(size));
      }
    }

    assert_eq!(units!(usize::MAX), usize::MAX / UNIT + 1);
  }
}
