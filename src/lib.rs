//! # rfreelist - A Next-Fit Free-List Allocator
//!
//! This crate provides a general purpose **free-list allocator** that serves
//! variable sized requests from memory obtained in bulk from a monotonically
//! growing segment, the way a classic `sbrk(2)` based `malloc` does.
//!
//! ## Overview
//!
//! Free blocks are threaded through their own headers into a circular list
//! anchored by a zero-sized sentinel:
//!
//! ```text
//!   Free List:
//!
//!        ┌──────┐     ┌──────────┐     ┌──────┐     ┌───────────────┐
//!   ┌───►│ base │────►│ 3 units  │────►│  1   │────►│   40 units    │────┐
//!   │    │ (0)  │     └──────────┘     └──────┘     └───────────────┘    │
//!   │    └──────┘          ▲                                             │
//!   │                      └── cursor: next search starts after it       │
//!   └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Next fit**: each search resumes after the cursor left by the previous one.
//! - **Split from the tail**: an oversized block shrinks in place and its end
//!   is handed out, so no other link has to change.
//! - **Growth**: after a full circle without a fit the segment grows by at
//!   least [`DEFAULT_GROWTH_UNITS`] units (configurable) and the new space is
//!   freed as one block.
//! - **No coalescing**: freed blocks are spliced in after the cursor and never
//!   merged with their neighbours.
//!
//! ## Crate Structure
//!
//! ```text
//!   rfreelist
//!   ├── align      - Unit arithmetic macros (align_to!, units!)
//!   ├── block      - Header, Payload and the unit size
//!   ├── config     - Growth granularity and logging switch
//!   ├── error      - AllocError, GrowError, ConfigError
//!   ├── freelist   - FreeList: allocate, deallocate, inspection
//!   ├── global     - LockedFreeList, a GlobalAlloc adapter
//!   ├── os         - MmapSegment and SbrkSegment (unix)
//!   └── segment    - Segment trait and VecSegment
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rfreelist::{FreeList, VecSegment};
//!
//! let mut allocator = FreeList::new(VecSegment::new());
//!
//! let payload = allocator.allocate(8).unwrap();
//! allocator.payload_mut(payload).unwrap()[..8].copy_from_slice(&42u64.to_ne_bytes());
//!
//! allocator.deallocate(payload).unwrap();
//!
//! // Same size again: the freed block is reused.
//! assert_eq!(allocator.allocate(8).unwrap(), payload);
//! ```
//!
//! ## Blocks
//!
//! Sizes are counted in units of one header. A request of `n` bytes takes
//! `ceil(n / UNIT) + 1` units:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ next: IN_USE    │  │  ┌──────────────────────────┐  │
//!   │  │ size: N units   │  │  │  (N - 1) * UNIT bytes    │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      16 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Payload handed to the caller
//! ```
//!
//! Blocks are addressed by unit index into the segment, so a [`Payload`] is a
//! plain index that is validated on every use. The `next` field of a handed
//! out block carries an in-use tag, which turns double frees and foreign
//! pointers into [`AllocError`]s instead of silent corruption.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`FreeList`] needs `&mut self`; wrap it in
//!   [`LockedFreeList`] to share it.
//! - **Alignment**: payloads are aligned to [`UNIT`] and nothing more.
//! - **Never shrinks**: memory is not returned to the operating system.

pub mod align;
mod block;
mod config;
mod error;
mod freelist;
mod global;
#[cfg(unix)]
mod os;
mod segment;

pub use block::{BlockInfo, Header, Payload, UNIT};
pub use config::{Config, DEFAULT_GROWTH_UNITS};
pub use error::{AllocError, ConfigError, GrowError, Result};
pub use freelist::{FreeBlocks, FreeList, Node, Stats};
pub use global::LockedFreeList;
#[cfg(unix)]
pub use os::{MmapSegment, SbrkSegment};
pub use segment::{Segment, StableSegment, VecSegment};
