use std::io;

use thiserror::Error;

/// Failures of the growth primitive behind a [`Segment`](crate::Segment).
#[derive(Debug, Error)]
pub enum GrowError {
  #[error("segment exhausted ({units} more units requested)")]
  Exhausted { units: usize },

  #[error("growth of {units} units overflows the address space")]
  Overflow { units: usize },

  #[error("program break moved by another party, segment is no longer contiguous")]
  Discontiguous,

  #[error("operating system refused to grow the segment")]
  Os(#[from] io::Error),
}

/// Allocation and deallocation failures.
#[derive(Debug, Error)]
pub enum AllocError {
  #[error("out of memory ({bytes} bytes, {units} units requested)")]
  OutOfMemory {
    bytes: usize,
    units: usize,
    #[source]
    source: GrowError,
  },

  #[error("payload at unit {unit} was not handed out by this allocator")]
  InvalidPointer { unit: usize },

  #[error("double free of payload at unit {unit}")]
  DoubleFree { unit: usize },
}

/// Rejected [`Config`](crate::Config) values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("growth granularity must be at least one unit")]
  ZeroGrowth,

  #[error("growth granularity of {bytes} bytes is not a multiple of the {unit}-byte unit")]
  UnalignedGrowth { bytes: usize, unit: usize },
}

pub type Result<T> = std::result::Result<T, AllocError>;
