use crate::{UNIT, error::ConfigError};

/// Default growth granularity, in units.
pub const DEFAULT_GROWTH_UNITS: usize = 1024;

/// Tunables of a [`FreeList`](crate::FreeList).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
  growth_units: usize,
  log_events: bool,
}

impl Config {
  pub const fn new() -> Self {
    Self {
      growth_units: DEFAULT_GROWTH_UNITS,
      log_events: true,
    }
  }

  /// Sets the minimum number of units requested from the segment per growth.
  pub fn with_growth_units(
    mut self,
    units: usize,
  ) -> Result<Self, ConfigError> {
    if units == 0 {
      return Err(ConfigError::ZeroGrowth);
    }
    self.growth_units = units;
    Ok(self)
  }

  /// Same as [`Config::with_growth_units`], with the granularity given in bytes.
  ///
  /// `bytes` must be a non-zero multiple of [`UNIT`]; nothing is rounded.
  pub fn with_growth_bytes(
    self,
    bytes: usize,
  ) -> Result<Self, ConfigError> {
    if bytes % UNIT != 0 {
      return Err(ConfigError::UnalignedGrowth { bytes, unit: UNIT });
    }
    self.with_growth_units(bytes / UNIT)
  }

  /// Disables the `log` events emitted by the allocator.
  pub const fn quiet(mut self) -> Self {
    self.log_events = false;
    self
  }

  pub const fn growth_units(&self) -> usize {
    self.growth_units
  }

  pub const fn log_events(&self) -> bool {
    self.log_events
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}
