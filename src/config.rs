use crate::error::PoolError;

/// Pool size used when none is given.
pub const DEFAULT_CAPACITY: usize = 10;

/// Name used for pools built without an explicit name.
pub const DEFAULT_POOL_NAME: &str = "coop_pool";

/// Construction-time settings for a `CoopPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  /// Name attached to every log line the pool emits.
  pub name: String,
  /// Maximum number of tasks in flight at once.
  pub capacity: usize,
}

impl PoolConfig {
  pub fn new(name: &str, capacity: usize) -> Self {
    Self {
      name: name.to_string(),
      capacity,
    }
  }

  /// Checks that the settings describe a pool that can make progress.
  pub fn validate(&self) -> Result<(), PoolError> {
    if self.capacity == 0 {
      return Err(PoolError::ZeroCapacity);
    }
    if self.name.trim().is_empty() {
      return Err(PoolError::InvalidName);
    }
    Ok(())
  }
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self::new(DEFAULT_POOL_NAME, DEFAULT_CAPACITY)
  }
}
