use thiserror::Error;

/// Errors that can occur when configuring a `futures_coop` pool.
///
/// Scheduling itself never fails: a pool that cannot make progress simply
/// stays suspended.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
  #[error("Pool capacity must be at least 1 (a pool of capacity 0 never admits anything)")]
  ZeroCapacity,

  #[error("Pool name must not be empty")]
  InvalidName,
}
