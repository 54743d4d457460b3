//! Constants for the download module (timeouts, concurrency bounds).

/// Default HTTP connect timeout in seconds. Applies to every request.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Minimum allowed segment concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed segment concurrency.
pub const MAX_CONCURRENCY: usize = 100;

/// Default segment concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 16;
