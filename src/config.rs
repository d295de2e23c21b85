//! Tunable knobs for the core. The core never loads this from a file or the
//! environment (that is an external collaborator's job, per Non-goals); it
//! only defines the shape callers populate and pass in.
//!
//! Mirrors the teacher's `config.rs` (a plain `Deserialize` struct with a
//! `Default` impl), generalized from FUSE cache knobs to the ADLS knobs this
//! crate actually needs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API version targeted by the REST call layer.
pub const DEFAULT_API_VERSION: &str = "2018-09-01";

/// Maximum pool connections per session, per store account.
pub const MAX_POOL_CONNECTIONS: usize = 1024;

/// Server-enforced ceiling on the write buffer / block size (4 MiB).
pub const MAX_WRITE_BLOCKSIZE: usize = 4 * 1024 * 1024;

/// Default read-ahead block size (32 MiB), matching the original client.
pub const DEFAULT_READ_BLOCKSIZE: usize = 32 * 1024 * 1024;

/// Default chunk size for the parallel transfer engine (256 MiB).
pub const DEFAULT_CHUNKSIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `api-version` query parameter sent with every call. `None` lets the
    /// service pick its own default.
    pub api_version: Option<String>,
    /// Per-attempt wall-clock timeout, independent of the retry budget.
    pub request_timeout: Duration,
    /// Maximum number of attempts for the REST retry policy (not counting
    /// the initial attempt is folded in: attempts run over `0..max_retries`).
    pub max_retries: u32,
    /// Base sleep interval before the first retry.
    pub retry_base_interval: Duration,
    /// Multiplicative backoff factor applied to the interval each retry.
    pub retry_factor: f64,
    /// Size of the per-session connection pool.
    pub max_pool_connections: usize,
    /// Read-ahead quantum used by `RemoteFile` in read mode.
    pub read_blocksize: usize,
    /// Write buffer quantum, clamped to `MAX_WRITE_BLOCKSIZE`.
    pub write_blocksize: usize,
    /// Chunk size used by the transfer engine to shard large files.
    pub chunksize: u64,
    /// Worker count for the transfer engine; `None` means "host CPU count".
    pub nthreads: Option<usize>,
    /// `User-Agent` header value sent with every request.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_version: Some(DEFAULT_API_VERSION.to_string()),
            request_timeout: Duration::from_secs(60),
            max_retries: 4,
            retry_base_interval: Duration::from_secs(1),
            retry_factor: 4.0,
            max_pool_connections: MAX_POOL_CONNECTIONS,
            read_blocksize: DEFAULT_READ_BLOCKSIZE,
            write_blocksize: MAX_WRITE_BLOCKSIZE,
            chunksize: DEFAULT_CHUNKSIZE,
            nthreads: None,
            user_agent: concat!("adls-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    pub fn effective_write_blocksize(&self) -> usize {
        self.write_blocksize.min(MAX_WRITE_BLOCKSIZE)
    }

    pub fn effective_nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
