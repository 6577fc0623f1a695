//! Hard input limits. Everything here is checked before any external call.

/// Max candidates a single bulk/duplication request may expand into.
pub const MAX_CANDIDATES_PER_REQUEST: usize = 10_000;

/// Max chunk size for the batch processor.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// Max concurrent in-flight mutations within a chunk.
pub const MAX_CONCURRENCY: usize = 64;

/// Max additional retry attempts per item.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

pub const MAX_NOTES_LEN: usize = 1_024;

pub const MAX_TENANT_NAME_LEN: usize = 256;
