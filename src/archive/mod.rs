//! Chapter archive assembly
//!
//! # Components
//!
//! - `ArchiveWriter`: buffers page bodies and commits one CBZ atomically
//! - `PagePool`: fetches a chapter's pages with bounded concurrency into a writer

mod pool;
mod writer;

pub use pool::{PagePool, PageProgress, PoolError, ProgressCallback};
pub use writer::{ArchiveError, ArchiveWriter};
