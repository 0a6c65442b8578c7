//! Storage backends: durable blobs, the live state cache, and blob GC.

pub mod blob;
pub mod cache;
pub mod gc;

pub use blob::{BlobStore, LocalBlobStore, StorageError, UrlSigner};
pub use cache::StateCache;
pub use gc::GcSweeper;
