//! Storage modules for Filerelay
//!
//! Provides the local staging area for chunked uploads and the relay into cloud object storage.

pub mod blob_relay;
pub mod blob_store_builder;
pub mod name_locks;
pub mod staging_store;

pub use blob_relay::{BlobRelay, DEFAULT_TRANSFER_UNIT, validate_container_name};
pub use blob_store_builder::BlobStoreBuilder;
pub use name_locks::{NameLease, NameLocks};
pub use staging_store::{ChunkWriteResult, StagingStore, validate_file_name};
