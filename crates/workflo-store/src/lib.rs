//! # workflo-store
//!
//! Interfaces to the two remote storage primitives the coordinator builds on:
//! the durable ordered log store (append + full-snapshot subscription) and
//! the blob store (upload → retrievable URL).
//!
//! The remote backends themselves are external collaborators; this crate
//! defines the traits plus in-memory implementations used by tests and local
//! multi-client simulation.

pub mod blobs;
pub mod log;

mod error;

pub use blobs::{BlobStore, MemoryBlobStore};
pub use error::StoreError;
pub use log::{FeedSnapshot, LogStore, MemoryLogStore, StoredMessage, Subscription};
