//! S3-compatible object storage for stem artifacts.
//!
//! The worker talks to storage through the [`ObjectStore`] trait; [`S3Store`]
//! is the production implementation (AWS S3 or any S3-compatible endpoint
//! such as R2 or minio).

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3Config, S3Store};
pub use error::{StorageError, StorageResult};
pub use store::ObjectStore;
