//! Shared test utilities for the mediashelf workspace
//!
//! This crate provides in-memory stand-ins for the worker's external
//! collaborators so job logic can be exercised without a database or the
//! ffmpeg tool chain.
//!
//! # Mocks
//!
//! - [`MockMediaStore`] - In-memory media and task storage
//! - [`StaticMetadataExtractor`] - Metadata extractor returning canned values
//!
//! # Fixtures
//!
//! - [`MediaLibrary`] - Temporary media root with helpers to lay out files
//!
//! # Example
//!
//! ```rust,ignore
//! use mediashelf_test_utils::{MediaLibrary, MockMediaStore, StaticMetadataExtractor};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let library = MediaLibrary::new();
//!     library.write("TemporaryMedia/a.jpg", b"jpeg");
//!     let store = MockMediaStore::new();
//!     // Build an AppState from library.config(), store and the extractor
//! }
//! ```

mod extractor;
mod fixtures;
mod store;

pub use extractor::StaticMetadataExtractor;
pub use fixtures::{media_record, MediaLibrary};
pub use store::MockMediaStore;
