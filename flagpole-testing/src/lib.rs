//! Testing utilities for Flagpole.
//!
//! ## Features
//!
//! - **RecordingStore** - Counts store round-trips per operation
//! - **GatedStore** - Reproduces concurrent first writes deterministically
//! - **Fixtures** - Context and resolver helpers
//!
//! ## Quick Start
//!
//! ```
//! use flagpole_core::{FeatureDefinition, FeatureResolver, MemoryStore};
//! use flagpole_testing::{RecordingStore, user};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(RecordingStore::new(Arc::new(MemoryStore::new())));
//! let mut resolver = FeatureResolver::builder()
//!     .store(store.clone())
//!     .define(FeatureDefinition::boolean("new-ui", true))
//!     .build()
//!     .await
//!     .unwrap();
//!
//! resolver.resolve("new-ui", &user(1)).await.unwrap();
//! resolver.resolve("new-ui", &user(1)).await.unwrap();
//!
//! // The second lookup is served from the resolution cache
//! assert_eq!(store.call_count("get"), 1);
//! # });
//! ```

pub mod fixtures;
pub mod gated;
pub mod recording;

pub use fixtures::{memory_resolver, resolver_on, team, user};
pub use gated::GatedStore;
pub use recording::RecordingStore;
