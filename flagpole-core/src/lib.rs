//! # Flagpole Core
//!
//! Feature resolution engine: decides, for a feature and an evaluation
//! context, whether the feature is active and which value it carries.
//!
//! ## Features
//!
//! - **Stable Identity**: Contexts (users, teams, tenants) serialize to stable storage keys
//! - **Persisted First Resolution**: A context's first value is stored and never recomputed
//! - **Race-safe Writes**: Concurrent first writes converge on a single stored value
//! - **Dependencies**: Features can require other features, with cycle protection
//! - **Group Fallback**: Cohorts can be switched on with a single stored row
//! - **Variants**: Consistent-hash weighted A/B/n splits
//! - **Expiration**: Time-bound features switch off on their own
//! - **Storage Backends**: In-memory (DashMap), Redis and Postgres
//!
//! ## Quick Start
//!
//! ```rust
//! use flagpole_core::{Context, FeatureDefinition, FeatureResolver};
//!
//! # tokio_test::block_on(async {
//! let mut resolver = FeatureResolver::builder()
//!     .define(FeatureDefinition::boolean("new-ui", true))
//!     .define(FeatureDefinition::percentage("fast-checkout", 25))
//!     .build()
//!     .await?;
//!
//! let user = Context::entity("User", 42);
//!
//! assert!(resolver.is_active("new-ui", &user).await?);
//! resolver.deactivate("new-ui", &user).await?;
//! assert!(!resolver.is_active("new-ui", &user).await?);
//!
//! // Unknown features are undefined, which reads as inactive
//! assert!(resolver.resolve("nope", &user).await?.is_undefined());
//! # Ok::<(), flagpole_core::FeatureError>(())
//! # });
//! ```
//!
//! ## Units of Work
//!
//! A [`FeatureResolver`] memoizes every resolution until its cache is
//! flushed. Create one per request or job, or [`fork`](FeatureResolver::fork)
//! a configured one:
//!
//! ```rust
//! # use flagpole_core::{Context, FeatureResolver};
//! # tokio_test::block_on(async {
//! let base = FeatureResolver::builder().build().await?;
//!
//! let mut request = base.fork();
//! request.activate("beta", &Context::scalar("team-7")).await?;
//! request.flush_cache();
//! # Ok::<(), flagpole_core::FeatureError>(())
//! # });
//! ```

pub mod bucket;
pub mod cache;
pub mod config;
pub mod context;
pub mod definition;
pub mod dependency;
pub mod error;
pub mod events;
pub mod expiration;
pub mod groups;
pub mod resolver;
pub mod stores;
pub mod value;

pub use bucket::{BUCKETS, Bucketer, VariantWeights};
pub use cache::ResolutionCache;
pub use config::{FeatureResolverBuilder, ResolverConfig};
pub use context::{
    Context, ContextSerialize, ContextSerializer, Entity, GROUP_KIND, Identity, NULL_CONTEXT_KEY,
    Scope,
};
pub use definition::{FeatureDefinition, FeatureRegistry, ResolverFn, ResolverKind};
pub use dependency::DependencyGuard;
pub use error::{FeatureError, FeatureResult, StoreError, StoreResult};
pub use events::{CollectingListener, EventListener, FeatureEvent};
pub use expiration::ExpirationPolicy;
pub use groups::{GroupMembershipSource, StaticGroups};
pub use resolver::{DefaultContextFn, FeatureResolver};
pub use stores::{FeatureStore, MemoryStore};
pub use value::{FeatureValue, Payload};

#[cfg(feature = "redis")]
pub use stores::RedisStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

/// Prelude for common imports
pub mod prelude {
    pub use crate::context::{Context, Entity, Scope};
    pub use crate::definition::FeatureDefinition;
    pub use crate::error::{FeatureError, FeatureResult};
    pub use crate::resolver::FeatureResolver;
    pub use crate::stores::FeatureStore;
    pub use crate::value::FeatureValue;
}
