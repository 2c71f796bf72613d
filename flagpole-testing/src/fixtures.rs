// Fixture helpers

use flagpole_core::{
    Context, FeatureDefinition, FeatureResolver, FeatureResult, FeatureStore, MemoryStore,
};
use std::sync::Arc;

/// `User` entity context
pub fn user(id: u64) -> Context {
    Context::entity("User", id)
}

/// `Team` entity context
pub fn team(id: u64) -> Context {
    Context::entity("Team", id)
}

/// Resolver over `store` with the given definitions
pub async fn resolver_on(
    store: Arc<dyn FeatureStore>,
    definitions: impl IntoIterator<Item = FeatureDefinition>,
) -> FeatureResult<FeatureResolver> {
    definitions
        .into_iter()
        .fold(FeatureResolver::builder().store(store), |builder, d| {
            builder.define(d)
        })
        .build()
        .await
}

/// Resolver over a fresh in-memory store, returned alongside the store
pub async fn memory_resolver(
    definitions: impl IntoIterator<Item = FeatureDefinition>,
) -> FeatureResult<(FeatureResolver, Arc<MemoryStore>)> {
    let store = Arc::new(MemoryStore::new());
    let resolver = resolver_on(store.clone(), definitions).await?;
    Ok((resolver, store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_resolver() {
        let (mut resolver, store) =
            memory_resolver([FeatureDefinition::boolean("new-ui", true)])
                .await
                .unwrap();

        assert!(resolver.is_active("new-ui", &user(1)).await.unwrap());
        assert_eq!(store.rows_for("new-ui"), 1);
        assert_eq!(resolver.context_key(&team(3)), "Team|3");
    }
}
