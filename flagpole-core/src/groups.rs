//! Group membership fallback
//!
//! When a context has no active value of its own, the resolver asks a
//! [`GroupMembershipSource`] which cohorts the context belongs to and checks
//! whether any of them has the feature switched on under the group's own
//! context key (`group|<name>`). One stored row then grants the feature to
//! every member.

use crate::error::FeatureResult;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Source of group membership.
#[async_trait]
pub trait GroupMembershipSource: Send + Sync {
    /// Groups the serialized context belongs to, in precedence order
    async fn groups_for(&self, context_key: &str) -> FeatureResult<Vec<String>>;

    /// Features granted to a group
    async fn features_in(&self, group: &str) -> FeatureResult<Vec<String>>;
}

/// In-memory group membership.
///
/// # Examples
///
/// ```
/// use flagpole_core::StaticGroups;
///
/// let groups = StaticGroups::new()
///     .member("beta", "User|1")
///     .grant("beta", "new-ui");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticGroups {
    members: HashMap<String, Vec<String>>,
    grants: HashMap<String, BTreeSet<String>>,
}

impl StaticGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a context key to a group. Membership order is precedence order.
    pub fn member(mut self, group: impl Into<String>, context_key: impl Into<String>) -> Self {
        let group = group.into();
        let groups = self.members.entry(context_key.into()).or_default();
        if !groups.contains(&group) {
            groups.push(group);
        }
        self
    }

    /// Grant a feature to a group
    pub fn grant(mut self, group: impl Into<String>, feature: impl Into<String>) -> Self {
        self.grants
            .entry(group.into())
            .or_default()
            .insert(feature.into());
        self
    }
}

#[async_trait]
impl GroupMembershipSource for StaticGroups {
    async fn groups_for(&self, context_key: &str) -> FeatureResult<Vec<String>> {
        Ok(self.members.get(context_key).cloned().unwrap_or_default())
    }

    async fn features_in(&self, group: &str) -> FeatureResult<Vec<String>> {
        Ok(self
            .grants
            .get(group)
            .map(|features| features.iter().cloned().collect())
            .unwrap_or_default())
    }
}
