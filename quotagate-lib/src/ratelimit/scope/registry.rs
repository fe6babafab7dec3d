use dashmap::DashMap;
use std::sync::Arc;

use super::{ScopeKey, ScopeKind, ScopeLimit, ScopeStatsMap};

/// Lazily created [`ScopeLimit`]s of one scope level.
///
/// The dispatcher keeps two registries, one for region scopes and one for
/// method scopes. Entries are created on first use and kept for the lifetime
/// of the registry; the set of scopes of a real deployment is small.
///
/// # Examples
///
/// ```
/// use quotagate_lib::ratelimit::{ScopeKey, ScopeKind, ScopeRegistry};
/// use std::sync::Arc;
///
/// let registry = ScopeRegistry::new(ScopeKind::Region, 1);
/// let first = registry.get_or_create(&ScopeKey::from("na1"));
/// let second = registry.get_or_create(&ScopeKey::from("NA1"));
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
#[derive(Debug)]
pub struct ScopeRegistry {
    kind: ScopeKind,
    initial_capacity: usize,
    scopes: DashMap<ScopeKey, Arc<ScopeLimit>>,
}

impl ScopeRegistry {
    /// Create an empty registry whose scopes start with `initial_capacity`
    #[must_use]
    pub fn new(kind: ScopeKind, initial_capacity: usize) -> Self {
        Self {
            kind,
            initial_capacity,
            scopes: DashMap::new(),
        }
    }

    /// Get an existing scope or create a new one for the given key.
    ///
    /// Under concurrent first access exactly one [`ScopeLimit`] is created
    /// and every caller receives that instance.
    pub fn get_or_create(&self, key: &ScopeKey) -> Arc<ScopeLimit> {
        if let Some(scope) = self.scopes.get(key) {
            return Arc::clone(&scope);
        }

        match self.scopes.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                // Another task created it in the meantime
                Arc::clone(entry.get())
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                log::debug!("Creating {} scope {key}", self.kind);
                let scope = Arc::new(ScopeLimit::new(
                    key.clone(),
                    self.kind,
                    self.initial_capacity,
                ));
                Arc::clone(entry.insert(scope).value())
            }
        }
    }

    /// Get a scope if it has been used before
    #[must_use]
    pub fn get(&self, key: &ScopeKey) -> Option<Arc<ScopeLimit>> {
        self.scopes.get(key).map(|scope| Arc::clone(&scope))
    }

    /// Number of scopes created so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether no scope has been created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Statistics of all scopes created so far
    #[must_use]
    pub fn stats(&self) -> ScopeStatsMap {
        self.scopes
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().stats()))
            .collect::<std::collections::HashMap<_, _>>()
            .into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = ScopeRegistry::new(ScopeKind::Method, 4);
        assert!(registry.is_empty());
        assert!(registry.get(&ScopeKey::from("na1")).is_none());
    }

    #[test]
    fn test_scope_creation_on_demand() {
        let registry = ScopeRegistry::new(ScopeKind::Region, 4);
        let scope = registry.get_or_create(&ScopeKey::from("euw1"));

        assert_eq!(registry.len(), 1);
        assert_eq!(scope.key().as_str(), "euw1");
        assert_eq!(scope.kind(), ScopeKind::Region);
        assert_eq!(scope.short().capacity(), 4);
        assert!(Arc::ptr_eq(
            &scope,
            &registry.get(&ScopeKey::from("euw1")).unwrap()
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_creates_one_scope() {
        let registry = Arc::new(ScopeRegistry::new(ScopeKind::Region, 1));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_create(&ScopeKey::from("kr")) })
            })
            .collect();

        let mut scopes = Vec::new();
        for handle in handles {
            scopes.push(handle.await.unwrap());
        }
        assert_eq!(registry.len(), 1);
        assert!(scopes.iter().all(|scope| Arc::ptr_eq(scope, &scopes[0])));
    }

    #[test]
    fn test_stats_of_all_scopes() {
        let registry = ScopeRegistry::new(ScopeKind::Region, 1);
        registry
            .get_or_create(&ScopeKey::from("na1"))
            .record_response(http::StatusCode::OK);
        registry.get_or_create(&ScopeKey::from("kr"));

        let stats = registry.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats.get("na1").unwrap().successful_requests, 1);
        assert_eq!(stats.get("kr").unwrap().total_requests, 0);
    }
}
