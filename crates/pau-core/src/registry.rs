//! Plugin Registry - name-keyed plugin lookup, one map per capability.
//!
//! A registry may be a child of another; lookups that miss locally fall back
//! to the parent, so a dispatcher can override individual plugins while
//! inheriting the rest.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::plugin::{
    Authenticator, Challenger, Extractor, PrincipalFactory, PrincipalSearch,
    UnauthenticatedPrincipalFactory,
};

/// Capability kinds a plugin can be registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Extractor,
    Authenticator,
    Challenger,
    Searcher,
    Factory,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extractor => "extractor",
            Self::Authenticator => "authenticator",
            Self::Challenger => "challenger",
            Self::Searcher => "searcher",
            Self::Factory => "factory",
        };
        f.write_str(name)
    }
}

struct PluginMap<T: ?Sized> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> PluginMap<T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(name).cloned()
    }

    fn insert(&self, name: &str, plugin: Arc<T>) -> bool {
        self.entries.write().insert(name.to_string(), plugin).is_some()
    }

    fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Scoped plugin registry
pub struct PluginRegistry {
    parent: Option<Arc<PluginRegistry>>,
    extractors: PluginMap<dyn Extractor>,
    authenticators: PluginMap<dyn Authenticator>,
    challengers: PluginMap<dyn Challenger>,
    searchers: PluginMap<dyn PrincipalSearch>,
    factories: PluginMap<dyn PrincipalFactory>,
    unauthenticated: RwLock<Option<Arc<dyn UnauthenticatedPrincipalFactory>>>,
}

impl PluginRegistry {
    /// Create a root registry
    pub fn new() -> Self {
        Self {
            parent: None,
            extractors: PluginMap::new(),
            authenticators: PluginMap::new(),
            challengers: PluginMap::new(),
            searchers: PluginMap::new(),
            factories: PluginMap::new(),
            unauthenticated: RwLock::new(None),
        }
    }

    /// Create a nested registry falling back to `parent`
    pub fn child(parent: Arc<PluginRegistry>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    pub fn parent(&self) -> Option<&Arc<PluginRegistry>> {
        self.parent.as_ref()
    }

    // ========================================================================
    // Registration (replaces an existing entry of the same kind and name)
    // ========================================================================

    pub fn register_extractor(&self, name: &str, plugin: Arc<dyn Extractor>) {
        self.extractors.insert(name, plugin);
    }

    pub fn register_authenticator(&self, name: &str, plugin: Arc<dyn Authenticator>) {
        self.authenticators.insert(name, plugin);
    }

    pub fn register_challenger(&self, name: &str, plugin: Arc<dyn Challenger>) {
        self.challengers.insert(name, plugin);
    }

    pub fn register_searcher(&self, name: &str, plugin: Arc<dyn PrincipalSearch>) {
        self.searchers.insert(name, plugin);
    }

    pub fn register_factory(&self, name: &str, plugin: Arc<dyn PrincipalFactory>) {
        self.factories.insert(name, plugin);
    }

    pub fn set_unauthenticated_factory(&self, factory: Arc<dyn UnauthenticatedPrincipalFactory>) {
        *self.unauthenticated.write() = Some(factory);
    }

    /// Remove a plugin from this scope only. Returns whether it was present.
    pub fn unregister(&self, kind: PluginKind, name: &str) -> bool {
        match kind {
            PluginKind::Extractor => self.extractors.remove(name),
            PluginKind::Authenticator => self.authenticators.remove(name),
            PluginKind::Challenger => self.challengers.remove(name),
            PluginKind::Searcher => self.searchers.remove(name),
            PluginKind::Factory => self.factories.remove(name),
        }
    }

    // ========================================================================
    // Resolution (local scope first, then the parent chain)
    // ========================================================================

    pub fn resolve_extractor(&self, name: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_extractor(name)))
    }

    pub fn resolve_authenticator(&self, name: &str) -> Option<Arc<dyn Authenticator>> {
        self.authenticators
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_authenticator(name)))
    }

    pub fn resolve_challenger(&self, name: &str) -> Option<Arc<dyn Challenger>> {
        self.challengers
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_challenger(name)))
    }

    pub fn resolve_searcher(&self, name: &str) -> Option<Arc<dyn PrincipalSearch>> {
        self.searchers
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_searcher(name)))
    }

    pub fn resolve_factory(&self, name: &str) -> Option<Arc<dyn PrincipalFactory>> {
        self.factories
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_factory(name)))
    }

    pub fn resolve_unauthenticated_factory(&self) -> Option<Arc<dyn UnauthenticatedPrincipalFactory>> {
        self.unauthenticated
            .read()
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_unauthenticated_factory()))
    }

    /// Whether `name` resolves for `kind` in this scope or any parent
    pub fn contains(&self, kind: PluginKind, name: &str) -> bool {
        let local = match kind {
            PluginKind::Extractor => self.extractors.contains(name),
            PluginKind::Authenticator => self.authenticators.contains(name),
            PluginKind::Challenger => self.challengers.contains(name),
            PluginKind::Searcher => self.searchers.contains(name),
            PluginKind::Factory => self.factories.contains(name),
        };
        local || self.parent.as_ref().is_some_and(|p| p.contains(kind, name))
    }

    /// Names registered for `kind` in this scope only, sorted
    pub fn local_names(&self, kind: PluginKind) -> Vec<String> {
        match kind {
            PluginKind::Extractor => self.extractors.names(),
            PluginKind::Authenticator => self.authenticators.names(),
            PluginKind::Challenger => self.challengers.names(),
            PluginKind::Searcher => self.searchers.names(),
            PluginKind::Factory => self.factories.names(),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::request::{AuthRequest, AuthResponse};
    use async_trait::async_trait;

    struct NamedChallenger(&'static str);

    #[async_trait]
    impl Challenger for NamedChallenger {
        fn protocol(&self) -> Option<&str> {
            Some(self.0)
        }

        async fn challenge(&self, _request: &AuthRequest, _response: &mut AuthResponse) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_child_falls_back_to_parent() {
        let root = Arc::new(PluginRegistry::new());
        root.register_challenger("basic", Arc::new(NamedChallenger("root")));

        let child = PluginRegistry::child(Arc::clone(&root));
        let resolved = child.resolve_challenger("basic").unwrap();
        assert_eq!(resolved.protocol(), Some("root"));
        assert!(child.contains(PluginKind::Challenger, "basic"));
        assert!(child.local_names(PluginKind::Challenger).is_empty());
    }

    #[test]
    fn test_child_overrides_parent() {
        let root = Arc::new(PluginRegistry::new());
        root.register_challenger("basic", Arc::new(NamedChallenger("root")));

        let child = PluginRegistry::child(Arc::clone(&root));
        child.register_challenger("basic", Arc::new(NamedChallenger("child")));

        assert_eq!(child.resolve_challenger("basic").unwrap().protocol(), Some("child"));
        assert_eq!(root.resolve_challenger("basic").unwrap().protocol(), Some("root"));
    }

    #[test]
    fn test_unregister_only_affects_local_scope() {
        let root = Arc::new(PluginRegistry::new());
        root.register_challenger("basic", Arc::new(NamedChallenger("root")));
        let child = PluginRegistry::child(Arc::clone(&root));
        child.register_challenger("basic", Arc::new(NamedChallenger("child")));

        assert!(child.unregister(PluginKind::Challenger, "basic"));
        assert!(!child.unregister(PluginKind::Challenger, "basic"));
        assert_eq!(child.resolve_challenger("basic").unwrap().protocol(), Some("root"));
    }

    #[test]
    fn test_unknown_name_resolves_to_none() {
        let registry = PluginRegistry::new();
        assert!(registry.resolve_extractor("missing").is_none());
        assert!(registry.resolve_unauthenticated_factory().is_none());
        assert!(!registry.contains(PluginKind::Factory, "missing"));
    }
}
