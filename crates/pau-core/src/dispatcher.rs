//! Authentication Dispatcher
//!
//! Runs the ordered plugin pipeline for one dispatcher and delegates to the
//! next dispatcher in the chain when local resolution fails.
//!
//! ## Pipeline
//!
//! - `authenticate`: extractors are the outer loop, authenticators the inner
//!   loop. The first authenticator accepting the first usable credentials
//!   wins and nothing after it runs.
//! - `get_principal`: ids outside this dispatcher's prefix go straight to the
//!   next dispatcher. Local misses are delegated with the prefix re-attached.
//! - `unauthorized` / `logout`: protocol-coordinated challenger broadcast.
//!
//! Plugin names are resolved against the registry on every call. A name that
//! does not resolve is skipped.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use pau_common::{Principal, PrincipalInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::plugin::{PrincipalIdStream, PrincipalSearch, SearchQuery};
use crate::registry::PluginRegistry;
use crate::request::{AuthRequest, AuthResponse};

/// An authentication service that can sit in a delegation chain.
#[async_trait]
pub trait Authentication: Send + Sync {
    /// `Ok(None)` means no credentials were accepted; proceed anonymously.
    async fn authenticate(&self, request: &AuthRequest) -> Result<Option<Principal>>;

    /// Fails with `PrincipalNotFound` once the chain is exhausted.
    async fn get_principal(&self, id: &str) -> Result<Principal>;

    fn unauthenticated_principal(&self) -> Option<Principal>;

    async fn unauthorized(&self, id: Option<&str>, request: &AuthRequest, response: &mut AuthResponse) -> Result<()>;

    async fn logout(&self, request: &AuthRequest, response: &mut AuthResponse) -> Result<()>;
}

/// Ordered plugin names for each capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extractors: Vec<String>,
    pub authenticators: Vec<String>,
    pub challengers: Vec<String>,
    pub factories: Vec<String>,
    pub searchers: Vec<String>,
}

impl From<&pau_config::DispatcherConfig> for PipelineConfig {
    fn from(config: &pau_config::DispatcherConfig) -> Self {
        Self {
            extractors: config.extractors.clone(),
            authenticators: config.authenticators.clone(),
            challengers: config.challengers.clone(),
            factories: config.factories.clone(),
            searchers: config.searchers.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ChallengeAction {
    Challenge,
    Logout,
}

/// Pluggable authentication dispatcher
pub struct PluggableAuthentication {
    prefix: String,
    pipeline: RwLock<PipelineConfig>,
    registry: Arc<PluginRegistry>,
    next: Option<Arc<dyn Authentication>>,
}

impl PluggableAuthentication {
    pub fn new(prefix: impl Into<String>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            prefix: prefix.into(),
            pipeline: RwLock::new(PipelineConfig::default()),
            registry,
            next: None,
        }
    }

    pub fn with_pipeline(self, pipeline: PipelineConfig) -> Self {
        *self.pipeline.write() = pipeline;
        self
    }

    pub fn with_next(mut self, next: Arc<dyn Authentication>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn next(&self) -> Option<&Arc<dyn Authentication>> {
        self.next.as_ref()
    }

    /// Snapshot of the configured plugin names
    pub fn pipeline(&self) -> PipelineConfig {
        self.pipeline.read().clone()
    }

    /// Replace the configured plugin names. In-flight calls keep their snapshot.
    pub fn set_pipeline(&self, pipeline: PipelineConfig) {
        *self.pipeline.write() = pipeline;
    }

    fn prefixed(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    pub async fn authenticate(&self, request: &AuthRequest) -> Result<Option<Principal>> {
        let pipeline = self.pipeline();

        let authenticators: Vec<_> = pipeline
            .authenticators
            .iter()
            .filter_map(|name| {
                let resolved = self.registry.resolve_authenticator(name);
                if resolved.is_none() {
                    debug!(plugin = %name, "Skipping unresolvable authenticator");
                }
                resolved.map(|authenticator| (name, authenticator))
            })
            .collect();

        for extractor_name in &pipeline.extractors {
            let Some(extractor) = self.registry.resolve_extractor(extractor_name) else {
                debug!(plugin = %extractor_name, "Skipping unresolvable extractor");
                continue;
            };

            let Some(credentials) = extractor.extract_credentials(request).await? else {
                continue;
            };

            for (authenticator_name, authenticator) in &authenticators {
                let Some(info) = authenticator.authenticate_credentials(&credentials).await? else {
                    continue;
                };

                let id = self.prefixed(&info.id);
                debug!(
                    prefix = %self.prefix,
                    extractor = %extractor_name,
                    authenticator = %authenticator_name,
                    principal_id = %id,
                    "Credentials accepted"
                );
                return self.create_authenticated(&pipeline, &id, &info, request).await;
            }
        }

        Ok(None)
    }

    async fn create_authenticated(
        &self,
        pipeline: &PipelineConfig,
        id: &str,
        info: &PrincipalInfo,
        request: &AuthRequest,
    ) -> Result<Option<Principal>> {
        for name in &pipeline.factories {
            let Some(factory) = self.registry.resolve_factory(name) else {
                debug!(plugin = %name, "Skipping unresolvable principal factory");
                continue;
            };
            if let Some(principal) = factory.create_authenticated_principal(self, id, info, request).await? {
                return Ok(Some(principal));
            }
        }

        warn!(principal_id = %id, "No principal factory created an authenticated principal");
        Ok(None)
    }

    async fn create_found(&self, pipeline: &PipelineConfig, id: &str, info: &PrincipalInfo) -> Result<Option<Principal>> {
        for name in &pipeline.factories {
            let Some(factory) = self.registry.resolve_factory(name) else {
                debug!(plugin = %name, "Skipping unresolvable principal factory");
                continue;
            };
            if let Some(principal) = factory.create_found_principal(self, id, info).await? {
                return Ok(Some(principal));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub async fn get_principal(&self, id: &str) -> Result<Principal> {
        let Some(local_id) = id.strip_prefix(self.prefix.as_str()) else {
            debug!(prefix = %self.prefix, principal_id = %id, "Id outside prefix, delegating");
            return self.delegate_get_principal(id).await;
        };

        let pipeline = self.pipeline();
        for name in &pipeline.authenticators {
            let Some(authenticator) = self.registry.resolve_authenticator(name) else {
                debug!(plugin = %name, "Skipping unresolvable authenticator");
                continue;
            };

            let Some(info) = authenticator.principal_info(local_id).await? else {
                continue;
            };

            let prefixed = self.prefixed(&info.id);
            return match self.create_found(&pipeline, &prefixed, &info).await? {
                Some(principal) => Ok(principal),
                None => {
                    warn!(principal_id = %prefixed, "No principal factory created a found principal");
                    Err(AuthError::config(format!(
                        "No principal factory produced a principal for {}",
                        prefixed
                    )))
                }
            };
        }

        // A parent with a different prefix scheme may still know the full id
        self.delegate_get_principal(&self.prefixed(local_id)).await
    }

    async fn delegate_get_principal(&self, id: &str) -> Result<Principal> {
        match &self.next {
            Some(next) => next.get_principal(id).await,
            None => Err(AuthError::principal_not_found(id)),
        }
    }

    /// Principal for callers that did not authenticate, if a factory is registered
    pub fn unauthenticated_principal(&self) -> Option<Principal> {
        self.registry
            .resolve_unauthenticated_factory()
            .map(|factory| factory.create_unauthenticated_principal())
    }

    // ========================================================================
    // Challenge / logout
    // ========================================================================

    pub async fn unauthorized(&self, id: Option<&str>, request: &AuthRequest, response: &mut AuthResponse) -> Result<()> {
        if self.coordinate(ChallengeAction::Challenge, request, response).await? {
            return Ok(());
        }
        match &self.next {
            Some(next) => next.unauthorized(id, request, response).await,
            None => Ok(()),
        }
    }

    pub async fn logout(&self, request: &AuthRequest, response: &mut AuthResponse) -> Result<()> {
        if self.coordinate(ChallengeAction::Logout, request, response).await? {
            return Ok(());
        }
        match &self.next {
            Some(next) => next.logout(request, response).await,
            None => Ok(()),
        }
    }

    /// Returns true when the round was handled locally: either a protocol-less
    /// challenger succeeded, or some protocol got locked.
    async fn coordinate(&self, action: ChallengeAction, request: &AuthRequest, response: &mut AuthResponse) -> Result<bool> {
        let pipeline = self.pipeline();
        let mut protocol: Option<String> = None;

        for name in &pipeline.challengers {
            let Some(challenger) = self.registry.resolve_challenger(name) else {
                debug!(plugin = %name, "Skipping unresolvable challenger");
                continue;
            };

            let challenger_protocol = challenger.protocol();
            if protocol.is_some() && challenger_protocol != protocol.as_deref() {
                continue;
            }

            let handled = match action {
                ChallengeAction::Challenge => challenger.challenge(request, response).await?,
                ChallengeAction::Logout => challenger.logout(request, response).await?,
            };
            if !handled {
                continue;
            }

            match challenger_protocol {
                None => {
                    debug!(plugin = %name, ?action, "Challenger handled request without protocol");
                    return Ok(true);
                }
                Some(p) if protocol.is_none() => {
                    debug!(plugin = %name, protocol = %p, ?action, "Challenge protocol locked");
                    protocol = Some(p.to_string());
                }
                Some(_) => {}
            }
        }

        Ok(protocol.is_some())
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Prefix-aware search wrappers for each resolvable configured searcher.
    pub fn get_queriables(&self) -> impl Iterator<Item = (String, PrefixedSearch)> + '_ {
        self.pipeline().searchers.into_iter().filter_map(move |name| {
            let searcher = self.registry.resolve_searcher(&name)?;
            let wrapper = PrefixedSearch {
                prefix: self.prefix.clone(),
                inner: searcher,
            };
            Some((name, wrapper))
        })
    }
}

#[async_trait]
impl Authentication for PluggableAuthentication {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Option<Principal>> {
        PluggableAuthentication::authenticate(self, request).await
    }

    async fn get_principal(&self, id: &str) -> Result<Principal> {
        PluggableAuthentication::get_principal(self, id).await
    }

    fn unauthenticated_principal(&self) -> Option<Principal> {
        PluggableAuthentication::unauthenticated_principal(self)
    }

    async fn unauthorized(&self, id: Option<&str>, request: &AuthRequest, response: &mut AuthResponse) -> Result<()> {
        PluggableAuthentication::unauthorized(self, id, request, response).await
    }

    async fn logout(&self, request: &AuthRequest, response: &mut AuthResponse) -> Result<()> {
        PluggableAuthentication::logout(self, request, response).await
    }
}

/// Search wrapper that prepends the dispatcher prefix to every yielded id
#[derive(Clone)]
pub struct PrefixedSearch {
    prefix: String,
    inner: Arc<dyn PrincipalSearch>,
}

impl PrincipalSearch for PrefixedSearch {
    fn search(&self, query: &SearchQuery, start: Option<usize>, batch_size: Option<usize>) -> PrincipalIdStream {
        let prefix = self.prefix.clone();
        self.inner
            .search(query, start, batch_size)
            .map(move |id| format!("{}{}", prefix, id))
            .boxed()
    }
}
