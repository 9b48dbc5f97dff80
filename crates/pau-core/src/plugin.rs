//! Plugin capability contracts.
//!
//! Each capability is its own narrow trait. A concrete plugin implements the
//! subset matching its role and is registered once per capability it serves.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use pau_common::{Credentials, Principal, PrincipalInfo};
use serde::{Deserialize, Serialize};

use crate::dispatcher::PluggableAuthentication;
use crate::error::Result;
use crate::request::{AuthRequest, AuthResponse};

/// Lazily produced principal ids. Consumers may stop polling at any point.
pub type PrincipalIdStream = BoxStream<'static, String>;

/// Pulls raw credentials out of a request.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Repeated calls on an unchanged request must return equivalent data.
    async fn extract_credentials(&self, request: &AuthRequest) -> Result<Option<Credentials>>;
}

/// Validates credentials against an identity source.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns info with a source-local id when the credentials are accepted.
    async fn authenticate_credentials(&self, credentials: &Credentials) -> Result<Option<PrincipalInfo>>;

    /// Lookup by source-local id, independent of credentials.
    async fn principal_info(&self, id: &str) -> Result<Option<PrincipalInfo>>;
}

/// Issues a challenge, or forgets remembered credentials on logout.
///
/// Challengers sharing a protocol cooperate within one round: once a
/// challenger with protocol `P` handles the request, only other `P`
/// challengers are invoked. A challenger without a protocol that handles the
/// request ends the round.
#[async_trait]
pub trait Challenger: Send + Sync {
    fn protocol(&self) -> Option<&str> {
        None
    }

    async fn challenge(&self, request: &AuthRequest, response: &mut AuthResponse) -> Result<bool>;

    async fn logout(&self, _request: &AuthRequest, _response: &mut AuthResponse) -> Result<bool> {
        Ok(false)
    }
}

/// Free-text principal search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// `None` matches nothing, an empty string matches everything.
    pub text: Option<String>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()) }
    }

    /// Lowercased needle for case-insensitive substring matching
    pub fn needle(&self) -> Option<String> {
        self.text.as_ref().map(|t| t.to_lowercase())
    }
}

/// Searches an identity source for principal ids.
pub trait PrincipalSearch: Send + Sync {
    /// `start` skips that many matches, `batch_size` caps how many are yielded.
    fn search(&self, query: &SearchQuery, start: Option<usize>, batch_size: Option<usize>) -> PrincipalIdStream;
}

/// Turns principal info into a principal object.
#[async_trait]
pub trait PrincipalFactory: Send + Sync {
    async fn create_authenticated_principal(
        &self,
        authentication: &PluggableAuthentication,
        id: &str,
        info: &PrincipalInfo,
        request: &AuthRequest,
    ) -> Result<Option<Principal>>;

    async fn create_found_principal(
        &self,
        authentication: &PluggableAuthentication,
        id: &str,
        info: &PrincipalInfo,
    ) -> Result<Option<Principal>>;
}

/// Produces the principal used for callers that did not authenticate.
pub trait UnauthenticatedPrincipalFactory: Send + Sync {
    fn create_unauthenticated_principal(&self) -> Principal;
}

/// Apply `start`/`batch_size` pagination to a lazy id stream.
pub fn paginate<S>(ids: S, start: Option<usize>, batch_size: Option<usize>) -> PrincipalIdStream
where
    S: Stream<Item = String> + Send + 'static,
{
    let ids = ids.skip(start.unwrap_or(0));
    match batch_size {
        Some(limit) => ids.take(limit).boxed(),
        None => ids.boxed(),
    }
}
