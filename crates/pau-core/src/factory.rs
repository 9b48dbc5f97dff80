//! Principal factories

use async_trait::async_trait;
use pau_common::{Principal, PrincipalInfo};
use std::sync::Arc;

use crate::dispatcher::PluggableAuthentication;
use crate::error::Result;
use crate::events::{PrincipalCreated, PrincipalCreatedSubscriber, PrincipalEvents, PrincipalSource};
use crate::plugin::{PrincipalFactory, UnauthenticatedPrincipalFactory};
use crate::request::AuthRequest;

/// Builds a fresh principal from info and fires a principal-created event.
///
/// The principal takes the already-prefixed `id` handed in by the dispatcher
/// together with the title and description from `info`.
#[derive(Default)]
pub struct DefaultPrincipalFactory {
    events: PrincipalEvents,
}

impl DefaultPrincipalFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn PrincipalCreatedSubscriber>) {
        self.events.subscribe(subscriber);
    }

    pub fn events(&self) -> &PrincipalEvents {
        &self.events
    }

    async fn create(
        &self,
        source: PrincipalSource,
        authentication: &PluggableAuthentication,
        id: &str,
        info: &PrincipalInfo,
        request: Option<&AuthRequest>,
    ) -> Result<Principal> {
        let mut principal = Principal::new(id, info.title.clone(), info.description.clone());
        let mut event = PrincipalCreated {
            source,
            authentication,
            principal: &mut principal,
            info,
            request,
        };
        self.events.notify(&mut event).await?;
        Ok(principal)
    }
}

#[async_trait]
impl PrincipalFactory for DefaultPrincipalFactory {
    async fn create_authenticated_principal(
        &self,
        authentication: &PluggableAuthentication,
        id: &str,
        info: &PrincipalInfo,
        request: &AuthRequest,
    ) -> Result<Option<Principal>> {
        let principal = self
            .create(PrincipalSource::Authenticated, authentication, id, info, Some(request))
            .await?;
        Ok(Some(principal))
    }

    async fn create_found_principal(
        &self,
        authentication: &PluggableAuthentication,
        id: &str,
        info: &PrincipalInfo,
    ) -> Result<Option<Principal>> {
        let principal = self
            .create(PrincipalSource::Found, authentication, id, info, None)
            .await?;
        Ok(Some(principal))
    }
}

/// Fixed principal for callers that did not authenticate
pub struct AnonymousPrincipalFactory {
    id: String,
    title: String,
    description: String,
}

impl AnonymousPrincipalFactory {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

impl UnauthenticatedPrincipalFactory for AnonymousPrincipalFactory {
    fn create_unauthenticated_principal(&self) -> Principal {
        Principal::new(self.id.clone(), self.title.clone(), self.description.clone())
    }
}
