//! Principal-created events.
//!
//! Subscribers run synchronously, in registration order, after a principal
//! object is built and before it is returned to the caller. Whatever they
//! change on the principal is what the caller receives.

use async_trait::async_trait;
use parking_lot::RwLock;
use pau_common::{Principal, PrincipalInfo};
use std::sync::Arc;
use tracing::debug;

use crate::dispatcher::PluggableAuthentication;
use crate::error::Result;
use crate::request::AuthRequest;

/// How the principal came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalSource {
    /// Credentials from a request were accepted
    Authenticated,
    /// Looked up by id
    Found,
}

pub struct PrincipalCreated<'a> {
    pub source: PrincipalSource,
    pub authentication: &'a PluggableAuthentication,
    pub principal: &'a mut Principal,
    pub info: &'a PrincipalInfo,
    /// Present only for authenticated principals
    pub request: Option<&'a AuthRequest>,
}

#[async_trait]
pub trait PrincipalCreatedSubscriber: Send + Sync {
    async fn principal_created(&self, event: &mut PrincipalCreated<'_>) -> Result<()>;
}

/// Ordered subscriber list
#[derive(Default)]
pub struct PrincipalEvents {
    subscribers: RwLock<Vec<Arc<dyn PrincipalCreatedSubscriber>>>,
}

impl PrincipalEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn PrincipalCreatedSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Deliver `event` to every subscriber; the first error aborts delivery.
    pub async fn notify(&self, event: &mut PrincipalCreated<'_>) -> Result<()> {
        let subscribers = self.subscribers.read().clone();
        debug!(
            principal_id = %event.principal.id,
            source = ?event.source,
            subscribers = subscribers.len(),
            "Dispatching principal created event"
        );
        for subscriber in subscribers {
            subscriber.principal_created(event).await?;
        }
        Ok(())
    }
}
