use async_trait::async_trait;

use crate::error::Result;
use crate::plugin::Challenger;
use crate::request::{AuthRequest, AuthResponse};

/// Suppresses further challenges when the request already carries an
/// authenticated principal. An unauthenticated principal still gets
/// challenged. Place it first in the challenger list.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlreadyAuthenticatedChallenger;

#[async_trait]
impl Challenger for AlreadyAuthenticatedChallenger {
    async fn challenge(&self, request: &AuthRequest, _response: &mut AuthResponse) -> Result<bool> {
        Ok(request.is_authenticated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::AnonymousPrincipalFactory;
    use crate::plugin::UnauthenticatedPrincipalFactory;
    use pau_common::Principal;

    #[tokio::test]
    async fn test_handles_only_authenticated_requests() {
        let challenger = AlreadyAuthenticatedChallenger;
        let mut response = AuthResponse::new();

        let anonymous = AuthRequest::new("/");
        assert!(!challenger.challenge(&anonymous, &mut response).await.unwrap());

        let authenticated = AuthRequest::new("/").with_principal(Principal::new("users.bob", "Bob", ""));
        assert!(challenger.challenge(&authenticated, &mut response).await.unwrap());
        assert!(response.status().is_none());
    }

    #[tokio::test]
    async fn test_anonymous_principal_is_still_challenged() {
        let challenger = AlreadyAuthenticatedChallenger;
        let mut response = AuthResponse::new();
        let anybody = AnonymousPrincipalFactory::new("pau.anybody", "Unauthenticated Principal", "")
            .create_unauthenticated_principal();

        let request = AuthRequest::new("/").with_unauthenticated_principal(anybody);
        assert!(request.principal().is_some());
        assert!(!request.is_authenticated());
        assert!(!challenger.challenge(&request, &mut response).await.unwrap());
    }
}
