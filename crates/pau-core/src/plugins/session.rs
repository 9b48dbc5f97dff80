//! Session-stored credentials with a login form challenge.
//!
//! Credentials posted through the login form are remembered in the session
//! store and replayed on later requests until logout.

use async_trait::async_trait;
use pau_common::Credentials;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::plugin::{Challenger, Extractor};
use crate::request::{AuthRequest, AuthResponse, SessionStore};

/// Form field that, set to `logout`, forgets the stored credentials
pub const AUTH_REQUEST_FIELD: &str = "authrequest";

pub struct SessionCredentialsPlugin {
    store: Arc<dyn SessionStore>,
    login_field: String,
    password_field: String,
    login_page: String,
    site_url: String,
}

impl SessionCredentialsPlugin {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            login_field: "login".to_string(),
            password_field: "password".to_string(),
            login_page: "loginForm.html".to_string(),
            site_url: "http://127.0.0.1".to_string(),
        }
    }

    pub fn from_config(store: Arc<dyn SessionStore>, config: &pau_config::SessionCredentialsConfig) -> Self {
        Self::new(store)
            .with_fields(&config.login_field, &config.password_field)
            .with_login_page(&config.login_page, &config.site_url)
    }

    pub fn with_fields(mut self, login_field: &str, password_field: &str) -> Self {
        self.login_field = login_field.to_string();
        self.password_field = password_field.to_string();
        self
    }

    pub fn with_login_page(mut self, login_page: &str, site_url: &str) -> Self {
        self.login_page = login_page.to_string();
        self.site_url = site_url.trim_end_matches('/').to_string();
        self
    }

    fn login_url(&self, came_from: &str) -> String {
        format!(
            "{}/@@{}?camefrom={}",
            self.site_url,
            self.login_page,
            urlencoding::encode(came_from)
        )
    }
}

#[async_trait]
impl Extractor for SessionCredentialsPlugin {
    async fn extract_credentials(&self, request: &AuthRequest) -> Result<Option<Credentials>> {
        let Some(session_id) = request.session_id() else {
            return Ok(None);
        };

        let login = request.form_field(&self.login_field).filter(|v| !v.is_empty());
        let password = request.form_field(&self.password_field).filter(|v| !v.is_empty());
        if let (Some(login), Some(password)) = (login, password) {
            debug!(session_id = %session_id, "Storing submitted credentials in session");
            self.store
                .store_credentials(session_id, Credentials::new(login, password))
                .await?;
        }

        let Some(credentials) = self.store.load_credentials(session_id).await? else {
            return Ok(None);
        };

        if request.form_field(AUTH_REQUEST_FIELD) == Some("logout") {
            debug!(session_id = %session_id, "Logout requested, clearing session credentials");
            self.store.clear_credentials(session_id).await?;
            return Ok(None);
        }

        Ok(Some(credentials))
    }
}

#[async_trait]
impl Challenger for SessionCredentialsPlugin {
    async fn challenge(&self, request: &AuthRequest, response: &mut AuthResponse) -> Result<bool> {
        response.redirect(self.login_url(request.url()));
        Ok(true)
    }

    async fn logout(&self, request: &AuthRequest, _response: &mut AuthResponse) -> Result<bool> {
        let Some(session_id) = request.session_id() else {
            return Ok(false);
        };
        self.store.clear_credentials(session_id).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::InMemorySessionStore;

    fn plugin() -> (SessionCredentialsPlugin, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        (SessionCredentialsPlugin::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_no_credentials_without_form_or_session() {
        let (plugin, _) = plugin();
        let request = AuthRequest::new("http://127.0.0.1/").with_session("s1");
        assert!(plugin.extract_credentials(&request).await.unwrap().is_none());

        let no_session = AuthRequest::new("/").with_form_field("login", "scott").with_form_field("password", "tiger");
        assert!(plugin.extract_credentials(&no_session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_form_credentials_are_remembered() {
        let (plugin, store) = plugin();
        let login = AuthRequest::new("/")
            .with_session("s1")
            .with_form_field("login", "scott")
            .with_form_field("password", "tiger");
        let credentials = plugin.extract_credentials(&login).await.unwrap().unwrap();
        assert_eq!(credentials, Credentials::new("scott", "tiger"));
        assert_eq!(store.len(), 1);

        let later = AuthRequest::new("/").with_session("s1");
        assert_eq!(plugin.extract_credentials(&later).await.unwrap().unwrap().login, "scott");

        let relogin = AuthRequest::new("/")
            .with_session("s1")
            .with_form_field("login", "harry")
            .with_form_field("password", "hirsch");
        assert_eq!(plugin.extract_credentials(&relogin).await.unwrap().unwrap().login, "harry");
    }

    #[tokio::test]
    async fn test_logout_form_field_clears_session() {
        let (plugin, store) = plugin();
        store.store_credentials("s1", Credentials::new("scott", "tiger")).await.unwrap();

        let request = AuthRequest::new("/").with_session("s1").with_form_field(AUTH_REQUEST_FIELD, "logout");
        assert!(plugin.extract_credentials(&request).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_challenge_redirects_to_login_page() {
        let (plugin, _) = plugin();
        let mut response = AuthResponse::new();

        assert!(plugin.challenge(&AuthRequest::new("http://127.0.0.1"), &mut response).await.unwrap());
        assert_eq!(response.status(), Some(302));
        assert_eq!(
            response.location(),
            Some("http://127.0.0.1/@@loginForm.html?camefrom=http%3A%2F%2F127.0.0.1")
        );
        assert!(plugin.protocol().is_none());
    }

    #[tokio::test]
    async fn test_custom_login_page() {
        let (plugin, _) = plugin();
        let plugin = plugin.with_login_page("signin.html", "https://example.org/site/");
        let mut response = AuthResponse::new();
        plugin.challenge(&AuthRequest::new("/private"), &mut response).await.unwrap();
        assert_eq!(
            response.location(),
            Some("https://example.org/site/@@signin.html?camefrom=%2Fprivate")
        );
    }

    #[tokio::test]
    async fn test_logout_clears_credentials() {
        let (plugin, store) = plugin();
        store.store_credentials("s1", Credentials::new("scott", "tiger")).await.unwrap();
        let mut response = AuthResponse::new();

        assert!(plugin.logout(&AuthRequest::new("/").with_session("s1"), &mut response).await.unwrap());
        assert!(store.is_empty());
        assert!(!plugin.logout(&AuthRequest::new("/"), &mut response).await.unwrap());
    }
}
