//! Request, response and session abstractions seen by plugins.
//!
//! These carry only what extractors and challengers need: headers, form
//! fields and a session id on the way in; status, headers and redirects on
//! the way out. Adapting a real HTTP framework is left to the caller.

use async_trait::async_trait;
use dashmap::DashMap;
use pau_common::{Credentials, Principal};
use std::collections::HashMap;

use crate::error::Result;

/// An inbound request as seen by the authentication pipeline.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    url: String,
    /// Keys are stored lowercased
    headers: HashMap<String, String>,
    form: HashMap<String, String>,
    session_id: Option<String>,
    principal: Option<Principal>,
    /// False when `principal` came from an unauthenticated principal factory
    authenticated: bool,
}

impl AuthRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach an authenticated principal
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.set_principal(principal);
        self
    }

    /// Attach the principal standing in for an anonymous caller
    pub fn with_unauthenticated_principal(mut self, principal: Principal) -> Self {
        self.set_unauthenticated_principal(principal);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Header lookup, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn form_field(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The principal attached to this request, authenticated or not
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Whether the attached principal was produced by authentication
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some() && self.authenticated
    }

    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
        self.authenticated = true;
    }

    pub fn set_unauthenticated_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
        self.authenticated = false;
    }
}

/// Response side-effects produced by challengers.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

impl AuthResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    /// Set a header, replacing any existing value with the same name
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn redirect(&mut self, location: impl Into<String>) {
        self.set_status(302);
        self.set_header("Location", location);
    }

    pub fn location(&self) -> Option<&str> {
        self.header("Location")
    }
}

/// Opaque credential store keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_credentials(&self, session_id: &str) -> Result<Option<Credentials>>;

    async fn store_credentials(&self, session_id: &str, credentials: Credentials) -> Result<()>;

    async fn clear_credentials(&self, session_id: &str) -> Result<()>;
}

/// Process-local session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Credentials>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_credentials(&self, session_id: &str) -> Result<Option<Credentials>> {
        Ok(self.sessions.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn store_credentials(&self, session_id: &str, credentials: Credentials) -> Result<()> {
        self.sessions.insert(session_id.to_string(), credentials);
        Ok(())
    }

    async fn clear_credentials(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}
