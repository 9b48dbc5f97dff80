//! Principal Folder
//!
//! In-memory identity source holding principals keyed by a folder-local name,
//! with a login index kept in step with every mutation. Serves as both an
//! authenticator and a searcher.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use parking_lot::RwLock;
use pau_common::{Credentials, PrincipalInfo};
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AuthError, Result};
use crate::password::PasswordManager;
use crate::plugin::{paginate, Authenticator, PrincipalIdStream, PrincipalSearch, SearchQuery};

/// A stored principal. `password` holds the encoded form.
#[derive(Clone, PartialEq, Eq)]
pub struct InternalPrincipal {
    pub login: String,
    pub password: String,
    pub title: String,
    pub description: String,
}

impl InternalPrincipal {
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.login.to_lowercase().contains(needle)
    }
}

impl fmt::Debug for InternalPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalPrincipal")
            .field("login", &self.login)
            .field("title", &self.title)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct FolderState {
    principals: IndexMap<String, InternalPrincipal>,
    id_by_login: HashMap<String, String>,
}

pub struct PrincipalFolder {
    prefix: String,
    password_manager: Arc<dyn PasswordManager>,
    state: Arc<RwLock<FolderState>>,
}

impl PrincipalFolder {
    pub fn new(prefix: impl Into<String>, password_manager: Arc<dyn PasswordManager>) -> Self {
        Self {
            prefix: prefix.into(),
            password_manager,
            state: Arc::new(RwLock::new(FolderState::default())),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn password_manager(&self) -> &Arc<dyn PasswordManager> {
        &self.password_manager
    }

    /// Add a principal, encoding `password` with this folder's manager.
    pub fn add(
        &self,
        name: &str,
        login: &str,
        password: &str,
        title: &str,
        description: &str,
    ) -> Result<()> {
        let encoded = self.password_manager.encode_password(password)?;
        self.add_with_encoded_password(name, InternalPrincipal::new(login, encoded, title, description))
    }

    /// Add a principal whose password is already encoded
    pub fn add_with_encoded_password(&self, name: &str, principal: InternalPrincipal) -> Result<()> {
        let mut state = self.state.write();
        if state.principals.contains_key(name) {
            return Err(AuthError::duplicate("principal", name));
        }
        if state.id_by_login.contains_key(&principal.login) {
            return Err(AuthError::LoginTaken { login: principal.login });
        }

        state.id_by_login.insert(principal.login.clone(), name.to_string());
        state.principals.insert(name.to_string(), principal);
        info!(folder = %self.prefix, principal = %name, "Principal added");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<InternalPrincipal> {
        let mut state = self.state.write();
        let principal = state
            .principals
            .shift_remove(name)
            .ok_or_else(|| AuthError::UnknownPrincipal { name: name.to_string() })?;
        state.id_by_login.remove(&principal.login);
        info!(folder = %self.prefix, principal = %name, "Principal removed");
        Ok(principal)
    }

    /// Change a login. On conflict the old login stays in place.
    pub fn set_login(&self, name: &str, login: &str) -> Result<()> {
        let mut state = self.state.write();
        let old_login = match state.principals.get(name) {
            Some(principal) => principal.login.clone(),
            None => return Err(AuthError::UnknownPrincipal { name: name.to_string() }),
        };
        if old_login == login {
            return Ok(());
        }
        if state.id_by_login.contains_key(login) {
            return Err(AuthError::LoginTaken { login: login.to_string() });
        }

        state.id_by_login.remove(&old_login);
        state.id_by_login.insert(login.to_string(), name.to_string());
        if let Some(principal) = state.principals.get_mut(name) {
            principal.login = login.to_string();
        }
        debug!(folder = %self.prefix, principal = %name, old_login = %old_login, "Login changed");
        Ok(())
    }

    pub fn set_password(&self, name: &str, password: &str) -> Result<()> {
        let encoded = self.password_manager.encode_password(password)?;
        let mut state = self.state.write();
        let principal = state
            .principals
            .get_mut(name)
            .ok_or_else(|| AuthError::UnknownPrincipal { name: name.to_string() })?;
        principal.password = encoded;
        Ok(())
    }

    pub fn set_title(&self, name: &str, title: &str, description: &str) -> Result<()> {
        let mut state = self.state.write();
        let principal = state
            .principals
            .get_mut(name)
            .ok_or_else(|| AuthError::UnknownPrincipal { name: name.to_string() })?;
        principal.title = title.to_string();
        principal.description = description.to_string();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<InternalPrincipal> {
        self.state.read().principals.get(name).cloned()
    }

    pub fn name_for_login(&self, login: &str) -> Option<String> {
        self.state.read().id_by_login.get(login).cloned()
    }

    /// Folder-local names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.state.read().principals.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().principals.is_empty()
    }

    /// Pick an unused name: an empty request yields `1`, `2`, ...;
    /// a taken one gets a numeric suffix (`bob` -> `bob1`).
    pub fn choose_name(&self, requested: &str) -> String {
        let state = self.state.read();
        let mut candidate = requested.to_string();
        let mut counter = 0usize;
        while candidate.is_empty() || state.principals.contains_key(&candidate) {
            counter += 1;
            candidate = format!("{}{}", requested, counter);
        }
        candidate
    }

    fn info_for(&self, name: &str, principal: &InternalPrincipal) -> PrincipalInfo {
        PrincipalInfo::new(
            format!("{}{}", self.prefix, name),
            principal.login.clone(),
            principal.title.clone(),
            principal.description.clone(),
        )
    }
}

#[async_trait]
impl Authenticator for PrincipalFolder {
    async fn authenticate_credentials(&self, credentials: &Credentials) -> Result<Option<PrincipalInfo>> {
        let found = {
            let state = self.state.read();
            state.id_by_login.get(&credentials.login).and_then(|name| {
                state
                    .principals
                    .get(name)
                    .map(|principal| (name.clone(), principal.clone()))
            })
        };

        let Some((name, principal)) = found else {
            return Ok(None);
        };

        if !self.password_manager.check_password(&principal.password, &credentials.password)? {
            debug!(folder = %self.prefix, login = %credentials.login, "Password rejected");
            return Ok(None);
        }

        Ok(Some(self.info_for(&name, &principal)))
    }

    async fn principal_info(&self, id: &str) -> Result<Option<PrincipalInfo>> {
        let Some(name) = id.strip_prefix(self.prefix.as_str()) else {
            return Ok(None);
        };
        let state = self.state.read();
        Ok(state.principals.get(name).map(|principal| self.info_for(name, principal)))
    }
}

impl PrincipalSearch for PrincipalFolder {
    /// Case-insensitive substring match on title, description and login.
    fn search(&self, query: &SearchQuery, start: Option<usize>, batch_size: Option<usize>) -> PrincipalIdStream {
        let Some(needle) = query.needle() else {
            return stream::empty().boxed();
        };

        let state = Arc::clone(&self.state);
        let prefix = self.prefix.clone();
        let mut index = 0;
        let matches = iter::from_fn(move || loop {
            let guard = state.read();
            let (name, principal) = guard.principals.get_index(index)?;
            index += 1;
            if principal.matches(&needle) {
                return Some(format!("{}{}", prefix, name));
            }
        });

        paginate(stream::iter(matches), start, batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::{PlainTextPasswordManager, Sha256PasswordManager};

    fn folder() -> PrincipalFolder {
        let folder = PrincipalFolder::new("users.", Arc::new(PlainTextPasswordManager));
        folder.add("bob", "bob", "123", "Bob", "Builder").unwrap();
        folder.add("alice", "al", "456", "Alice", "Admin").unwrap();
        folder.add("carol", "carol", "789", "Carol", "builder too").unwrap();
        folder
    }

    #[tokio::test]
    async fn test_authenticate_by_login() {
        let folder = folder();

        let info = folder
            .authenticate_credentials(&Credentials::new("al", "456"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.id, "users.alice");
        assert_eq!(info.login, "al");

        assert!(folder
            .authenticate_credentials(&Credentials::new("al", "wrong"))
            .await
            .unwrap()
            .is_none());
        assert!(folder
            .authenticate_credentials(&Credentials::new("alice", "456"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_authenticate_with_hashed_passwords() {
        let folder = PrincipalFolder::new("", Arc::new(Sha256PasswordManager));
        folder.add("bob", "bob", "secret", "Bob", "").unwrap();

        assert_ne!(folder.get("bob").unwrap().password, "secret");
        let info = folder
            .authenticate_credentials(&Credentials::new("bob", "secret"))
            .await
            .unwrap();
        assert_eq!(info.unwrap().id, "bob");
    }

    #[tokio::test]
    async fn test_principal_info_requires_folder_prefix() {
        let folder = folder();
        assert_eq!(folder.principal_info("users.bob").await.unwrap().unwrap().title, "Bob");
        assert!(folder.principal_info("bob").await.unwrap().is_none());
        assert!(folder.principal_info("users.nobody").await.unwrap().is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let folder = folder();
        assert!(matches!(
            folder.add("bob", "other", "x", "", ""),
            Err(AuthError::DuplicateId { .. })
        ));
        assert!(matches!(
            folder.add("robert", "bob", "x", "", ""),
            Err(AuthError::LoginTaken { .. })
        ));
        assert_eq!(folder.len(), 3);
    }

    #[tokio::test]
    async fn test_set_login_keeps_index_in_step() {
        let folder = folder();
        folder.set_login("bob", "robert").unwrap();

        assert_eq!(folder.name_for_login("robert").as_deref(), Some("bob"));
        assert!(folder.name_for_login("bob").is_none());
        assert!(folder
            .authenticate_credentials(&Credentials::new("robert", "123"))
            .await
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_set_login_conflict_keeps_old_login() {
        let folder = folder();
        let err = folder.set_login("bob", "al").unwrap_err();
        assert!(matches!(err, AuthError::LoginTaken { .. }));
        assert_eq!(folder.get("bob").unwrap().login, "bob");
        assert_eq!(folder.name_for_login("al").as_deref(), Some("alice"));
    }

    #[test]
    fn test_remove_drops_login() {
        let folder = folder();
        folder.remove("alice").unwrap();
        assert!(folder.name_for_login("al").is_none());
        assert!(matches!(folder.remove("alice"), Err(AuthError::UnknownPrincipal { .. })));
    }

    #[test]
    fn test_choose_name() {
        let folder = PrincipalFolder::new("", Arc::new(PlainTextPasswordManager));
        assert_eq!(folder.choose_name(""), "1");
        folder.add("1", "one", "x", "", "").unwrap();
        assert_eq!(folder.choose_name(""), "2");
        assert_eq!(folder.choose_name("bob"), "bob");
        folder.add("bob", "bob", "x", "", "").unwrap();
        assert_eq!(folder.choose_name("bob"), "bob1");
    }

    #[tokio::test]
    async fn test_search_matches_and_paginates() {
        let folder = folder();

        let all: Vec<String> = folder.search(&SearchQuery::text("BUILDER"), None, None).collect().await;
        assert_eq!(all, vec!["users.bob", "users.carol"]);

        let second: Vec<String> = folder
            .search(&SearchQuery::text("builder"), Some(1), Some(1))
            .collect()
            .await;
        assert_eq!(second, vec!["users.carol"]);

        let everyone: Vec<String> = folder.search(&SearchQuery::text(""), None, None).collect().await;
        assert_eq!(everyone.len(), 3);

        let none: Vec<String> = folder.search(&SearchQuery::default(), None, None).collect().await;
        assert!(none.is_empty());
    }
}
