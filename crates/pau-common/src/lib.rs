use serde::{Deserialize, Serialize};
use std::fmt;

pub mod logging;

// ============================================================================
// Principal Types
// ============================================================================

/// Information an identity source returns about one of its principals.
///
/// The `id` is local to the source that produced it. The dispatcher adds its
/// own prefix before a principal leaves the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalInfo {
    pub id: String,
    pub login: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl PrincipalInfo {
    pub fn new(
        id: impl Into<String>,
        login: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            login: login.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// A group-aware principal materialized for a single request or lookup.
///
/// `groups` starts empty and is filled by principal-created subscribers.
/// It is recomputed every time a principal is created and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            groups: Vec::new(),
        }
    }

    /// Add a group id unless it is already present, keeping insertion order.
    pub fn add_group(&mut self, group_id: impl Into<String>) {
        let group_id = group_id.into();
        if !self.groups.contains(&group_id) {
            self.groups.push(group_id);
        }
    }

    pub fn in_group(&self, group_id: &str) -> bool {
        self.groups.iter().any(|g| g == group_id)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Login/password credentials pulled out of a request by an extractor.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}
