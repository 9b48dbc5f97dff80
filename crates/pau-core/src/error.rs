//! Authentication Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Lookup exhausted the delegation chain without a match
    #[error("Principal not found: {id}")]
    PrincipalNotFound { id: String },

    #[error("Principal login already taken: {login}")]
    LoginTaken { login: String },

    #[error("Duplicate {entity_type} id: {id}")]
    DuplicateId { entity_type: String, id: String },

    #[error("Principal not found in folder: {name}")]
    UnknownPrincipal { name: String },

    #[error("Group not found: {id}")]
    GroupNotFound { id: String },

    #[error("Group cycle detected at {group_id} via {path:?}")]
    GroupCycle { group_id: String, path: Vec<String> },

    #[error("Invalid group id: {id}")]
    InvalidGroupId { id: String },

    #[error("Session store error: {message}")]
    Session { message: String },

    #[error("Password error: {message}")]
    Password { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    ConfigLoad(#[from] pau_config::ConfigError),
}

impl AuthError {
    pub fn principal_not_found(id: impl Into<String>) -> Self {
        Self::PrincipalNotFound { id: id.into() }
    }

    pub fn duplicate(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session { message: message.into() }
    }

    pub fn password(message: impl Into<String>) -> Self {
        Self::Password { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
