//! Pluggable Authentication
//!
//! An authentication dispatcher that runs ordered lists of named plugins:
//! - Extractors pull credentials out of a request
//! - Authenticators validate credentials and look principals up by id
//! - Principal factories turn principal info into principals, firing
//!   principal-created events that fill in group membership
//! - Challengers issue protocol-coordinated challenges and handle logout
//! - Searchers yield principal ids lazily
//!
//! Dispatchers form a delegation chain. Every id a dispatcher returns starts
//! with its prefix; ids it cannot resolve are handed to the next dispatcher.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod factory;
pub mod password;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod request;
pub mod setup;

pub use dispatcher::{Authentication, PipelineConfig, PluggableAuthentication, PrefixedSearch};
pub use error::{AuthError, Result};
pub use events::{PrincipalCreated, PrincipalCreatedSubscriber, PrincipalEvents, PrincipalSource};
pub use factory::{AnonymousPrincipalFactory, DefaultPrincipalFactory};
pub use password::{
    password_manager, Argon2PasswordManager, PasswordManager, PlainTextPasswordManager, Sha256PasswordManager,
};
pub use plugin::{
    paginate, Authenticator, Challenger, Extractor, PrincipalFactory, PrincipalIdStream, PrincipalSearch,
    SearchQuery, UnauthenticatedPrincipalFactory,
};
pub use registry::{PluginKind, PluginRegistry};
pub use request::{AuthRequest, AuthResponse, InMemorySessionStore, SessionStore};
pub use setup::{build_authentication, AuthenticationSetup, ALREADY_AUTHENTICATED, DEFAULT_FACTORY};

pub use pau_common::{Credentials, Principal, PrincipalInfo};
