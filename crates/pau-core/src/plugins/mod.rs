//! Bundled plugins: identity sources and credential handlers.

pub mod generic;
pub mod group_folder;
pub mod http;
pub mod principal_folder;
pub mod session;

pub use generic::AlreadyAuthenticatedChallenger;
pub use group_folder::{GroupFolder, GroupInformation, GroupMembershipSubscriber};
pub use http::{BasicAuthPlugin, HTTP_AUTH_PROTOCOL};
pub use principal_folder::{InternalPrincipal, PrincipalFolder};
pub use session::SessionCredentialsPlugin;
