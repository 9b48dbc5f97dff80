//! Assembly of a dispatcher chain from `AppConfig`.

use indexmap::IndexMap;
pub use pau_config::{ALREADY_AUTHENTICATED, DEFAULT_FACTORY};

use pau_config::{AppConfig, DispatcherConfig, GroupFolderConfig, PrincipalFolderConfig};
use std::sync::Arc;
use tracing::info;

use crate::dispatcher::{Authentication, PipelineConfig, PluggableAuthentication};
use crate::error::{AuthError, Result};
use crate::factory::{AnonymousPrincipalFactory, DefaultPrincipalFactory};
use crate::password::password_manager;
use crate::plugins::{
    AlreadyAuthenticatedChallenger, BasicAuthPlugin, GroupFolder, GroupInformation, GroupMembershipSubscriber,
    InternalPrincipal, PrincipalFolder, SessionCredentialsPlugin,
};
use crate::registry::PluginRegistry;
use crate::request::InMemorySessionStore;

/// A built chain plus handles to the plugins it was assembled from
pub struct AuthenticationSetup {
    pub registry: Arc<PluginRegistry>,
    /// Innermost dispatcher, the one requests enter
    pub authentication: Arc<PluggableAuthentication>,
    pub principal_folders: IndexMap<String, Arc<PrincipalFolder>>,
    pub group_folders: IndexMap<String, Arc<GroupFolder>>,
    pub session_store: Arc<InMemorySessionStore>,
    pub default_factory: Arc<DefaultPrincipalFactory>,
}

impl AuthenticationSetup {
    pub fn principal_folder(&self, name: &str) -> Option<&Arc<PrincipalFolder>> {
        self.principal_folders.get(name)
    }

    pub fn group_folder(&self, name: &str) -> Option<&Arc<GroupFolder>> {
        self.group_folders.get(name)
    }
}

/// Validate `config`, register every configured plugin in a root registry
/// and build the dispatcher chain on top of it.
pub fn build_authentication(config: &AppConfig) -> Result<AuthenticationSetup> {
    config.validate()?;

    let registry = Arc::new(PluginRegistry::new());
    let chain: Vec<&DispatcherConfig> = config.authentication.chain().collect();

    let mut principal_folders = IndexMap::new();
    for folder_config in &config.principal_folders {
        let folder = Arc::new(build_principal_folder(folder_config)?);
        registry.register_authenticator(&folder_config.name, folder.clone());
        registry.register_searcher(&folder_config.name, folder.clone());
        principal_folders.insert(folder_config.name.clone(), folder);
    }

    let mut group_folders = IndexMap::new();
    for folder_config in &config.group_folders {
        let owner_prefix = owner_prefix(&chain, &folder_config.name);
        let folder = Arc::new(build_group_folder(folder_config, owner_prefix)?);
        registry.register_authenticator(&folder_config.name, folder.clone());
        registry.register_searcher(&folder_config.name, folder.clone());
        group_folders.insert(folder_config.name.clone(), folder);
    }

    for basic in &config.basic_auth {
        let plugin = Arc::new(BasicAuthPlugin::new(&basic.realm));
        registry.register_extractor(&basic.name, plugin.clone());
        registry.register_challenger(&basic.name, plugin);
    }

    let session_store = Arc::new(InMemorySessionStore::new());
    for session in &config.session_credentials {
        let plugin = Arc::new(SessionCredentialsPlugin::from_config(session_store.clone(), session));
        registry.register_extractor(&session.name, plugin.clone());
        registry.register_challenger(&session.name, plugin);
    }

    registry.register_challenger(ALREADY_AUTHENTICATED, Arc::new(AlreadyAuthenticatedChallenger));

    if let Some(anonymous) = &config.anonymous {
        registry.set_unauthenticated_factory(Arc::new(AnonymousPrincipalFactory::new(
            &anonymous.id,
            &anonymous.title,
            &anonymous.description,
        )));
    }

    let default_factory = Arc::new(DefaultPrincipalFactory::new());
    if !group_folders.is_empty() {
        let subscriber = GroupMembershipSubscriber::new(group_folders.values().cloned().collect());
        default_factory.subscribe(Arc::new(subscriber));
    }
    registry.register_factory(DEFAULT_FACTORY, default_factory.clone());

    let authentication = build_chain(&registry, &chain)?;

    info!(
        dispatchers = chain.len(),
        principal_folders = principal_folders.len(),
        group_folders = group_folders.len(),
        prefix = %authentication.prefix(),
        "Authentication chain assembled"
    );

    Ok(AuthenticationSetup {
        registry,
        authentication,
        principal_folders,
        group_folders,
        session_store,
        default_factory,
    })
}

/// Dispatchers are created root-most first so each can hold its successor.
fn build_chain(registry: &Arc<PluginRegistry>, chain: &[&DispatcherConfig]) -> Result<Arc<PluggableAuthentication>> {
    let mut current: Option<Arc<PluggableAuthentication>> = None;

    for level in chain.iter().rev() {
        let scope = Arc::new(PluginRegistry::child(Arc::clone(registry)));
        let mut dispatcher = PluggableAuthentication::new(&level.prefix, scope).with_pipeline(PipelineConfig::from(*level));
        if let Some(next) = current.take() {
            dispatcher = dispatcher.with_next(next as Arc<dyn Authentication>);
        }
        current = Some(Arc::new(dispatcher));
    }

    current.ok_or_else(|| AuthError::config("Authentication chain is empty"))
}

/// Prefix of the first dispatcher naming `folder` among its authenticators
/// or searchers; group ids are qualified with it.
fn owner_prefix<'a>(chain: &[&'a DispatcherConfig], folder: &str) -> &'a str {
    chain
        .iter()
        .find(|level| {
            level.authenticators.iter().any(|name| name == folder) || level.searchers.iter().any(|name| name == folder)
        })
        .map(|level| level.prefix.as_str())
        .unwrap_or("")
}

fn build_principal_folder(config: &PrincipalFolderConfig) -> Result<PrincipalFolder> {
    let folder = PrincipalFolder::new(&config.prefix, password_manager(&config.password_manager)?);

    for entry in &config.principals {
        match (&entry.password, &entry.password_hash) {
            (Some(password), _) => folder.add(&entry.id, &entry.login, password, &entry.title, &entry.description)?,
            (None, Some(hash)) => folder.add_with_encoded_password(
                &entry.id,
                InternalPrincipal::new(&entry.login, hash, &entry.title, &entry.description),
            )?,
            (None, None) => {
                return Err(AuthError::config(format!("Principal '{}' has no password", entry.id)));
            }
        }
    }

    Ok(folder)
}

fn build_group_folder(config: &GroupFolderConfig, owner_prefix: &str) -> Result<GroupFolder> {
    let folder = GroupFolder::new(&config.prefix).with_owner_prefix(owner_prefix);

    for entry in &config.groups {
        let group = GroupInformation::new(&entry.title, &entry.description).with_principals(entry.principals.iter().cloned());
        folder.add_group(&entry.id, group)?;
    }

    Ok(folder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginKind;

    #[test]
    fn test_owner_prefix_follows_first_naming_dispatcher() {
        let config = AppConfig::from_toml(&AppConfig::example_toml()).unwrap();
        let chain: Vec<&DispatcherConfig> = config.authentication.chain().collect();

        assert_eq!(owner_prefix(&chain, "groups"), "site.");
        assert_eq!(owner_prefix(&chain, "admins"), "");
        assert_eq!(owner_prefix(&chain, "unnamed"), "");
    }

    #[test]
    fn test_example_registers_plugins() {
        let config = AppConfig::from_toml(&AppConfig::example_toml()).unwrap();
        let setup = build_authentication(&config).unwrap();

        assert!(setup.registry.contains(PluginKind::Authenticator, "users"));
        assert!(setup.registry.contains(PluginKind::Searcher, "groups"));
        assert!(setup.registry.contains(PluginKind::Extractor, "basic"));
        assert!(setup.registry.contains(PluginKind::Challenger, "session"));
        assert!(setup.registry.contains(PluginKind::Challenger, ALREADY_AUTHENTICATED));
        assert!(setup.registry.contains(PluginKind::Factory, DEFAULT_FACTORY));

        assert_eq!(setup.authentication.prefix(), "site.");
        assert!(setup.authentication.next().is_some());
        assert_eq!(setup.group_folder("groups").unwrap().owner_prefix(), "site.");
        assert_eq!(setup.default_factory.events().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AppConfig::from_toml(
            r#"
[[principal_folders]]
name = "users"
password_manager = "rot13"
"#,
        )
        .unwrap();
        assert!(matches!(build_authentication(&config), Err(AuthError::ConfigLoad(_))));
    }

    #[test]
    fn test_plugin_cannot_take_a_built_in_name() {
        let config = AppConfig::from_toml(
            r#"
[[session_credentials]]
name = "already-authenticated"
"#,
        )
        .unwrap();
        assert!(matches!(build_authentication(&config), Err(AuthError::ConfigLoad(_))));
    }
}
