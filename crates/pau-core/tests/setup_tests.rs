//! End-to-end tests over a chain assembled from TOML configuration.

use base64::{engine::general_purpose::STANDARD, Engine};
use futures::StreamExt;

use pau_config::AppConfig;
use pau_core::{
    build_authentication, AuthError, ALREADY_AUTHENTICATED, AuthRequest, AuthResponse, AuthenticationSetup, PrincipalSearch, SearchQuery,
    SessionStore,
};

fn setup() -> AuthenticationSetup {
    let config = AppConfig::from_toml(&AppConfig::example_toml()).unwrap();
    build_authentication(&config).unwrap()
}

fn basic(login: &str, password: &str) -> AuthRequest {
    AuthRequest::new("http://127.0.0.1/private")
        .with_header("Authorization", format!("Basic {}", STANDARD.encode(format!("{login}:{password}"))))
}

#[tokio::test]
async fn test_basic_auth_login_with_groups() {
    let setup = setup();

    let bob = setup.authentication.authenticate(&basic("bob", "secret")).await.unwrap().unwrap();
    assert_eq!(bob.id, "site.users.bob");
    assert_eq!(bob.title, "Bob");
    assert_eq!(bob.groups, vec!["site.groups.staff"]);

    assert!(setup
        .authentication
        .authenticate(&basic("bob", "wrong"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_session_login_is_remembered() {
    let setup = setup();

    let login = AuthRequest::new("http://127.0.0.1/login")
        .with_session("abc")
        .with_form_field("login", "bob")
        .with_form_field("password", "secret");
    let principal = setup.authentication.authenticate(&login).await.unwrap().unwrap();
    assert_eq!(principal.id, "site.users.bob");

    let later = AuthRequest::new("http://127.0.0.1/page").with_session("abc");
    assert!(setup.authentication.authenticate(&later).await.unwrap().is_some());

    let mut response = AuthResponse::new();
    setup.authentication.logout(&later, &mut response).await.unwrap();
    assert!(setup.session_store.load_credentials("abc").await.unwrap().is_none());
    assert!(setup.authentication.authenticate(&later).await.unwrap().is_none());
}

#[tokio::test]
async fn test_lookup_walks_the_chain() {
    let setup = setup();

    let staff = setup.authentication.get_principal("site.groups.staff").await.unwrap();
    assert_eq!(staff.title, "Staff");

    let manager = setup.authentication.get_principal("zope.manager").await.unwrap();
    assert_eq!(manager.id, "zope.manager");
    assert_eq!(manager.title, "Manager");

    assert!(matches!(
        setup.authentication.get_principal("site.users.nobody").await,
        Err(AuthError::PrincipalNotFound { .. })
    ));
}

#[tokio::test]
async fn test_admins_do_not_authenticate_at_the_site() {
    let setup = setup();
    assert!(setup
        .authentication
        .authenticate(&basic("admin", "admin"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_challenge_redirects_to_login_form() {
    let setup = setup();
    let mut response = AuthResponse::new();

    setup
        .authentication
        .unauthorized(None, &AuthRequest::new("http://127.0.0.1/private"), &mut response)
        .await
        .unwrap();

    assert_eq!(response.status(), Some(302));
    assert_eq!(
        response.location(),
        Some("http://127.0.0.1/@@loginForm.html?camefrom=http%3A%2F%2F127.0.0.1%2Fprivate")
    );
    assert!(response.header("WWW-Authenticate").is_none());
}

#[tokio::test]
async fn test_anonymous_visitor_is_challenged_but_member_is_not() {
    let setup = setup();
    let auth = &setup.authentication;
    let mut pipeline = auth.pipeline();
    pipeline.challengers.insert(0, ALREADY_AUTHENTICATED.to_string());
    auth.set_pipeline(pipeline);

    let anybody = auth.unauthenticated_principal().unwrap();
    let visitor = AuthRequest::new("http://127.0.0.1/private").with_unauthenticated_principal(anybody);
    let mut response = AuthResponse::new();
    auth.unauthorized(None, &visitor, &mut response).await.unwrap();
    assert_eq!(response.status(), Some(302));

    let bob = auth.authenticate(&basic("bob", "secret")).await.unwrap().unwrap();
    let member = AuthRequest::new("http://127.0.0.1/private").with_principal(bob);
    let mut response = AuthResponse::new();
    auth.unauthorized(None, &member, &mut response).await.unwrap();
    assert!(response.status().is_none());
    assert!(response.location().is_none());
}

#[tokio::test]
async fn test_search_through_queriables() {
    let setup = setup();

    let mut found = Vec::new();
    for (_, searcher) in setup.authentication.get_queriables() {
        let ids: Vec<String> = searcher.search(&SearchQuery::text("staff"), None, None).collect().await;
        found.extend(ids);
    }
    assert_eq!(found, vec!["site.groups.staff"]);

    let (name, users) = setup.authentication.get_queriables().next().unwrap();
    assert_eq!(name, "users");
    let ids: Vec<String> = users.search(&SearchQuery::text("bob"), None, None).collect().await;
    assert_eq!(ids, vec!["site.users.bob"]);
}

#[tokio::test]
async fn test_anonymous_principal_from_config() {
    let setup = setup();
    let anonymous = setup.authentication.unauthenticated_principal().unwrap();
    assert_eq!(anonymous.id, "pau.anybody");
}

#[tokio::test]
async fn test_runtime_folder_changes_are_visible() {
    let setup = setup();
    let users = setup.principal_folder("users").unwrap();
    let name = users.choose_name("alice");
    users.add(&name, "alice", "pw", "Alice", "").unwrap();

    let alice = setup.authentication.authenticate(&basic("alice", "pw")).await.unwrap().unwrap();
    assert_eq!(alice.id, "site.users.alice");
    assert!(alice.groups.is_empty());

    setup
        .group_folder("groups")
        .unwrap()
        .add_principal_to_group("staff", "site.users.alice")
        .unwrap();
    let alice = setup.authentication.get_principal("site.users.alice").await.unwrap();
    assert_eq!(alice.groups, vec!["site.groups.staff"]);
}
