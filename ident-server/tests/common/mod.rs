//! Shared fixture for the HTTP integration tests: one in-memory server per
//! test, bound to an ephemeral port.

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use chrono::Utc;
use tokio::net::TcpListener;

pub use ident_client::{JwksClient, Verifier, VerifyError};
pub use ident_server::{App, AppConfig, PRIVATE_CACHE_CONTROL};
pub use ident_storage::{
    key::Keys,
    user::{ListParams, Role, User},
    Interface, List,
};
pub use reqwest::{header, StatusCode};

use ident_server::{services::setup, AppRouter, AppState, Store};

pub const OWNER_EMAIL: &str = "jbloggs@example.com";

pub struct TestServer {
    pub addr: SocketAddr,
    pub app: Arc<App>,
    pub owner: User,
    pub editor: User,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut AppConfig)) -> Self {
        // serde defaults only, so the environment cannot leak in
        let mut config: AppConfig = toml::from_str("").unwrap();
        configure(&mut config);

        let app = Arc::new(App::new(Store::memory(), config).unwrap());
        setup::ensure_owner(&app.store.user, OWNER_EMAIL, "Joe Bloggs")
            .await
            .unwrap();
        app.key_rotator.rotate().await.unwrap();

        let owner = Self::find(&app, Role::Owner).await;
        let editor = User {
            id: "editor-1".to_owned(),
            name: "Eddie".to_owned(),
            email: "editor@example.com".to_owned(),
            role: Role::Editor,
            ..Default::default()
        };
        app.store.user.put(&editor).await.unwrap();

        let router = AppRouter::build(AppState(Arc::clone(&app))).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            addr,
            app,
            owner,
            editor,
        }
    }

    async fn find(app: &App, role: Role) -> User {
        let mut list = List::default();
        app.store
            .user
            .list(
                &ListParams {
                    role: Some(role),
                    ..Default::default()
                },
                &mut list,
            )
            .await
            .unwrap();
        list.data.remove(0)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    pub async fn session(&self, user: &User) -> String {
        self.app.session_token(user).await.unwrap().0
    }

    /// A verifier with an empty cache, as a fresh relying party would have.
    pub fn verifier(&self) -> Verifier {
        Verifier::new(JwksClient::new(self.url("/.well-known/jwks.json")))
            .with_issuer(self.app.config.endpoint.as_str())
    }

    pub async fn identities(&self, user: &User) -> reqwest::Response {
        self.client()
            .get(self.url("/v1/identities/"))
            .bearer_auth(self.session(user).await)
            .send()
            .await
            .unwrap()
    }

    /// Tokens of the owner's identities, in response order.
    pub async fn owner_tokens(&self) -> Vec<String> {
        let body: serde_json::Value =
            self.identities(&self.owner).await.json().await.unwrap();
        body["identities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["token"].as_str().unwrap().to_owned())
            .collect()
    }

    pub async fn keys(&self) -> Keys {
        let mut list = List::default();
        self.app.store.key.list(&(), &mut list).await.unwrap();
        list.data.remove(0)
    }

    /// Makes the current key due and runs the rotator.
    pub async fn force_rotation(&self) {
        let mut keys = self.keys().await;
        keys.next_rotation = Utc::now().timestamp() - 1;
        self.app.store.key.put(&keys).await.unwrap();
        self.app.key_rotator.rotate().await.unwrap();
    }
}
