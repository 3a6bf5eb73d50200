//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use account_service::api::build_routes;
use account_service::config::AppConfig;
use account_service::http::ElegantRouter;
use account_service::lifecycle::{Components, Shutdown};
use account_service::observability::RecordingSink;
use account_service::HttpServer;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const API_KEY: &str = "integration-key";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret-0123".to_string();
    config.auth.api_keys = vec![API_KEY.to_string()];
    config.auth.admin_usernames = vec!["admin".to_string()];
    config.server.request_timeout_secs = 5;
    config
}

/// A running server on an ephemeral port.
pub struct TestApp {
    pub addr: SocketAddr,
    pub components: Components,
    pub sink: Arc<RecordingSink>,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Value {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap().json().await.unwrap()
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> Value {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap().json().await.unwrap()
    }

    pub async fn register(&self, username: &str, email: &str) -> Value {
        self.post_json(
            "/api/v1/user/register",
            json!({ "username": username, "password": "secret1", "email": email }),
            None,
        )
        .await
    }

    /// Register (if needed) and log in, returning the token.
    pub async fn login(&self, username: &str, email: &str) -> String {
        self.register(username, email).await;
        let body = self
            .post_json(
                "/api/v1/user/login",
                json!({ "username": username, "password": "secret1" }),
                None,
            )
            .await;
        assert_eq!(body["code"], 0, "login failed: {body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), |_| {}).await
}

/// Spawn the full stack, letting the caller add routes to the table.
pub async fn spawn_app_with<F>(config: AppConfig, extra: F) -> TestApp
where
    F: FnOnce(&mut ElegantRouter),
{
    let components = Components::from_config(&config);
    let sink = Arc::new(RecordingSink::new());

    let shutdown = Shutdown::new();
    let mut routes = build_routes(&components.api);
    extra(&mut routes);

    let server = HttpServer::with_routes(
        config.server.clone(),
        routes,
        sink.clone(),
        shutdown.context_root(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    TestApp {
        addr,
        components,
        sink,
        client,
        shutdown,
    }
}
