//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bootcamp_api::config::AppConfig;
use bootcamp_api::db::Database;
use bootcamp_api::http::HttpServer;
use bootcamp_api::lifecycle::{FailureGuard, Shutdown, ShutdownReason};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const INDEX_HTML: &str = "<!DOCTYPE html><title>bootcamps</title>";

/// A server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub guard: FailureGuard,
    pub handle: JoinHandle<std::io::Result<ShutdownReason>>,
    pub public: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Build configuration from `vars` the way the env loader would.
pub fn config_from(vars: &[(&str, &str)]) -> AppConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
}

/// Start a server on 127.0.0.1 with a scratch public directory.
pub async fn spawn_server(vars: &[(&str, &str)]) -> TestServer {
    spawn_server_with_db(vars, Database::in_memory()).await
}

/// Like [`spawn_server`], backed by `db`.
pub async fn spawn_server_with_db(vars: &[(&str, &str)], db: Database) -> TestServer {
    let public = tempfile::tempdir().expect("tempdir");
    std::fs::write(public.path().join("index.html"), INDEX_HTML).expect("write index");

    let mut config = config_from(vars);
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.shutdown_timeout_secs = 2;
    config.server.public_dir = public.path().display().to_string();
    config.upload.path = public.path().join("uploads").display().to_string();

    let listener = TcpListener::bind(config.server.bind_address())
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, db, shutdown.clone());
    let guard = server.guard();
    let handle = tokio::spawn(server.run(listener));

    TestServer {
        addr,
        shutdown,
        guard,
        handle,
        public,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client")
}

/// Register a user with `role` and return its bearer token.
pub async fn register(server: &TestServer, client: &reqwest::Client, email: &str, role: &str) -> String {
    let res = client
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({"name": "Test User", "email": email, "password": "123456", "role": role}))
        .send()
        .await
        .expect("register request");
    assert_eq!(res.status(), 200, "register {}", email);
    let body: Value = res.json().await.expect("register body");
    body["token"].as_str().expect("token").to_string()
}

/// Create a bootcamp as the holder of `token` and return its id.
pub async fn create_bootcamp(
    server: &TestServer,
    client: &reqwest::Client,
    token: &str,
    name: &str,
) -> String {
    let res = client
        .post(server.url("/api/v1/bootcamps"))
        .bearer_auth(token)
        .json(&json!({"name": name, "description": "Full stack web development"}))
        .send()
        .await
        .expect("create bootcamp request");
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.expect("bootcamp body");
    body["data"]["_id"].as_str().expect("bootcamp id").to_string()
}
