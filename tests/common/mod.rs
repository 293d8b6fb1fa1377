#![allow(dead_code)]

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use protocol_api::app::{router, AppState};
use protocol_api::config::AppConfig;
use protocol_api::database::models::Role;
use protocol_api::database::DatabaseManager;
use protocol_api::services::AuthService;

/// An API server on a free local port, backed by its own in-memory database
pub struct TestServer {
    pub base_url: String,
    pub pool: SqlitePool,
    config: AppConfig,
    client: reqwest::Client,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.bcrypt_cost = 4;
    config.api.enable_request_logging = false;
    config
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::start_with(test_config()).await
    }

    pub async fn start_with(config: AppConfig) -> Result<Self> {
        let db = DatabaseManager::in_memory().await.context("in-memory database")?;
        let pool = db.pool().clone();

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;

        let app = router(AppState::new(pool.clone(), config.clone()));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://127.0.0.1:{}", port),
            pool,
            config,
            client: reqwest::Client::new(),
        })
    }

    /// Send a request and return the status with the parsed JSON body
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut req = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let res = req.send().await.with_context(|| format!("request to {} failed", path))?;
        let status = res.status();
        let text = res.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).with_context(|| format!("non-JSON body from {}: {}", path, text))?
        };
        Ok((status, body))
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, path, Some(token), Some(body)).await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::PUT, path, Some(token), Some(body)).await
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::PATCH, path, Some(token), Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.request(Method::DELETE, path, Some(token), None).await
    }

    /// Register through the API and return an access token
    pub async fn register_and_login(&self, username: &str) -> Result<String> {
        let credentials = json!({ "username": username, "password": "password123" });
        let (status, body) = self
            .request(Method::POST, "/auth/register", None, Some(credentials.clone()))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {}", body);
        self.login(username).await
    }

    /// Provision an admin directly and return an access token
    pub async fn admin(&self, username: &str) -> Result<String> {
        AuthService::new(self.pool.clone(), self.config.security.clone())
            .create_user(username, "password123", Role::Admin)
            .await?;
        self.login(username).await
    }

    pub async fn login(&self, username: &str) -> Result<String> {
        let (status, body) = self
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": username, "password": "password123" })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {}", body);
        body["data"]["access_token"]
            .as_str()
            .map(str::to_string)
            .context("missing access_token")
    }

    /// Create a catalog record and return its id
    pub async fn create(&self, token: &str, entity: &str, name: &str) -> Result<i64> {
        let (status, body) = self
            .post(&format!("/api/{}", entity), token, json!({ "name": name }))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create {} failed: {}", entity, body);
        body["data"]["id"].as_i64().context("missing id")
    }

    /// `(child_id, order_index)` pairs of a parent, in order
    pub async fn order(&self, token: &str, path: &str) -> Result<Vec<(i64, i64)>> {
        let (status, body) = self.get(path, token).await?;
        anyhow::ensure!(status == StatusCode::OK, "list failed: {}", body);
        let rows = body["data"].as_array().context("data is not an array")?;
        Ok(rows
            .iter()
            .map(|m| (m["child_id"].as_i64().unwrap_or(-1), m["order_index"].as_i64().unwrap_or(-1)))
            .collect())
    }
}

pub fn error_kind(body: &Value) -> &str {
    body["error"]["kind"].as_str().unwrap_or_default()
}
