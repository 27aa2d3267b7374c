#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cadre_api::app::{self, AppState};
use cadre_api::auth::{generate_jwt, Claims};
use cadre_api::database::seed::{demo_catalog, DemoCatalog};
use cadre_api::database::MemoryStore;
use cadre_api::types::Role;
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

/// In-process server over a fresh in-memory store seeded with the demo catalog.
/// The server task lives as long as the test's runtime.
pub struct TestServer {
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub demo: DemoCatalog,
    client: reqwest::Client,
}

pub async fn spawn_server() -> Result<TestServer> {
    let store = Arc::new(MemoryStore::new());
    let demo = demo_catalog(&store).await;

    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind test listener")?;
    let router = app::router(AppState::new(store.clone()));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let server = TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        store,
        demo,
        client: reqwest::Client::new(),
    };
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

impl TestServer {
    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn token(&self, user_id: Uuid, role: Role) -> String {
        generate_jwt(&Claims::new(user_id, None, role)).expect("token")
    }

    pub fn learner_token(&self) -> String {
        self.token(self.demo.learner_id, Role::Learner)
    }

    pub fn admin_token(&self) -> String {
        self.token(self.demo.admin_id, Role::Admin)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await?;
        let status = res.status();
        Ok((status, res.json().await?))
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        Ok((status, res.json().await?))
    }

    /// Answers for `key`, the first `correct` of them right and the rest wrong
    pub fn answers(key: &[(Uuid, i32)], correct: usize) -> Value {
        let answers: Vec<Value> = key
            .iter()
            .enumerate()
            .map(|(i, (question_id, right))| {
                let selected = if i < correct { *right } else { (right + 1) % 4 };
                serde_json::json!({ "question_id": question_id, "selected_option_index": selected })
            })
            .collect();
        Value::Array(answers)
    }
}
