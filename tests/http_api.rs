//! End-to-end tests for the HTTP API.
//!
//! Each test starts a real server on a free port with a temporary SQLite
//! database and the fakes from `common`, then drives it with `reqwest`.

mod common;

use std::sync::Arc;

use common::{test_config, LetterEmbedder, RecordingModel};
use ragdesk::answer::NO_CONTEXT_ANSWER;
use ragdesk::app::AppServices;
use ragdesk::auth::{RoleList, TokenIssuer};
use ragdesk::{db, migrate, server};
use serde_json::{json, Value};
use tempfile::TempDir;

const COOKIE: &str = "jwt_personal_session_token";

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

struct TestServer {
    base: String,
    services: Arc<AppServices>,
    model: Arc<RecordingModel>,
    client: reqwest::Client,
    _tmp: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let port = find_free_port();
        let config = test_config(&tmp, port);

        let pool = db::connect(&config).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();

        let model = Arc::new(RecordingModel::replying("grounded reply"));
        let services = Arc::new(
            AppServices::assemble(
                &config,
                pool,
                Arc::new(LetterEmbedder::new()),
                model.clone(),
                TokenIssuer::new("integration-test-secret", 600),
            )
            .unwrap(),
        );

        let bind = config.server.bind.clone();
        let serving = services.clone();
        tokio::spawn(async move {
            let _ = server::serve(serving, &bind).await;
        });
        wait_for_server(port).await;

        Self {
            base: format!("http://127.0.0.1:{}", port),
            services,
            model,
            client: reqwest::Client::new(),
            _tmp: tmp,
        }
    }

    async fn post(&self, path: &str, body: Value, session: Option<&str>) -> reqwest::Response {
        let mut req = self.client.post(format!("{}{}", self.base, path)).json(&body);
        if let Some(token) = session {
            req = req.header("cookie", format!("{}={}", COOKIE, token));
        }
        req.send().await.unwrap()
    }

    async fn register(&self, username: &str, password: &str) {
        let resp = self
            .post(
                "/auth/register",
                json!({ "username": username, "password": password, "password_repeat": password }),
                None,
            )
            .await;
        assert_eq!(resp.status(), 200);
    }

    async fn make_admin(&self, username: &str) {
        self.services
            .users
            .update_roles(username, RoleList::parse(["admin", "user"]).unwrap())
            .await
            .unwrap();
    }

    /// Log in and return the session token from the `Set-Cookie` header.
    async fn login(&self, username: &str, password: &str) -> String {
        let resp = self
            .post(
                "/auth/login",
                json!({ "username": username, "password": password }),
                None,
            )
            .await;
        assert_eq!(resp.status(), 200);
        let cookie = resp
            .headers()
            .get("set-cookie")
            .expect("login sets a cookie")
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.contains("HttpOnly"));
        let pair = cookie.split(';').next().unwrap();
        let (name, token) = pair.split_once('=').unwrap();
        assert_eq!(name, COOKIE);
        token.to_string()
    }
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_empty_store() {
    let srv = TestServer::start().await;
    let body: Value = srv
        .client
        .get(format!("{}/health", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["records"], 0);
}

#[tokio::test]
async fn test_register_password_mismatch_creates_nothing() {
    let srv = TestServer::start().await;
    let resp = srv
        .post(
            "/auth/register",
            json!({ "username": "dora", "password": "one", "password_repeat": "two" }),
            None,
        )
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "password_mismatch");
    assert_eq!(srv.services.users.count().await.unwrap(), 0);

    let resp = srv
        .post("/auth/login", json!({ "username": "dora", "password": "one" }), None)
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let srv = TestServer::start().await;
    srv.register("erin", "pw").await;
    let resp = srv
        .post(
            "/auth/register",
            json!({ "username": "erin", "password": "pw", "password_repeat": "pw" }),
            None,
        )
        .await;
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let srv = TestServer::start().await;
    srv.register("finn", "right").await;
    let resp = srv
        .post("/auth/login", json!({ "username": "finn", "password": "wrong" }), None)
        .await;
    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "invalid_credentials");
}

#[tokio::test]
async fn test_missing_or_forged_session_unauthorized() {
    let srv = TestServer::start().await;
    let resp = srv.post("/llm/ask", json!({ "text": "hi" }), None).await;
    assert_eq!(resp.status(), 401);

    let resp = srv
        .post("/llm/ask", json!({ "text": "hi" }), Some("not.a.token"))
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_user_cannot_embed_but_can_ask() {
    let srv = TestServer::start().await;
    srv.register("gus", "pw").await;
    let token = srv.login("gus", "pw").await;

    let resp = srv
        .post("/llm/embed", json!({ "text": "secret plans" }), Some(&token))
        .await;
    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "unauthorized");
    assert_eq!(srv.services.retriever.store().count().await.unwrap(), 0);

    let resp = srv
        .post("/llm/ask", json!({ "text": "what are the plans?" }), Some(&token))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], NO_CONTEXT_ANSWER);
    assert_eq!(body["context_used"], json!([]));
    assert_eq!(srv.model.calls(), 0);
}

#[tokio::test]
async fn test_admin_embed_then_ask() {
    let srv = TestServer::start().await;
    srv.register("hana", "pw").await;
    srv.make_admin("hana").await;
    let token = srv.login("hana", "pw").await;

    let text = "The library opens at nine in the morning. \
                Books can be borrowed for three weeks at a time.";
    let resp = srv
        .post("/llm/embed", json!({ "text": text }), Some(&token))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    let added = body["chunks_added_counts"].as_u64().unwrap();
    assert!(added >= 2);

    let resp = srv
        .post("/llm/ask", json!({ "text": "When does the library open?" }), Some(&token))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "grounded reply");
    assert_eq!(body["context_used"].as_array().unwrap().len(), 2);
    assert_eq!(srv.model.calls(), 1);
}

#[tokio::test]
async fn test_empty_text_rejected() {
    let srv = TestServer::start().await;
    srv.register("ivy", "pw").await;
    srv.make_admin("ivy").await;
    let token = srv.login("ivy", "pw").await;

    let resp = srv
        .post("/llm/embed", json!({ "text": "   " }), Some(&token))
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");
}

#[tokio::test]
async fn test_update_roles() {
    let srv = TestServer::start().await;
    srv.register("root", "pw").await;
    srv.make_admin("root").await;
    srv.register("jo", "pw").await;
    let admin = srv.login("root", "pw").await;

    let resp = srv
        .post(
            "/auth/roles",
            json!({ "username": "jo", "roles": ["admin", " user "] }),
            Some(&admin),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["new_roles"], json!(["admin", "user"]));

    let user = srv.services.users.find("jo").await.unwrap().unwrap();
    assert_eq!(user.roles, vec!["admin", "user"]);

    let resp = srv
        .post(
            "/auth/roles",
            json!({ "username": "nobody", "roles": ["user"] }),
            Some(&admin),
        )
        .await;
    assert_eq!(resp.status(), 404);

    // A plain user may not change roles.
    srv.services
        .users
        .update_roles("jo", RoleList::parse(["user"]).unwrap())
        .await
        .unwrap();
    let jo = srv.login("jo", "pw").await;
    let resp = srv
        .post(
            "/auth/roles",
            json!({ "username": "jo", "roles": ["admin"] }),
            Some(&jo),
        )
        .await;
    assert_eq!(resp.status(), 401);
}
