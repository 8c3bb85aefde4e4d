//! HTTP transport tests against a server bound to an ephemeral port.

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip_content_replacer::config::Config;
use zip_content_replacer::engine::{EngineSettings, ImportEngine};
use zip_content_replacer::rate_limit::RateLimiter;
use zip_content_replacer::server::{router, AppState, CALLER_HEADER};
use zip_content_replacer_core::models::NewRecord;
use zip_content_replacer_core::session::memory::InMemorySessionStore;
use zip_content_replacer_core::store::memory::InMemoryContentStore;
use zip_content_replacer_core::store::ContentStore;

struct TestServer {
    _tmp: TempDir,
    base: String,
    store: Arc<InMemoryContentStore>,
    story: i64,
    client: reqwest::Client,
}

impl TestServer {
    async fn spawn(max_requests: usize) -> Self {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryContentStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let config = Config::minimal(tmp.path());
        let engine = ImportEngine::new(
            store.clone(),
            sessions,
            EngineSettings::from_config(&config),
        );
        let limiter = RateLimiter::new(max_requests, Duration::from_secs(60));
        let app = router(AppState::new(engine, limiter, 10));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let story = store
            .insert_record(&NewRecord {
                kind: "story".to_string(),
                title: "Story".to_string(),
                slug: "story".to_string(),
                container_id: None,
                body: String::new(),
            })
            .await
            .unwrap();

        Self {
            _tmp: tmp,
            base: format!("http://{}", addr),
            store,
            story,
            client: reqwest::Client::new(),
        }
    }

    async fn chapter(&self, title: &str, body: &str) -> i64 {
        self.store
            .insert_record(&NewRecord {
                kind: "chapter".to_string(),
                title: title.to_string(),
                slug: title.to_lowercase(),
                container_id: Some(self.story),
                body: body.to_string(),
            })
            .await
            .unwrap()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn start(&self, caller: &str, archive: Vec<u8>, fields: &[(&str, &str)]) -> reqwest::Response {
        let mut form = Form::new().part(
            "archive",
            Part::bytes(archive)
                .file_name("upload.zip")
                .mime_str("application/zip")
                .unwrap(),
        );
        form = form.text("scope_id", self.story.to_string());
        for (k, v) in fields {
            form = form.text(k.to_string(), v.to_string());
        }
        self.client
            .post(self.url("/import/start"))
            .header(CALLER_HEADER, caller)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn continue_at(&self, caller: &str, offset: Option<usize>) -> reqwest::Response {
        let body = match offset {
            Some(o) => serde_json::json!({ "offset": o }),
            None => serde_json::json!({}),
        };
        self.client
            .post(self.url("/import/continue"))
            .header(CALLER_HEADER, caller)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn health_needs_no_caller() {
    let srv = TestServer::spawn(20).await;
    let resp = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn missing_caller_is_unauthorized() {
    let srv = TestServer::spawn(20).await;
    let resp = srv
        .client
        .post(srv.url("/import/continue"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(resp).await, "unauthorized");
}

#[tokio::test]
async fn full_run_over_http() {
    let srv = TestServer::spawn(20).await;
    let id = srv.chapter("Alpha", "old").await;
    let archive = zip_bytes(&[
        ("Alpha.txt", b"new alpha"),
        ("notes.pdf", b"%PDF"),
        ("Beta.txt", b"no record"),
    ]);

    let resp = srv
        .start("u1", archive, &[("batch_size", "2"), ("backup", "on")])
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let started: Value = resp.json().await.unwrap();
    assert_eq!(started["total"], 3);
    assert_eq!(started["is_dry_run"], false);

    let resp = srv.continue_at("u1", Some(0)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let batch: Value = resp.json().await.unwrap();
    assert_eq!(batch["processed"], 2);
    assert_eq!(batch["next_offset"], 2);
    assert_eq!(batch["remaining"], 1);
    let levels: Vec<&str> = batch["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["level"].as_str().unwrap())
        .collect();
    assert_eq!(levels, vec!["success", "skip"]);

    let status: Value = srv
        .client
        .get(srv.url("/import/resume"))
        .header(CALLER_HEADER, "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["resumable"], true);
    assert_eq!(status["offset"], 2);

    let batch: Value = srv.continue_at("u1", Some(2)).await.json().await.unwrap();
    assert_eq!(batch["remaining"], 0);
    assert_eq!(batch["processed"], 3);

    // Session is gone after completion.
    let resp = srv.continue_at("u1", None).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "no_session");

    // Backups are visible and restorable.
    let list: Value = srv
        .client
        .get(srv.url("/backups"))
        .header(CALLER_HEADER, "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["backups"][0]["record_id"], id);
    assert_eq!(list["backups"][0]["source_filename"], "Alpha.txt");

    let resp = srv
        .client
        .post(srv.url(&format!("/backups/{}/restore", id)))
        .header(CALLER_HEADER, "u1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        srv.store.get_record(id).await.unwrap().unwrap().body,
        "old"
    );
}

#[tokio::test]
async fn start_rejects_bad_uploads() {
    let srv = TestServer::spawn(20).await;

    let resp = srv.start("u2", b"%PDF-1.7 not a zip".to_vec(), &[]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = srv
        .start("u2", zip_bytes(&[("a.txt", b"x")]), &[("batch_size", "500")])
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = srv
        .start("u2", zip_bytes(&[("a.txt", b"x")]), &[("match_method", "isbn")])
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = srv
        .start("u2", b"PK\x03\x04 but broken".to_vec(), &[])
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(resp).await, "archive_unreadable");
}

#[tokio::test]
async fn backup_routes_validate_ids() {
    let srv = TestServer::spawn(20).await;
    let id = srv.chapter("Gamma", "body").await;

    let resp = srv
        .client
        .post(srv.url(&format!("/backups/{}/restore", id)))
        .header(CALLER_HEADER, "u3")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = srv
        .client
        .delete(srv.url("/backups/abc"))
        .header(CALLER_HEADER, "u3")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = srv
        .client
        .post(srv.url("/backups/restore-all"))
        .header(CALLER_HEADER, "u3")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["succeeded"], 0);
}

#[tokio::test]
async fn callers_are_throttled_independently() {
    let srv = TestServer::spawn(2).await;
    for _ in 0..2 {
        let resp = srv.continue_at("busy", None).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
    let resp = srv.continue_at("busy", None).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp.headers()[reqwest::header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(error_code(resp).await, "throttled");

    let resp = srv.continue_at("calm", None).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn abandon_then_resume_has_no_session() {
    let srv = TestServer::spawn(20).await;
    let resp = srv
        .start("u4", zip_bytes(&[("a.txt", b"1"), ("b.txt", b"2")]), &[("batch_size", "1")])
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = srv
        .client
        .delete(srv.url("/import"))
        .header(CALLER_HEADER, "u4")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["abandoned"], true);

    let resp = srv
        .client
        .post(srv.url("/import/resume"))
        .header(CALLER_HEADER, "u4")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}
