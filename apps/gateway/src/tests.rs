use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::auth::{AppMetadata, Claims};
use crate::routes::build_router;
use crate::state::AppState;
use vox_core::{
    AsrConfig, BlobConfig, DbConfig, ModelKeys, NEW_DOCUMENT_STREAM, NEW_MESSAGE_STREAM, Settings,
};
use vox_db::{AgentStatus, Database, DocumentStatus, MemoryDatabase, NewAgent};
use vox_dlq::PersistentEntry;
use vox_storage::MemoryBlobStore;
use vox_stream::MemoryStreamStore;

const SECRET: &str = "test-secret";

fn test_settings(api_rate_limit: u32, knowledge_pdf_enabled: bool) -> Settings {
    Settings {
        redis_url: "redis://unused".into(),
        blob: BlobConfig {
            endpoint_url: "http://unused".into(),
            bucket: "unused".into(),
            access_key: "unused".into(),
            secret_key: "unused".into(),
        },
        db: DbConfig {
            url: "http://unused".into(),
            service_key: "unused".into(),
            jwt_secret: SECRET.into(),
        },
        models: ModelKeys {
            google_api_key: "unused".into(),
            deepseek_api_key: "unused".into(),
            openai_api_key: "unused".into(),
        },
        asr: AsrConfig {
            base_url: "http://unused".into(),
            model_size: "base".into(),
            device: "cpu".into(),
            compute_type: "int8".into(),
            language: "es".into(),
        },
        frontend_origins: vec!["https://app.example.com".into()],
        api_rate_limit,
        bind_addr: "127.0.0.1:0".into(),
        knowledge_pdf_enabled,
        healthbeat_file: "/tmp/health/unused".into(),
    }
}

struct TestCtx {
    app: Router,
    store: MemoryStreamStore,
    db: MemoryDatabase,
    blob: MemoryBlobStore,
}

fn ctx_with(settings: Settings) -> TestCtx {
    let store = MemoryStreamStore::new();
    let db = MemoryDatabase::new();
    let blob = MemoryBlobStore::new();
    let state = AppState::new(
        settings,
        Arc::new(store.clone()),
        Arc::new(db.clone()),
        Arc::new(blob.clone()),
    );
    TestCtx {
        app: build_router(state),
        store,
        db,
        blob,
    }
}

fn ctx() -> TestCtx {
    ctx_with(test_settings(1000, true))
}

fn token_with_exp(sub: &str, admin: bool, exp: i64) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        aud: "authenticated".into(),
        exp,
        app_metadata: AppMetadata {
            claims_admin: admin,
        },
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn token(sub: &str, admin: bool) -> String {
    let exp = time::OffsetDateTime::now_utc().unix_timestamp() + 3600;
    token_with_exp(sub, admin, exp)
}

fn get(path: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(path: &str, bearer: Option<&str>, payload: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let ctx = ctx();
    let response = ctx.app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn deep_health_reports_dependencies() {
    let ctx = ctx();
    let response = ctx
        .app
        .clone()
        .oneshot(get("/health/deep", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "status": "healthy", "redis": true, "database": true })
    );
}

#[tokio::test]
async fn ingest_requires_user_id() {
    let ctx = ctx();
    let response = ctx
        .app
        .clone()
        .oneshot(post_json(
            "/api/v1/messages/whatsapp",
            None,
            &json!({ "body": "This is missing a userId" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "detail": "Missing 'userId' in payload" })
    );
}

#[tokio::test]
async fn ingest_accepts_and_enqueues() {
    let ctx = ctx();
    let payload = json!({
        "userId": "12345",
        "chatId": "12345",
        "timestamp": "1678886400",
        "body": "Hello, world!",
    });
    let response = ctx
        .app
        .clone()
        .oneshot(post_json("/api/v1/messages/whatsapp", None, &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await, json!({ "status": "accepted" }));

    let entries = ctx.store.entries(NEW_MESSAGE_STREAM).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].get("userId"), Some("12345"));
    assert_eq!(entries[0].get("body"), Some("Hello, world!"));
    assert_eq!(entries[0].get("mediaKey"), Some(""));
    assert_eq!(entries[0].get("transcribed"), Some("false"));
}

#[tokio::test]
async fn ingest_rejects_exhausted_credits() {
    let ctx = ctx();
    ctx.db.set_credits("12345", 0).await;
    let response = ctx
        .app
        .clone()
        .oneshot(post_json(
            "/api/v1/messages/whatsapp",
            None,
            &json!({ "userId": "12345", "body": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(ctx.store.entries(NEW_MESSAGE_STREAM).await.is_empty());
}

#[tokio::test]
async fn user_endpoints_require_a_token() {
    let ctx = ctx();
    let response = ctx
        .app
        .clone()
        .oneshot(get("/api/v1/knowledge/documents", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let ctx = ctx();
    let expired = token_with_exp(
        "u1",
        false,
        time::OffsetDateTime::now_utc().unix_timestamp() - 600,
    );
    let response = ctx
        .app
        .clone()
        .oneshot(get("/api/v1/knowledge/documents", Some(&expired)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_upsert_get_and_activate() {
    let ctx = ctx();
    let bearer = token("u1", false);

    let response = ctx
        .app
        .clone()
        .oneshot(post_json(
            "/api/v1/agents/me",
            Some(&bearer),
            &json!({
                "name": "support",
                "base_prompt": "You are a support agent.",
                "config": { "task": "chat" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["user_id"], "u1");
    assert_eq!(created["status"], "active");

    let response = ctx
        .app
        .clone()
        .oneshot(get("/api/v1/agents/me", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "support");

    let response = ctx
        .app
        .clone()
        .oneshot(post_json("/api/v1/agent/activate", Some(&bearer), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn activate_without_agent_is_404() {
    let ctx = ctx();
    let bearer = token("nobody", false);
    let response = ctx
        .app
        .clone()
        .oneshot(post_json("/api/v1/agent/activate", Some(&bearer), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_endpoints_require_the_admin_claim() {
    let ctx = ctx();
    let bearer = token("u1", false);
    let response = ctx
        .app
        .clone()
        .oneshot(get("/api/v1/admin/dlq", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_reprocess_requeues_the_original_envelope() {
    let ctx = ctx();
    let admin = token("ops", true);

    let entry = PersistentEntry {
        message_id: "7-0".into(),
        data: [("userId", "u1"), ("body", "x")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };
    let shared: vox_stream::SharedStreamStore = Arc::new(ctx.store.clone());
    vox_dlq::persist(&shared, &entry).await.unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(get("/api/v1/admin/dlq", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let payload = serde_json::to_value(&entry).unwrap();
    let response = ctx
        .app
        .clone()
        .oneshot(post_json("/api/v1/admin/dlq/reprocess", Some(&admin), &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The envelope is back on the input stream, fields intact.
    let entries = ctx.store.entries(NEW_MESSAGE_STREAM).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].fields, entry.data);

    // And the list shrank; a second reprocess finds nothing.
    let response = ctx
        .app
        .clone()
        .oneshot(post_json("/api/v1/admin/dlq/reprocess", Some(&admin), &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_delete_of_missing_entry_is_404() {
    let ctx = ctx();
    let admin = token("ops", true);
    let entry = PersistentEntry {
        message_id: "9-0".into(),
        data: Default::default(),
    };
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/admin/dlq/item")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {admin}"))
        .body(Body::from(serde_json::to_string(&entry).unwrap()))
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rate_limit_kicks_in_after_the_configured_count() {
    let ctx = ctx_with(test_settings(2, true));
    let bearer = token("u1", false);

    for _ in 0..2 {
        let mut request = get("/api/v1/knowledge/documents", Some(&bearer));
        request
            .headers_mut()
            .insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        let response = ctx.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let mut request = get("/api/v1/knowledge/documents", Some(&bearer));
    request
        .headers_mut()
        .insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn invalid_tokens_rate_limit_as_anon() {
    let ctx = ctx_with(test_settings(1, true));

    let mut request = get("/api/v1/knowledge/documents", Some("garbage"));
    request
        .headers_mut()
        .insert("x-forwarded-for", "9.9.9.9".parse().unwrap());
    let first = ctx.app.clone().oneshot(request).await.unwrap();
    // Authentication still fails, but the request consumed the anon budget.
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let mut request = get("/api/v1/knowledge/documents", Some("other-garbage"));
    request
        .headers_mut()
        .insert("x-forwarded-for", "9.9.9.9".parse().unwrap());
    let second = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

fn multipart_request(
    path: &str,
    bearer: &str,
    file_name: &str,
    content_type: &str,
    contents: &[u8],
) -> Request<Body> {
    let boundary = "voxflow-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .body(Body::from(body))
        .unwrap()
}

async fn seed_agent(ctx: &TestCtx, user_id: &str) {
    ctx.db
        .seed_agent(
            user_id,
            NewAgent {
                name: "support".into(),
                base_prompt: "You are helpful.".into(),
                guardrails: None,
                config: json!({}),
            },
            AgentStatus::Active,
        )
        .await;
}

#[tokio::test]
async fn upload_stores_blob_creates_row_and_enqueues() {
    let ctx = ctx();
    seed_agent(&ctx, "u1").await;
    let bearer = token("u1", false);

    let response = ctx
        .app
        .clone()
        .oneshot(multipart_request(
            "/api/v1/knowledge/upload",
            &bearer,
            "faq.txt",
            "text/plain",
            b"our refund window is 30 days",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let document_id = body["document_id"].as_str().unwrap().to_string();

    let documents = ctx.db.documents_for_user("u1").await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, document_id);
    assert_eq!(documents[0].status, DocumentStatus::Pending);
    assert!(documents[0].storage_path.starts_with("u1/"));
    assert!(documents[0].storage_path.ends_with("-faq.txt"));

    assert!(ctx.blob.contains(&documents[0].storage_path).await);

    let events = ctx.store.entries(NEW_DOCUMENT_STREAM).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("document_id"), Some(document_id.as_str()));
    assert_eq!(events[0].get("user_id"), Some("u1"));
    assert_eq!(
        events[0].get("storage_path"),
        Some(documents[0].storage_path.as_str())
    );
}

#[tokio::test]
async fn upload_rejects_unsupported_content_type() {
    let ctx = ctx();
    seed_agent(&ctx, "u1").await;
    let bearer = token("u1", false);

    let response = ctx
        .app
        .clone()
        .oneshot(multipart_request(
            "/api/v1/knowledge/upload",
            &bearer,
            "sheet.xlsx",
            "application/vnd.ms-excel",
            b"PK",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.store.entries(NEW_DOCUMENT_STREAM).await.is_empty());
}

#[tokio::test]
async fn upload_pdf_gets_501_when_disabled() {
    let ctx = ctx_with(test_settings(1000, false));
    seed_agent(&ctx, "u1").await;
    let bearer = token("u1", false);

    let response = ctx
        .app
        .clone()
        .oneshot(multipart_request(
            "/api/v1/knowledge/upload",
            &bearer,
            "doc.pdf",
            "application/pdf",
            b"%PDF-1.4",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn upload_without_agent_is_404() {
    let ctx = ctx();
    let bearer = token("u1", false);

    let response = ctx
        .app
        .clone()
        .oneshot(multipart_request(
            "/api/v1/knowledge/upload",
            &bearer,
            "faq.txt",
            "text/plain",
            b"contenido",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(ctx.store.entries(NEW_DOCUMENT_STREAM).await.is_empty());
}
