use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use voxgate_forward::{Forwarder, ForwarderConfig};
use voxgate_server::{app, bridge::VoiceBridge, AdminSettings, AppState};
use voxgate_types::VoiceReply;
use voxgate_vault::{
    CredentialCodec, CredentialResolver, CredentialStore, FileCredentialStore, MasterKey,
};

const TOKEN: &str = "admin-s3cret";

fn state(dir: &std::path::Path, admin: AdminSettings) -> AppState {
    let store: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(dir, "user_config.json").unwrap());
    let codec = Arc::new(CredentialCodec::new(&MasterKey::generate()));
    AppState {
        bridge: VoiceBridge::new(
            CredentialResolver::new(store, codec),
            Forwarder::new(ForwarderConfig {
                timeout: Duration::from_secs(5),
                probe_timeout: Duration::from_secs(5),
            }),
        ),
        admin,
    }
}

fn admin(allow_insecure_endpoints: bool) -> AdminSettings {
    AdminSettings {
        token: Some(TOKEN.to_string()),
        allow_insecure_endpoints,
    }
}

async fn spawn_model() -> String {
    let router = Router::new()
        .route(
            "/ok",
            post(|| async {
                Json(json!({ "choices": [{ "message": { "content": "Hello there." } }] }))
            }),
        )
        .route(
            "/fail",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn send(
    router: Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let response = router
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn api_is_absent_without_admin_token() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(state(dir.path(), AdminSettings::default()));

    let (status, _) = send(
        router,
        "PUT",
        "/api/credentials/alice",
        Some(TOKEN),
        json!({ "endpoint": "https://llm.example/v1/chat/completions" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn token_is_required() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(state(dir.path(), admin(false)));
    let body = json!({ "endpoint": "https://llm.example/v1/chat/completions", "apiKey": "sk" });

    for token in [None, Some("wrong"), Some("")] {
        let (status, _) = send(
            router.clone(),
            "PUT",
            "/api/credentials/alice",
            token,
            body.clone(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "token {token:?}");
    }

    let (status, _) = send(router, "POST", "/api/credentials/test", None, body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn put_stores_encrypted_credential() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path(), admin(false));
    let resolver = state.bridge.resolver().clone();
    let router = app(state);

    let (status, _) = send(
        router,
        "PUT",
        "/api/credentials/alice",
        Some(TOKEN),
        json!({
            "endpoint": "https://llm.example/v1/chat/completions/model_name=gpt-4o-mini",
            "apiKey": "sk-alice"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let resolved = resolver.resolve("alice").await.unwrap();
    assert_eq!(
        resolved.endpoint,
        "https://llm.example/v1/chat/completions/model_name=gpt-4o-mini"
    );
    assert_eq!(resolved.api_key, "sk-alice");

    let raw = std::fs::read_to_string(dir.path().join("user_config.json")).unwrap();
    assert!(!raw.contains("sk-alice"));
}

#[tokio::test]
async fn put_validates_input() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(state(dir.path(), admin(false)));

    let long_user = format!("/api/credentials/{}", "u".repeat(513));
    let cases = [
        ("/api/credentials/alice", json!({ "endpoint": "http://llm.example/v1" })),
        ("/api/credentials/alice", json!({ "endpoint": "not a url" })),
        ("/api/credentials/alice", json!({ "endpoint": "" })),
        ("/api/credentials/alice", json!({ "apiKey": "sk" })),
        ("/api/credentials/alice", json!("just a string")),
        (long_user.as_str(), json!({ "endpoint": "https://llm.example/v1" })),
    ];

    for (uri, body) in cases {
        let (status, response) = send(router.clone(), "PUT", uri, Some(TOKEN), body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
        assert!(response["error"].is_string());
    }
}

#[tokio::test]
async fn put_reports_storage_failure() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(state(&dir.path().join("missing"), admin(false)));

    let (status, body) = send(
        router,
        "PUT",
        "/api/credentials/alice",
        Some(TOKEN),
        json!({ "endpoint": "https://llm.example/v1", "apiKey": "sk-alice" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.to_string().contains("sk-alice"));
}

#[tokio::test]
async fn provisioned_local_model_answers_voice_queries() {
    let model = spawn_model().await;
    let dir = tempfile::tempdir().unwrap();
    let router = app(state(dir.path(), admin(true)));

    let (status, _) = send(
        router.clone(),
        "PUT",
        "/api/credentials/alice",
        Some(TOKEN),
        json!({ "endpoint": format!("{model}/ok") }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let webhook = json!({
        "session": { "user": { "userId": "alice" } },
        "request": { "intent": { "slots": { "query": { "value": "hello" } } } }
    });
    let (status, body) = send(router, "POST", "/query", None, webhook).await;
    assert_eq!(status, StatusCode::OK);
    let reply: VoiceReply = serde_json::from_value(body).unwrap();
    assert_eq!(reply.ssml(), "<speak>Hello there.</speak>");
}

#[tokio::test]
async fn probe_reports_reply_or_generic_failure() {
    let model = spawn_model().await;
    let dir = tempfile::tempdir().unwrap();
    let router = app(state(dir.path(), admin(true)));

    let (status, body) = send(
        router.clone(),
        "POST",
        "/api/credentials/test",
        Some(TOKEN),
        json!({ "endpoint": format!("{model}/ok"), "apiKey": "sk" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["reply"], "Hello there.");

    let (status, body) = send(
        router,
        "POST",
        "/api/credentials/test",
        Some(TOKEN),
        json!({ "endpoint": format!("{model}/fail") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert!(body["message"].is_string());
    assert!(!body.to_string().contains("exploded"));
}

#[tokio::test]
async fn probe_validates_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(state(dir.path(), admin(false)));

    let (status, _) = send(
        router,
        "POST",
        "/api/credentials/test",
        Some(TOKEN),
        json!({ "endpoint": "http://127.0.0.1:1/v1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
