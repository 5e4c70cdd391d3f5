use super::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::TimeZone;
use chrono::Utc;
use serde_json::{json, Value};
use shared::domain::{EncryptionStatus, FileKind, MessageId, SharePermission};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct ApiServerState {
    hits: Arc<AtomicUsize>,
    last_auth_header: Arc<Mutex<Option<String>>>,
    send_bodies: Arc<Mutex<Vec<Value>>>,
    // (field name, file name, content type, byte length) per upload part
    upload_parts: Arc<Mutex<Vec<(String, String, String, usize)>>>,
}

async fn spawn_api_server() -> anyhow::Result<(String, ApiServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ApiServerState::default();
    let app = Router::new()
        .route("/auth/login", post(handle_login))
        .route("/auth/profile", get(handle_profile))
        .route("/messages/conversations/:user_id", get(handle_conversations))
        .route("/messages/messages_with/:peer_id", get(handle_messages))
        .route("/messages/send_message", post(handle_send))
        .route("/messages/available_users/:user_id", get(handle_users))
        .route("/messages/start_conversation", post(handle_start))
        .route("/drive/get", get(handle_files))
        .route("/drive/save", post(handle_upload))
        .route("/drive/download_encrypted/:file_id", get(handle_download))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

async fn client_with_token(base_url: &str) -> ApiClient {
    let client = ApiClient::new(base_url, false).expect("build client");
    client.set_auth_token("token-1").await;
    client
}

async fn handle_login(
    State(state): State<ApiServerState>,
    Json(body): Json<Value>,
) -> (axum::http::StatusCode, Json<Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if body["password"] == json!("right-pw") {
        (
            axum::http::StatusCode::OK,
            Json(json!({
                "message": "Login successful",
                "access_token": "token-1",
                "token_type": "bearer"
            })),
        )
    } else {
        (
            axum::http::StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid credentials" })),
        )
    }
}

async fn handle_profile(
    State(state): State<ApiServerState>,
    headers: HeaderMap,
) -> (axum::http::StatusCode, Json<Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    *state.last_auth_header.lock().await = auth.clone();
    if auth.as_deref() == Some("Bearer token-1") {
        (
            axum::http::StatusCode::OK,
            Json(json!({ "id": 1, "email": "alice@example.com", "username": "alice" })),
        )
    } else {
        (
            axum::http::StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Could not validate credentials" })),
        )
    }
}

async fn handle_conversations(
    State(state): State<ApiServerState>,
    Path(_user_id): Path<i64>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        { "user_id": 2, "username": "bob" },
        { "username": "ghost-without-id" }
    ]))
}

async fn handle_messages(
    State(state): State<ApiServerState>,
    Path(peer_id): Path<i64>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        {
            "id": 11,
            "sender_id": peer_id,
            "receiver_id": 1,
            "content": "hello",
            "created_at": "2024-01-01T10:00:00"
        },
        {
            "id": "12",
            "sender_id": 1,
            "receiver_id": peer_id,
            "content": "hi back",
            "created_at": "2024-01-01T10:01:00"
        }
    ]))
}

async fn handle_send(
    State(state): State<ApiServerState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.send_bodies.lock().await.push(body.clone());
    Json(json!({
        "id": 99,
        "sender_id": 1,
        "receiver_id": body["receiver_id"],
        "content": body["content"],
        "created_at": "2024-05-01T12:00:00"
    }))
}

async fn handle_users(
    State(state): State<ApiServerState>,
    Path(_user_id): Path<i64>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        { "id": 2, "username": "bob" },
        { "id": 3, "username": "carol" }
    ]))
}

async fn handle_start(
    State(state): State<ApiServerState>,
    Json(_body): Json<Value>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "message": "Conversation started", "receiver_id": 7 }))
}

async fn handle_files(State(state): State<ApiServerState>) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        { "id": 41 },
        {
            "id": 42,
            "name": "report.pdf",
            "type": "file",
            "size": 2048,
            "mimeType": "application/pdf",
            "createdAt": "2024-03-01T08:00:00",
            "modifiedAt": "2024-03-02T09:30:00",
            "isStarred": true,
            "isShared": true,
            "owner": "alice",
            "path": "/report.pdf",
            "version": 3,
            "encryptionStatus": "encrypted",
            "quantumKeyId": "qk-7",
            "shareLinks": [{
                "id": "link-1",
                "file_id": 42,
                "url": "https://drive.example.net/s/abc",
                "permissions": "download",
                "access_count": 2
            }]
        },
        { "name": "no-id-entry.txt" }
    ]))
}

async fn handle_upload(
    State(state): State<ApiServerState>,
    mut multipart: Multipart,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let mut new_files = Vec::new();
    let mut index = 0;
    while let Some(field) = multipart.next_field().await.expect("read multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.expect("read field bytes");
        state
            .upload_parts
            .lock()
            .await
            .push((name, file_name.clone(), content_type, bytes.len()));
        new_files.push(json!({
            "id": 100 + index,
            "name": file_name,
            "type": "file",
            "size": bytes.len()
        }));
        index += 1;
    }
    Json(json!({ "newFiles": new_files }))
}

async fn handle_download(
    State(state): State<ApiServerState>,
    Path(_file_id): Path<i64>,
) -> Vec<u8> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    b"quantum-sealed-bytes".to_vec()
}

#[tokio::test]
async fn missing_token_short_circuits_without_a_request() {
    let (base_url, state) = spawn_api_server().await.expect("spawn server");
    let client = ApiClient::new(&base_url, false).expect("build client");

    let failure = client.list_files().await.expect_err("must fail locally");
    assert!(matches!(failure, ApiFailure::NotAuthenticated));
    let failure = client.fetch_profile().await.expect_err("must fail locally");
    assert!(matches!(failure, ApiFailure::NotAuthenticated));
    assert_eq!(state.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bearer_token_is_attached_to_authenticated_calls() {
    let (base_url, state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let profile = client.fetch_profile().await.expect("fetch profile");
    assert_eq!(profile.id, UserId(1));
    assert_eq!(profile.username, "alice");
    assert_eq!(
        state.last_auth_header.lock().await.as_deref(),
        Some("Bearer token-1")
    );
}

#[tokio::test]
async fn rejections_carry_the_server_detail() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = ApiClient::new(&base_url, false).expect("build client");

    let failure = client
        .login(&LoginRequest {
            email: "alice@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .expect_err("login must fail");
    match failure {
        ApiFailure::Status { status, detail } => {
            assert_eq!(status, 401);
            assert_eq!(detail.as_deref(), Some("Invalid credentials"));
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[tokio::test]
async fn login_with_valid_credentials_returns_the_token() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = ApiClient::new(&base_url, false).expect("build client");

    let body = client
        .login(&LoginRequest {
            email: "alice@example.com".to_string(),
            password: "right-pw".to_string(),
        })
        .await
        .expect("login");
    assert_eq!(body.bearer_token(), Some("token-1"));
}

#[tokio::test]
async fn conversation_entries_without_ids_are_dropped() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let conversations = client
        .list_conversations(UserId(1))
        .await
        .expect("list conversations");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].peer_id, UserId(2));
    assert_eq!(conversations[0].display_name, "bob");
}

#[tokio::test]
async fn message_history_decodes_naive_timestamps_as_utc() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let messages = client
        .list_messages_with(UserId(2))
        .await
        .expect("list messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message_id, MessageId(11));
    assert_eq!(messages[0].sender_id, UserId(2));
    assert_eq!(
        messages[0].created_at,
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    );
    // The second record's id arrives as a numeric string.
    assert_eq!(messages[1].message_id, MessageId(12));
}

#[tokio::test]
async fn send_message_posts_receiver_and_content() {
    let (base_url, state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let message = client
        .send_message(UserId(2), "hello there")
        .await
        .expect("send message");
    assert_eq!(message.message_id, MessageId(99));
    assert_eq!(message.receiver_id, UserId(2));
    assert_eq!(message.content, "hello there");

    let bodies = state.send_bodies.lock().await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0], json!({ "receiver_id": 2, "content": "hello there" }));
}

#[tokio::test]
async fn available_users_decode_into_peers() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let users = client
        .list_available_users(UserId(1))
        .await
        .expect("list users");
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].username, "carol");
}

#[tokio::test]
async fn start_conversation_returns_the_counterpart() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let response = client
        .start_conversation(UserId(7))
        .await
        .expect("start conversation");
    assert_eq!(response.receiver_id, Some(UserId(7)));
}

#[tokio::test]
async fn listing_tolerates_sparse_records_and_decodes_full_ones() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let files = client.list_files().await.expect("list files");
    // The id-less third record is dropped; the sparse one is defaulted.
    assert_eq!(files.len(), 2);

    let sparse = &files[0];
    assert_eq!(sparse.file_id, FileId(41));
    assert_eq!(sparse.name, "unknown");
    assert_eq!(sparse.path, "/unknown");
    assert_eq!(sparse.kind, FileKind::File);
    assert_eq!(sparse.encryption_status, EncryptionStatus::Unencrypted);

    let full = &files[1];
    assert_eq!(full.name, "report.pdf");
    assert!(full.starred);
    assert!(full.shared);
    assert_eq!(full.owner, "alice");
    assert_eq!(full.version, 3);
    assert_eq!(full.encryption_status, EncryptionStatus::Encrypted);
    assert_eq!(full.quantum_key_id.as_deref(), Some("qk-7"));
    assert_eq!(full.share_links.len(), 1);
    assert_eq!(full.share_links[0].permissions, SharePermission::Download);
    assert_eq!(full.share_links[0].access_count, 2);
}

#[tokio::test]
async fn upload_sends_parts_named_files_with_guessed_types() {
    let (base_url, state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let uploaded = client
        .upload_files(vec![
            UploadPayload::new("notes.txt", b"hello".to_vec()),
            UploadPayload::new("archive.bin", b"abc".to_vec()),
        ])
        .await
        .expect("upload files");
    assert_eq!(uploaded.len(), 2);
    assert_eq!(uploaded[0].name, "notes.txt");
    assert_eq!(uploaded[0].size_bytes, 5);

    let parts = state.upload_parts.lock().await;
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0, "files");
    assert_eq!(parts[0].1, "notes.txt");
    assert_eq!(parts[0].2, "text/plain");
    assert_eq!(parts[0].3, 5);
    assert_eq!(parts[1].0, "files");
    assert_eq!(parts[1].1, "archive.bin");
}

#[tokio::test]
async fn download_returns_the_raw_bytes() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = client_with_token(&base_url).await;

    let bytes = client.download_file(FileId(42)).await.expect("download");
    assert_eq!(bytes, b"quantum-sealed-bytes");
}

#[tokio::test]
async fn unreachable_server_maps_to_a_transport_failure() {
    // Bind and drop a listener so the port is very likely unused.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = ApiClient::new(&format!("http://{addr}"), false).expect("build client");
    let failure = client
        .login(&LoginRequest {
            email: "alice@example.com".to_string(),
            password: "right-pw".to_string(),
        })
        .await
        .expect_err("must fail to connect");
    assert!(matches!(failure, ApiFailure::Transport(_)));
}

#[tokio::test]
async fn base_url_trailing_slash_is_normalized() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let client = ApiClient::new(&format!("{base_url}/"), false).expect("build client");
    client.set_auth_token("token-1").await;

    let profile = client.fetch_profile().await.expect("fetch profile");
    assert_eq!(profile.id, UserId(1));
}
