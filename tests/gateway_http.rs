//! End-to-end gateway behaviour against a mock backend over real HTTP.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use paynotice_client::{Client, ClientError, ClientOptions, FileStore, NoticeStatus, SecureStore};

#[derive(Clone, Default)]
struct Backend {
    seen_auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn login() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": { "accessToken": "a1", "refreshToken": "r1", "role": "User" }
    }))
}

async fn refresh(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["refreshToken"] == "r1" {
        (
            StatusCode::OK,
            Json(json!({ "accessToken": "a2", "refreshToken": "r2" })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid refresh token" })))
    }
}

async fn my_requests(
    State(backend): State<Backend>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    backend.seen_auth.lock().unwrap().push(auth.clone());

    if auth.as_deref() != Some("Bearer a2") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "expired" })));
    }

    (
        StatusCode::OK,
        Json(json!([{
            "id": "n1",
            "title": "Org dues",
            "amount": 150,
            "currency": "PHP",
            "status": 0,
            "createdAt": "2024-06-01T08:30:00",
            "xenditPaymentLinkUrl": "https://checkout.example/n1"
        }])),
    )
}

async fn spawn_backend(backend: Backend) -> String {
    let app = Router::new()
        .route("/api/Auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/payment-notices/my-requests", get(my_requests))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/api", addr)
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_call_retried() {
    let backend = Backend::default();
    let base_url = spawn_backend(backend.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());

    let client = Client::new(ClientOptions {
        base_url,
        store: Some(store.clone()),
        ..Default::default()
    })
    .unwrap();

    client.login("juan", "secret").await.unwrap();
    assert_eq!(store.get("accessToken").as_deref(), Some("a1"));

    let notices = client.my_payment_requests().await.unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].status, NoticeStatus::Pending);

    assert_eq!(
        *backend.seen_auth.lock().unwrap(),
        vec![Some("Bearer a1".to_string()), Some("Bearer a2".to_string())]
    );

    // Both halves of the new pair made it to disk together.
    let reopened = FileStore::open(dir.path()).unwrap();
    assert_eq!(reopened.get("accessToken").as_deref(), Some("a2"));
    assert_eq!(reopened.get("refreshToken").as_deref(), Some("r2"));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::new(ClientOptions {
        base_url: format!("http://{}/api", addr),
        ..Default::default()
    })
    .unwrap();

    let err = client.my_payment_requests().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)), "got {:?}", err);
}
