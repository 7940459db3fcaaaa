use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use engine::{SyncEngine, Value};
use http_body_util::BodyExt;
use migration::MigratorTrait;
use sea_orm::Database;
use serde_json::json;
use tower::ServiceExt;

async fn app() -> Router {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();

    let mut builder = SyncEngine::builder().syncs(syncs::all());
    for concept in concepts::all(&db) {
        builder = builder.shared_concept(concept);
    }
    server::router(builder.build().await.unwrap())
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Sign up and log in. Returns `(user, token)`.
async fn session(app: &Router, username: &str) -> (String, String) {
    let (status, body) = post(
        app,
        "/api/Authentication/createUser",
        json!({ "username": username, "displayName": username, "password": "pw" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let user = body["user"].as_str().unwrap().to_string();

    let (status, body) = post(
        app,
        "/api/Authentication/authenticate",
        json!({ "username": username, "password": "pw" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"], user.as_str());
    (user, body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn requests_go_through_the_rules() {
    let app = app().await;
    let (alice, token) = session(&app, "alice").await;

    let (status, body) = post(
        &app,
        "/api/Folder/createFolder",
        json!({ "owner": alice, "name": "trips", "parent": null, "token": token }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["folder"].is_string());
    assert!(body.get("request").is_none());
}

#[tokio::test]
async fn queries_answer_with_results() {
    let app = app().await;
    let (alice, _) = session(&app, "alice").await;

    let (status, body) = post(&app, "/api/Folder/_listFolders", json!({ "user": alice })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["folderInfo"]["name"], ".root");
}

#[tokio::test]
async fn error_payloads_map_to_400() {
    let app = app().await;
    session(&app, "alice").await;

    let (status, body) = post(
        &app,
        "/api/Authentication/authenticate",
        json!({ "username": "alice", "password": "nope" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid password.");

    let (status, body) = post(
        &app,
        "/api/Group/deleteGroup",
        json!({ "group": "g1", "user": "alice", "token": "forged" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn unknown_concepts_map_to_404() {
    let app = app().await;
    let (status, _) = post(&app, "/api/Wallet/_list", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_operations_map_to_404() {
    let app = app().await;
    let (status, body) = post(&app, "/api/Folder/bogus", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "\"Folder.bogus\" operation not found!");
}

#[tokio::test]
async fn bodies_must_be_objects() {
    let app = app().await;
    let (status, body) = post(&app, "/api/Folder/createFolder", json!([1, 2])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "request body must be a JSON object");
}
