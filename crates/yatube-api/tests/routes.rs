//! Drives the full router over HTTP with an in-memory database.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use yatube_api::cache::FeedCache;
use yatube_api::media::MAX_IMAGE_SIZE;
use yatube_api::{AppStateInner, router};
use yatube_db::Database;
use yatube_types::api::SignupResponse;

const TINY_GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

/// The router plus the media directory it writes to. Keep the `TempDir`
/// alive for the whole test; dropping it removes the directory.
fn app() -> (Router, TempDir) {
    let media = tempfile::tempdir().expect("media dir");
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("db"),
        jwt_secret: "test-secret".to_string(),
        feed_cache: FeedCache::disabled(),
        media_root: media.path().to_path_buf(),
    });
    (router(state), media)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.expect("body").to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, headers, json)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("request")
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

async fn signup(app: &Router, username: &str) -> String {
    let (status, _, body) = send(
        app,
        post_json(
            "/auth/signup/",
            None,
            json!({"username": username, "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let resp: SignupResponse = serde_json::from_value(body).expect("signup response");
    resp.token
}

async fn create_post(app: &Router, token: &str, text: &str) -> Value {
    let (status, _, body) = send(app, post_json("/create/", Some(token), json!({ "text": text }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

fn location(headers: &axum::http::HeaderMap) -> &str {
    headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
}

#[tokio::test]
async fn health_check() {
    let (app, _media) = app();
    let response = app.oneshot(get("/health", None)).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn signup_rejects_duplicate_username() {
    let (app, _media) = app();
    signup(&app, "leo").await;

    let (status, _, _) = send(
        &app,
        post_json("/auth/signup/", None, json!({"username": "leo", "password": "another pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, body) = send(
        &app,
        post_json("/auth/login/", None, json!({"username": "leo", "password": "correct horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "leo");

    let (status, _, _) = send(
        &app,
        post_json("/auth/login/", None, json!({"username": "leo", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_post_redirects_to_profile_and_shows_on_index() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;

    let (status, headers, body) = send(&app, post_json("/create/", Some(&token), json!({"text": "first post"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(location(&headers), "/profile/leo/");
    assert_eq!(body["author"]["username"], "leo");

    let (status, _, index) = send(&app, get("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(index["items"][0]["text"], "first post");
    assert_eq!(index["total_items"], 1);

    let (status, _, profile) = send(&app, get("/profile/leo/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["post_count"], 1);
    assert_eq!(profile["following"], false);
}

#[tokio::test]
async fn anonymous_cannot_create_post() {
    let (app, _media) = app();
    let (status, _, _) = send(&app, post_json("/create/", None, json!({"text": "hello"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, post_json("/create/", Some("garbage"), json!({"text": "hello"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_text_reports_field_errors() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;

    let (status, _, body) = send(&app, post_json("/create/", Some(&token), json!({"text": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["text"].is_array());

    let (status, _, body) = send(&app, post_json("/create/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["text"].is_array());
}

#[tokio::test]
async fn non_author_edit_redirects_without_saving() {
    let (app, _media) = app();
    let author = signup(&app, "author").await;
    let other = signup(&app, "other").await;
    let post = create_post(&app, &author, "original").await;
    let id = post["id"].as_str().expect("post id");
    let detail_url = format!("/posts/{}/", id);
    let edit_url = format!("/posts/{}/edit/", id);

    let (status, headers, _) = send(&app, post_json(&edit_url, Some(&other), json!({"text": "hijacked"}))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), detail_url);

    let (_, _, detail) = send(&app, get(&detail_url, None)).await;
    assert_eq!(detail["post"]["text"], "original");

    let (status, _, _) = send(&app, post_json(&edit_url, Some(&author), json!({"text": "edited"}))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let (_, _, detail) = send(&app, get(&detail_url, None)).await;
    assert_eq!(detail["post"]["text"], "edited");
}

#[tokio::test]
async fn comments_require_login_and_text() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;
    let post = create_post(&app, &token, "post").await;
    let id = post["id"].as_str().expect("post id");
    let comment_url = format!("/posts/{}/comment/", id);

    let (status, _, _) = send(&app, post_json(&comment_url, None, json!({"text": "hi"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, post_json(&comment_url, Some(&token), json!({"text": ""}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, headers, _) = send(&app, post_json(&comment_url, Some(&token), json!({"text": "hi"}))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), format!("/posts/{}/", id));

    let (_, _, detail) = send(&app, get(&format!("/posts/{}/", id), None)).await;
    assert_eq!(detail["comments"].as_array().map(Vec::len), Some(1));
    assert_eq!(detail["comments"][0]["author"]["username"], "leo");
}

#[tokio::test]
async fn follow_feed_shows_followed_authors_only() {
    let (app, _media) = app();
    let a = signup(&app, "a_user").await;
    let b = signup(&app, "b_user").await;
    let c = signup(&app, "c_user").await;

    let (status, headers, _) = send(&app, post_json("/profile/b_user/follow/", Some(&a), json!({}))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/follow/");

    create_post(&app, &b, "hello").await;

    let (status, _, feed) = send(&app, get("/follow/", Some(&a))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["items"][0]["text"], "hello");

    let (_, _, feed) = send(&app, get("/follow/", Some(&c))).await;
    assert_eq!(feed["items"].as_array().map(Vec::len), Some(0));

    let (_, _, profile) = send(&app, get("/profile/b_user/", Some(&a))).await;
    assert_eq!(profile["following"], true);

    let (status, _, _) = send(&app, post_json("/profile/b_user/unfollow/", Some(&a), json!({}))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let (_, _, feed) = send(&app, get("/follow/", Some(&a))).await;
    assert_eq!(feed["items"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn follow_edge_cases() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;

    let (status, _, _) = send(&app, post_json("/profile/leo/follow/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let (status, _, _) = send(&app, post_json("/profile/ghost/follow/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, get("/follow/", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_resources_and_pages_are_not_found() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;
    create_post(&app, &token, "only").await;
    let missing_post = format!("/posts/{}/", Uuid::new_v4());

    for uri in [
        "/?page=2",
        "/?page=0",
        "/group/missing/",
        "/profile/nobody/",
        missing_post.as_str(),
    ] {
        let (status, _, _) = send(&app, get(uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }

    let (status, _, _) = send(&app, get("/?page=1", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn uploaded_image_is_served_and_attachable() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;

    let upload = Request::builder()
        .method("POST")
        .uri("/media/")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(TINY_GIF))
        .expect("request");
    let (status, _, body) = send(&app, upload).await;
    assert_eq!(status, StatusCode::CREATED);
    let image = body["image"].as_str().expect("image reference").to_string();
    assert!(image.starts_with("posts/") && image.ends_with(".gif"));

    let response = app.clone().oneshot(get(&format!("/media/{}", image), None)).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(&bytes[..], TINY_GIF);

    let (status, _, post) = send(
        &app,
        post_json("/create/", Some(&token), json!({"text": "with picture", "image": image})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["image"], image.as_str());
}

#[tokio::test]
async fn upload_rejects_non_images_and_anonymous() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;

    let not_image = Request::builder()
        .method("POST")
        .uri("/media/")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from("just text"))
        .expect("request");
    let (status, _, body) = send(&app, not_image).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["image"].is_array());

    let anonymous = Request::builder()
        .method("POST")
        .uri("/media/")
        .body(Body::from(TINY_GIF))
        .expect("request");
    let (status, _, _) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (app, media) = app();
    let token = signup(&app, "leo").await;

    let mut body = TINY_GIF.to_vec();
    body.resize(MAX_IMAGE_SIZE + 1, 0);
    let upload = Request::builder()
        .method("POST")
        .uri("/media/")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .expect("request");
    let (status, _, _) = send(&app, upload).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!media.path().join("posts").exists());
}

#[tokio::test]
async fn non_bearer_authorization_is_treated_as_anonymous() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;
    create_post(&app, &token, "public").await;

    for value in ["Basic dXNlcjpwYXNz", "Bearer", "garbage"] {
        let request = Request::builder()
            .method("GET")
            .uri("/")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .expect("request");
        let (status, _, feed) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK, "{}", value);
        assert_eq!(feed["items"][0]["text"], "public");
    }

    let create = Request::builder()
        .method("POST")
        .uri("/create/")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"text": "sneaky"}).to_string()))
        .expect("request");
    let (status, _, _) = send(&app, create).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_writes_are_unauthorized_before_body_checks() {
    let (app, _media) = app();
    let token = signup(&app, "leo").await;
    let post = create_post(&app, &token, "post").await;
    let id = post["id"].as_str().expect("post id");

    for uri in ["/create/".to_string(), format!("/posts/{}/edit/", id), format!("/posts/{}/comment/", id)] {
        let malformed = Request::builder()
            .method("POST")
            .uri(uri.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let (status, _, _) = send(&app, malformed).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);

        let mistyped = post_json(&uri, None, json!({"text": 42}));
        let (status, _, _) = send(&app, mistyped).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let (status, _, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/create/")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
