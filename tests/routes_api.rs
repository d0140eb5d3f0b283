use actix_web::{test, App};
use photoscreen::auth::{InMemAuth, TokenIssuer};
use photoscreen::kv::InMemKv;
use photoscreen::routes::{config, AppState};
use photoscreen::storage::FsImageStore;
use photoscreen::store::{PostStore, StoreConfig};
use std::sync::Arc;

fn state(data_dir: &std::path::Path) -> AppState {
    AppState {
        store: PostStore::new(Arc::new(InMemKv::new()), StoreConfig::default()),
        auth: Arc::new(InMemAuth::new(TokenIssuer::new("test-secret-must-be-32-bytes-long!!"))),
        image_store: Arc::new(FsImageStore::new(data_dir)),
    }
}

// Minimal 1x1 PNG (transparent)
fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

fn build_multipart(bytes: &[u8], boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    let disp = format!("--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\nContent-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(disp.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(App::new().app_data(actix_web::web::Data::new($state)).configure(config)).await
    };
}

#[actix_web::test]
async fn test_register_post_comment_delete_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(state(tmp.path()));

    // register
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(&serde_json::json!({"login":"ann","email":"ann@example.com","password":"secret1"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let session: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let token = session["token"].as_str().unwrap().to_string();
    let bearer = ("Authorization", format!("Bearer {token}"));

    // list empty
    let req = test::TestRequest::get().uri("/api/v1/posts").to_request();
    let posts: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(posts.as_array().unwrap().len(), 0);

    // create post
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(bearer.clone())
        .set_json(&serde_json::json!({
            "title": "Forest", "location": "Carpathians", "image_uri": "/images/abc",
            "latitude": 48.1, "longitude": 24.5
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let id = post["id"].as_i64().unwrap();
    assert_eq!(post["imageUri"], "/images/abc");

    // comment, then empty comment
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{id}/comments"))
        .insert_header(bearer.clone())
        .set_json(&serde_json::json!({"text": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let comment: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(comment["author"], "Anonymous");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{id}/comments"))
        .insert_header(bearer.clone())
        .set_json(&serde_json::json!({"text": "   "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // list shows the count
    let req = test::TestRequest::get().uri("/api/v1/posts").to_request();
    let posts: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(posts[0]["commentCount"], 1);
    assert_eq!(posts[0]["title"], "Forest");

    // detail view
    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/{id}")).to_request();
    let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["comments"].as_array().unwrap().len(), 1);

    // map pin
    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/{id}/map")).to_request();
    let pin: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pin["coordinates"]["latitude"], 48.1);
    assert_eq!(pin["title"], "Forest");
    assert_eq!(pin["postId"], id);

    // delete twice: second is a no-op
    for _ in 0..2 {
        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/posts/{id}"))
            .insert_header(bearer.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 204);
    }
    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/{id}/comments")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_mutations_require_a_session() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(state(tmp.path()));
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .set_json(&serde_json::json!({"title":"x","location":"y","latitude":1.0,"longitude":2.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .set_json(&serde_json::json!({"title":"x","location":"y","latitude":1.0,"longitude":2.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_auth_errors_map_to_statuses() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(state(tmp.path()));
    let register = |email: &str, password: &str| {
        test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(&serde_json::json!({"login":"ann","email":email,"password":password}))
            .to_request()
    };

    let resp = test::call_service(&app, register("bad-email", "secret1")).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["error"], "Invalid email format");

    let resp = test::call_service(&app, register("ann@example.com", "123")).await;
    assert_eq!(resp.status(), 400);

    assert_eq!(test::call_service(&app, register("ann@example.com", "secret1")).await.status(), 201);
    assert_eq!(test::call_service(&app, register("ann@example.com", "secret1")).await.status(), 409);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(&serde_json::json!({"email":"ann@example.com","password":"nope!!"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn test_logout_revokes_token() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(state(tmp.path()));
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(&serde_json::json!({"login":"ann","email":"ann@example.com","password":"secret1"}))
        .to_request();
    let session: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let bearer = ("Authorization", format!("Bearer {}", session["token"].as_str().unwrap()));

    let req = test::TestRequest::get().uri("/api/v1/auth/me").insert_header(bearer.clone()).to_request();
    let me: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["email"], "ann@example.com");

    let req = test::TestRequest::post().uri("/api/v1/auth/logout").insert_header(bearer.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri("/api/v1/auth/me").insert_header(bearer).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn test_post_without_location_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let st = state(tmp.path());
    let store = st.store.clone();
    let app = app!(st);
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(&serde_json::json!({"login":"ann","email":"ann@example.com","password":"secret1"}))
        .to_request();
    let session: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(("Authorization", format!("Bearer {}", session["token"].as_str().unwrap())))
        .set_json(&serde_json::json!({"title":"x","location":"y"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
    assert!(store.is_empty().await);
}

#[actix_web::test]
async fn test_image_upload_is_idempotent_and_served() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(state(tmp.path()));
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(&serde_json::json!({"login":"ann","email":"ann@example.com","password":"secret1"}))
        .to_request();
    let session: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let bearer = ("Authorization", format!("Bearer {}", session["token"].as_str().unwrap()));

    let png = sample_png();
    let mut uri = String::new();
    for (expected_status, expected_dup) in [(201, false), (200, true)] {
        let (ct, body) = build_multipart(&png, "XBOUNDARY");
        let req = test::TestRequest::post()
            .uri("/api/v1/images")
            .insert_header(bearer.clone())
            .insert_header(("Content-Type", ct))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected_status);
        let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(v["mime"], "image/png");
        assert_eq!(v["duplicate"], expected_dup);
        uri = v["uri"].as_str().unwrap().to_string();
    }

    let req = test::TestRequest::get().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await.to_vec(), png);

    // plain text is not a photo
    let (ct, body) = build_multipart(b"hello world", "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/v1/images")
        .insert_header(bearer)
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 415);
}
