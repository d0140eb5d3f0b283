use std::sync::Arc;
use actix_web::{web, HttpResponse};
use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;
use sha2::{Sha256, Digest};

use crate::auth::{Auth, AuthService, Claims};
use crate::error::ApiError;
use crate::models::*;
use crate::storage::{image_uri, ImageStore, ImageStoreError};
use crate::store::PostStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(
                web::resource("/posts/{id}/comments")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(add_comment)),
            )
            .service(web::resource("/posts/{id}/map").route(web::get().to(post_map)))
            .service(web::resource("/images").route(web::post().to(upload_image))),
    );
    // public fetch route (no /api/v1 prefix so imageUri works as an <img src>)
    cfg.route("/images/{hash}", web::get().to(get_image));
}

#[derive(Clone)]
pub struct AppState {
    pub store: PostStore,
    pub auth: Arc<dyn AuthService>,
    pub image_store: Arc<dyn ImageStore>,
}

// ---------------- Auth -----------------------

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered and signed in", body = Session),
        (status = 400, description = "Invalid login, email or password"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let session = data.auth.sign_up(&req.login, &req.email, &req.password).await?;
    Ok(HttpResponse::Created().json(session))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = Session),
        (status = 400, description = "Invalid email or missing password"),
        (status = 401, description = "Wrong credentials")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let session = data.auth.sign_in(&payload.email, &payload.password).await?;
    Ok(HttpResponse::Ok().json(session))
}

pub async fn logout(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.auth.revoke_token(&auth.0);
    if let Err(e) = data.auth.sign_out().await {
        // token already revoked; the session state is someone else's
        tracing::debug!(error = %e, "sign out without current user");
    }
    Ok(HttpResponse::NoContent().finish())
}

pub async fn auth_me(auth: Auth) -> HttpResponse {
    let claims: Claims = auth.0;
    HttpResponse::Ok().json(claims)
}

// ---------------- Posts -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    responses((status = 200, description = "Posts in publish order", body = [PostSummary]))
)]
pub async fn list_posts(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.store.summaries().await))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post published", body = Post),
        (status = 400, description = "Location missing"),
        (status = 401, description = "Sign in required")
    )
)]
pub async fn create_post(_auth: Auth, data: web::Data<AppState>, payload: web::Json<NewPost>) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    // publishing is gated on the location permission
    if new.coordinates().is_none() {
        return Err(ApiError::BadRequest("Permission to access location was denied".into()));
    }
    let post = data.store.create_post(new).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with comments", body = PostView),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let view = data.store.get_view(path.into_inner()).await.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(view))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 204, description = "Deleted (or already absent)"))
)]
pub async fn delete_post(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.store.delete_post(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Comments in insertion order", body = [Comment]),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_comments(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if data.store.get_post(id).await.is_none() { return Err(ApiError::NotFound); }
    Ok(HttpResponse::Ok().json(data.store.comments(id).await))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/comments",
    request_body = NewComment,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 400, description = "Empty comment"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn add_comment(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let comment = data
        .store
        .append_comment(path.into_inner(), &payload.text)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/map",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Marker for the post", body = MapPin),
        (status = 404, description = "Post not found or has no coordinates")
    )
)]
pub async fn post_map(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let pin = data.store.map_pin(path.into_inner()).await.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(pin))
}

// ---------------- Images -----------------------

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ImageUploadResponse {
    pub hash: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool, // true when the same bytes were uploaded before
    pub uri: String,
}

const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[utoipa::path(
    post,
    path = "/api/v1/images",
    responses(
        (status = 201, description = "Image stored (new)", body = ImageUploadResponse),
        (status = 200, description = "Image already existed (idempotent)", body = ImageUploadResponse),
        (status = 415, description = "Unsupported media type"),
        (status = 413, description = "Payload too large"),
    )
)]
pub async fn upload_image(_auth: Auth, data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart body".into())
    })? {
        if field.content_disposition().get_name() != Some("file") { continue; }
        let mut bytes: Vec<u8> = Vec::new();
        let mut hasher = Sha256::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT { return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish()); }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = format!("{:x}", hasher.finalize());
        let mime = infer::get(&bytes).map(|t| t.mime_type().to_string()).unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }
        let (status_code, duplicate) = match data.image_store.save(&hash, &mime, &bytes).await {
            Ok(()) => (StatusCode::CREATED, false),
            Err(ImageStoreError::Duplicate) => (StatusCode::OK, true),
            Err(e) => { log::error!("image_store save error: {e}"); return Err(ApiError::Internal); }
        };
        let uri = image_uri(&hash);
        let resp = ImageUploadResponse { hash, mime, size: bytes.len(), duplicate, uri };
        return Ok(HttpResponse::build(status_code).json(resp));
    }
    Err(ApiError::BadRequest("missing 'file' field".into()))
}

pub async fn get_image(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let hash = path.into_inner();
    match data.image_store.load(&hash).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes)),
        Err(ImageStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => { log::error!("image_store load error: {e}"); Err(ApiError::Internal) }
    }
}
