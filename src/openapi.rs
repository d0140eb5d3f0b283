use crate::models::{
    Comment, Coordinates, LoginRequest, MapPin, NewComment, NewPost, Post, PostSummary, PostView,
    RegisterRequest, Session, UserProfile,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::delete_post,
        crate::routes::list_comments,
        crate::routes::add_comment,
        crate::routes::post_map,
        crate::routes::upload_image,
    ),
    components(schemas(
        Post, NewPost, PostView, PostSummary, Comment, NewComment, MapPin, Coordinates,
        RegisterRequest, LoginRequest, Session, UserProfile,
        crate::auth::Claims, crate::routes::ImageUploadResponse
    )),
    tags(
        (name = "auth", description = "Registration and sessions"),
        (name = "posts", description = "Photo posts"),
        (name = "comments", description = "Post comments"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_post_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/posts"));
        assert!(doc.paths.paths.contains_key("/api/v1/posts/{id}/comments"));
    }
}
