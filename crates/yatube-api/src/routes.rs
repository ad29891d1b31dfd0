use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::media::{self, MAX_IMAGE_SIZE, UPLOAD_DIR};
use crate::middleware::resolve_viewer;
use crate::state::AppState;
use crate::{auth, handlers};

/// Every route of the blog. Cross-cutting layers (CORS, tracing) are added
/// by the server binary.
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/signup/", post(auth::signup))
        .route("/auth/login/", post(auth::login));

    let feed_routes = Router::new()
        .route("/", get(handlers::index))
        .route("/group/{slug}/", get(handlers::group_posts))
        .route("/profile/{username}/", get(handlers::profile))
        .route("/follow/", get(handlers::follow_index));

    let post_routes = Router::new()
        .route("/create/", post(handlers::post_create))
        .route("/posts/{post_id}/", get(handlers::post_detail))
        .route("/posts/{post_id}/edit/", post(handlers::post_edit))
        .route("/posts/{post_id}/comment/", post(handlers::add_comment))
        .route("/profile/{username}/follow/", post(handlers::profile_follow))
        .route("/profile/{username}/unfollow/", post(handlers::profile_unfollow));

    let media_routes = Router::new()
        .route("/media/", post(media::upload_image))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE))
        .nest_service(
            &format!("/media/{}", UPLOAD_DIR),
            ServeDir::new(state.media_root.join(UPLOAD_DIR)),
        );

    Router::new()
        .merge(auth_routes)
        .merge(feed_routes)
        .merge(post_routes)
        .merge(media_routes)
        .layer(middleware::from_fn_with_state(state.clone(), resolve_viewer))
        .route("/health", get(handlers::health))
        .with_state(state)
}
