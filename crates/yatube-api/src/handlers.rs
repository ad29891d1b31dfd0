//! HTTP handlers. Each one moves its work onto the blocking pool and maps
//! service results onto the status codes and redirects clients expect.

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect},
};
use tracing::debug;
use uuid::Uuid;

use yatube_types::api::{EditPostRequest, NewCommentRequest, NewPostRequest, PageQuery};

use crate::content;
use crate::error::{BlogError, Result};
use crate::feed::PAGE_SIZE;
use crate::follow;
use crate::middleware::Viewer;
use crate::state::{AppState, run_blocking};

fn page_number(query: &PageQuery) -> u32 {
    query.page.unwrap_or(1)
}

/// Unwrap a JSON body whose rejection was deferred so that authentication
/// is checked first.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    let Json(body) = payload?;
    Ok(body)
}

fn post_url(post_id: Uuid) -> String {
    format!("/posts/{}/", post_id)
}

/// GET /: global timeline.
pub async fn index(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Result<impl IntoResponse> {
    let page = page_number(&query);
    let st = state.clone();
    let feed = run_blocking(move || content::list_all(&st.db, &st.feed_cache, page, PAGE_SIZE)).await?;
    Ok(Json(feed))
}

/// GET /group/{slug}/
pub async fn group_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = page_number(&query);
    let st = state.clone();
    let feed = run_blocking(move || content::list_group(&st.db, &slug, page, PAGE_SIZE)).await?;
    Ok(Json(feed))
}

/// GET /profile/{username}/
pub async fn profile(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = page_number(&query);
    let st = state.clone();
    let feed = run_blocking(move || content::profile(&st.db, &viewer, &username, page)).await?;
    Ok(Json(feed))
}

/// GET /posts/{post_id}/
pub async fn post_detail(State(state): State<AppState>, Path(post_id): Path<Uuid>) -> Result<impl IntoResponse> {
    let st = state.clone();
    let detail = run_blocking(move || content::post_detail(&st.db, post_id)).await?;
    Ok(Json(detail))
}

/// POST /create/: 201 with the new post, `Location` pointing at the
/// author's profile.
pub async fn post_create(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    payload: std::result::Result<Json<NewPostRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    viewer.require()?;
    let req = json_body(payload)?;

    let st = state.clone();
    let post = run_blocking(move || content::create_post(&st.db, &st.feed_cache, &viewer, req)).await?;

    let location = format!("/profile/{}/", post.author.username);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(post)))
}

/// POST /posts/{post_id}/edit/: a non-author is sent back to the post
/// without anything being saved.
pub async fn post_edit(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(post_id): Path<Uuid>,
    payload: std::result::Result<Json<EditPostRequest>, JsonRejection>,
) -> Result<Redirect> {
    viewer.require()?;
    let req = json_body(payload)?;

    let st = state.clone();
    match run_blocking(move || content::edit_post(&st.db, &viewer, post_id, req)).await {
        Ok(_) | Err(BlogError::Forbidden(_)) => Ok(Redirect::to(&post_url(post_id))),
        Err(e) => Err(e),
    }
}

/// POST /posts/{post_id}/comment/
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(post_id): Path<Uuid>,
    payload: std::result::Result<Json<NewCommentRequest>, JsonRejection>,
) -> Result<Redirect> {
    viewer.require()?;
    let req = json_body(payload)?;

    let st = state.clone();
    match run_blocking(move || content::add_comment(&st.db, &viewer, post_id, req)).await {
        Ok(_) => Ok(Redirect::to(&post_url(post_id))),
        Err(BlogError::Validation(errors)) => {
            debug!("Rejected comment on post {}: {}", post_id, errors);
            Err(BlogError::NotFound(format!("post {}", post_id)))
        }
        Err(e) => Err(e),
    }
}

/// GET /follow/: posts by everyone the viewer follows.
pub async fn follow_index(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    viewer.require()?;

    let page = page_number(&query);
    let st = state.clone();
    let feed = run_blocking(move || follow::following_feed(&st.db, &viewer, page, PAGE_SIZE)).await?;
    Ok(Json(feed))
}

/// POST /profile/{username}/follow/: following yourself is a silent no-op.
pub async fn profile_follow(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
) -> Result<Redirect> {
    viewer.require()?;

    let st = state.clone();
    match run_blocking(move || follow::follow(&st.db, &viewer, &username)).await {
        Ok(_) | Err(BlogError::Validation(_)) => Ok(Redirect::to("/follow/")),
        Err(e) => Err(e),
    }
}

/// POST /profile/{username}/unfollow/
pub async fn profile_unfollow(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
) -> Result<Redirect> {
    viewer.require()?;

    let st = state.clone();
    run_blocking(move || follow::unfollow(&st.db, &viewer, &username)).await?;
    Ok(Redirect::to("/follow/"))
}

pub async fn health() -> &'static str {
    "ok"
}
