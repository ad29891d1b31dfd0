//! Content service: posts, comments and the public feeds, with ownership
//! checks. Every function runs blocking DB calls; handlers call them through
//! `run_blocking`.

use tracing::{info, warn};
use uuid::Uuid;

use yatube_db::{Database, FeedView};
use yatube_types::api::{EditPostRequest, GroupFeed, NewCommentRequest, NewPostRequest, Page, PostDetail, ProfileFeed};
use yatube_types::models::{Comment, Post};

use crate::auth::current_user;
use crate::cache::FeedCache;
use crate::convert;
use crate::error::{BlogError, FieldErrors, Result};
use crate::feed::{PAGE_SIZE, paginate};
use crate::follow;
use crate::media;
use crate::middleware::Viewer;

const REQUIRED: &str = "This field is required.";
const INVALID_GROUP: &str = "Select a valid choice. That choice is not one of the available choices.";
const INVALID_IMAGE: &str = "Not a valid image reference. Upload the file through /media/ first.";

pub fn create_post(db: &Database, cache: &FeedCache, viewer: &Viewer, req: NewPostRequest) -> Result<Post> {
    let author = current_user(db, viewer)?;

    let mut errors = FieldErrors::default();
    let text = req.text.trim();
    if text.is_empty() {
        errors.add("text", REQUIRED);
    }
    let group_id = match req.group {
        Some(id) => resolve_group(db, id, &mut errors)?,
        None => None,
    };
    if let Some(image) = req.image.as_deref() {
        check_image(image, &mut errors);
    }
    errors.into_result()?;

    let post_id = Uuid::new_v4().to_string();
    db.insert_post(&post_id, &author.id, text, group_id.as_deref(), req.image.as_deref())?;
    cache.invalidate_global();

    let post = load_post(db, &post_id)?;
    info!("Post '{}' created by {}", post, author.username);
    Ok(post)
}

/// Apply the fields present in `req` to a post owned by the viewer.
pub fn edit_post(db: &Database, viewer: &Viewer, post_id: Uuid, req: EditPostRequest) -> Result<Post> {
    let requester = current_user(db, viewer)?;
    let id = post_id.to_string();
    let current = db.get_post(&id)?.ok_or_else(|| post_not_found(post_id))?;

    if current.author_id != requester.id {
        warn!("{} tried to edit post {} owned by {}", requester.username, id, current.author_username);
        return Err(BlogError::Forbidden("only the author can edit this post".into()));
    }

    let mut errors = FieldErrors::default();
    let text = match req.text.as_deref() {
        Some(text) => {
            let text = text.trim();
            if text.is_empty() {
                errors.add("text", REQUIRED);
            }
            text.to_string()
        }
        None => current.text,
    };
    let group_id = match req.group {
        None => current.group_id,
        Some(None) => None,
        Some(Some(group)) => resolve_group(db, group, &mut errors)?,
    };
    let image = match req.image {
        None => current.image,
        Some(None) => None,
        Some(Some(image)) => {
            check_image(&image, &mut errors);
            Some(image)
        }
    };
    errors.into_result()?;

    let row = db
        .update_post(&id, &text, group_id.as_deref(), image.as_deref())?
        .ok_or_else(|| post_not_found(post_id))?;

    let post = convert::post(row);
    info!("Post '{}' edited by {}", post, requester.username);
    Ok(post)
}

pub fn add_comment(db: &Database, viewer: &Viewer, post_id: Uuid, req: NewCommentRequest) -> Result<Comment> {
    let author = current_user(db, viewer)?;
    let post_key = post_id.to_string();
    if db.get_post(&post_key)?.is_none() {
        return Err(post_not_found(post_id));
    }

    let text = req.text.trim();
    if text.is_empty() {
        return Err(BlogError::invalid("text", REQUIRED));
    }

    let comment_id = Uuid::new_v4().to_string();
    db.insert_comment(&comment_id, &post_key, &author.id, text)?;

    let comment = db
        .get_comment(&comment_id)?
        .map(convert::comment)
        .ok_or_else(|| anyhow::anyhow!("comment {} vanished after insert", comment_id))?;

    info!("{} commented on post {}", author.username, post_key);
    Ok(comment)
}

pub fn post_detail(db: &Database, post_id: Uuid) -> Result<PostDetail> {
    let post = load_post(db, &post_id.to_string())?;
    let author_post_count = db.count_posts(FeedView::Author(&post.author.id.to_string()))?;
    let comments = db
        .get_comments(&post_id.to_string())?
        .into_iter()
        .map(convert::comment)
        .collect();

    Ok(PostDetail {
        post,
        author_post_count,
        comments,
    })
}

/// Global timeline. Pages of the default size are served from `cache`.
pub fn list_all(db: &Database, cache: &FeedCache, page_number: u32, page_size: u32) -> Result<Page<Post>> {
    let cacheable = page_size == PAGE_SIZE;
    if cacheable {
        if let Some(page) = cache.get_global(page_number) {
            return Ok(page);
        }
    }

    let generation = cache.generation();
    let page = paginate(db, FeedView::Global, page_number, page_size)?;
    if cacheable {
        cache.put_global(generation, page_number, page.clone());
    }
    Ok(page)
}

pub fn list_group(db: &Database, slug: &str, page_number: u32, page_size: u32) -> Result<GroupFeed> {
    let group = db
        .get_group_by_slug(slug)?
        .ok_or_else(|| BlogError::NotFound(format!("group '{}'", slug)))?;

    let page = paginate(db, FeedView::Group(&group.id), page_number, page_size)?;
    Ok(GroupFeed {
        group: convert::group(group),
        page,
    })
}

/// An author's profile: their posts plus whether the viewer follows them.
pub fn list_author(
    db: &Database,
    viewer: &Viewer,
    username: &str,
    page_number: u32,
    page_size: u32,
) -> Result<ProfileFeed> {
    let author = db
        .get_user_by_username(username)?
        .ok_or_else(|| BlogError::NotFound(format!("user '{}'", username)))?;

    let page = paginate(db, FeedView::Author(&author.id), page_number, page_size)?;
    let following = follow::is_following(db, viewer, &author.id)?;

    Ok(ProfileFeed {
        post_count: page.total_items,
        author: convert::user(author),
        following,
        page,
    })
}

/// Profile page at the standard page size.
pub fn profile(db: &Database, viewer: &Viewer, username: &str, page_number: u32) -> Result<ProfileFeed> {
    list_author(db, viewer, username, page_number, PAGE_SIZE)
}

fn load_post(db: &Database, id: &str) -> Result<Post> {
    db.get_post(id)?
        .map(convert::post)
        .ok_or_else(|| BlogError::NotFound(format!("post {}", id)))
}

fn post_not_found(id: Uuid) -> BlogError {
    BlogError::NotFound(format!("post {}", id))
}

fn resolve_group(db: &Database, id: Uuid, errors: &mut FieldErrors) -> Result<Option<String>> {
    let id = id.to_string();
    if db.get_group_by_id(&id)?.is_some() {
        Ok(Some(id))
    } else {
        errors.add("group", INVALID_GROUP);
        Ok(None)
    }
}

fn check_image(reference: &str, errors: &mut FieldErrors) {
    if !media::is_valid_reference(reference) {
        errors.add("image", INVALID_IMAGE);
    }
}
