//! Follow manager: directed subscriptions between users and the personalised
//! feed built from them.

use tracing::info;
use uuid::Uuid;

use yatube_db::models::UserRow;
use yatube_db::{Database, FeedView};
use yatube_types::api::Page;
use yatube_types::models::{Follow, Post};

use crate::auth::current_user;
use crate::convert;
use crate::error::{BlogError, Result};
use crate::feed::paginate;
use crate::middleware::Viewer;

/// Subscribe the viewer to `username`. Following someone twice returns the
/// existing edge.
pub fn follow(db: &Database, viewer: &Viewer, username: &str) -> Result<Follow> {
    let user = current_user(db, viewer)?;
    let author = find_author(db, username)?;

    if user.id == author.id {
        return Err(BlogError::invalid("author", "You cannot follow yourself."));
    }

    if db.insert_follow(&Uuid::new_v4().to_string(), &user.id, &author.id)? {
        info!("{} now follows {}", user.username, author.username);
    }

    let edge = db
        .get_follow(&user.id, &author.id)?
        .ok_or_else(|| anyhow::anyhow!("follow {} -> {} vanished after insert", user.id, author.id))?;
    Ok(convert::follow(edge))
}

/// Remove the viewer's edge to `username`. Returns whether one existed.
pub fn unfollow(db: &Database, viewer: &Viewer, username: &str) -> Result<bool> {
    let user = current_user(db, viewer)?;
    let author = find_author(db, username)?;

    let removed = db.delete_follow(&user.id, &author.id)?;
    if removed {
        info!("{} unfollowed {}", user.username, author.username);
    }
    Ok(removed)
}

/// Anonymous viewers follow nobody.
pub fn is_following(db: &Database, viewer: &Viewer, author_id: &str) -> Result<bool> {
    match viewer.claims() {
        Some(claims) => Ok(db.follow_exists(&claims.sub.to_string(), author_id)?),
        None => Ok(false),
    }
}

pub fn following_feed(db: &Database, viewer: &Viewer, page_number: u32, page_size: u32) -> Result<Page<Post>> {
    let user = current_user(db, viewer)?;
    paginate(db, FeedView::Following(&user.id), page_number, page_size)
}

fn find_author(db: &Database, username: &str) -> Result<UserRow> {
    db.get_user_by_username(username)?
        .ok_or_else(|| BlogError::NotFound(format!("user '{}'", username)))
}
