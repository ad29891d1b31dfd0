//! Row → model conversion. Corrupt ids or timestamps are logged and replaced
//! with defaults instead of failing the whole page.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use yatube_db::models::{CommentRow, FollowRow, GroupRow, PostRow, UserRow};
use yatube_types::models::{AuthorRef, Comment, Follow, Group, GroupRef, Post, User};

fn parse_id(value: &str, what: &str, owner: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on '{}': {}", what, value, owner, e);
        Uuid::default()
    })
}

fn parse_timestamp(value: &str, owner: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite's datetime('now') carry no timezone.
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on '{}': {}", value, owner, e);
            DateTime::default()
        })
}

pub(crate) fn user(row: UserRow) -> User {
    User {
        id: parse_id(&row.id, "id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        username: row.username,
    }
}

pub(crate) fn group(row: GroupRow) -> Group {
    Group {
        id: parse_id(&row.id, "id", &row.id),
        title: row.title,
        slug: row.slug,
        description: row.description,
    }
}

pub(crate) fn post(row: PostRow) -> Post {
    let group = match (row.group_id, row.group_title, row.group_slug) {
        (Some(id), Some(title), Some(slug)) => Some(GroupRef {
            id: parse_id(&id, "group_id", &row.id),
            title,
            slug,
        }),
        _ => None,
    };

    Post {
        id: parse_id(&row.id, "id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        author: AuthorRef {
            id: parse_id(&row.author_id, "author_id", &row.id),
            username: row.author_username,
        },
        group,
        image: row.image,
        text: row.text,
    }
}

pub(crate) fn comment(row: CommentRow) -> Comment {
    Comment {
        id: parse_id(&row.id, "id", &row.id),
        post_id: parse_id(&row.post_id, "post_id", &row.id),
        author: AuthorRef {
            id: parse_id(&row.author_id, "author_id", &row.id),
            username: row.author_username,
        },
        created_at: parse_timestamp(&row.created_at, &row.id),
        text: row.text,
    }
}

pub(crate) fn follow(row: FollowRow) -> Follow {
    Follow {
        id: parse_id(&row.id, "id", &row.id),
        user_id: parse_id(&row.user_id, "user_id", &row.id),
        author_id: parse_id(&row.author_id, "author_id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
    }
}
