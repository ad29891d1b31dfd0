use crate::Database;
use crate::models::{CommentRow, FollowRow, GroupRow, PostRow, UserRow};
use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row, types::ToSql};

/// Timestamp format used for every `created_at` column. Fixed width with
/// microseconds, so lexical order is chronological order.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The post sequences a feed can be built from. Every variant is returned
/// newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedView<'a> {
    Global,
    Group(&'a str),
    Author(&'a str),
    /// Posts by every author the given user follows.
    Following(&'a str),
}

impl<'a> FeedView<'a> {
    /// Extra JOIN, WHERE clause and bound parameter for this view.
    fn filter(&self) -> (&'static str, &'static str, Option<&'a str>) {
        match *self {
            FeedView::Global => ("", "", None),
            FeedView::Group(id) => ("", "WHERE p.group_id = ?1", Some(id)),
            FeedView::Author(id) => ("", "WHERE p.author_id = ?1", Some(id)),
            FeedView::Following(id) => (
                "JOIN follows f ON f.author_id = p.author_id",
                "WHERE f.user_id = ?1",
                Some(id),
            ),
        }
    }
}

const POST_COLUMNS: &str = "p.id, p.text, p.created_at, p.author_id, u.username, p.group_id, g.title, g.slug, p.image";

const POST_FROM: &str = "FROM posts p
         JOIN users u ON u.id = p.author_id
         LEFT JOIN blog_groups g ON g.id = p.group_id";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, timestamp_now()),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Groups --

    pub fn create_group(&self, id: &str, title: &str, slug: &str, description: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO blog_groups (id, title, slug, description) VALUES (?1, ?2, ?3, ?4)",
                (id, title, slug, description),
            )?;
            Ok(())
        })
    }

    pub fn get_group_by_slug(&self, slug: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| query_group(conn, "slug", slug))
    }

    pub fn get_group_by_id(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| query_group(conn, "id", id))
    }

    /// Admin action. Posts in the group survive with `group_id` cleared.
    pub fn delete_group(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM blog_groups WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        id: &str,
        author_id: &str,
        text: &str,
        group_id: Option<&str>,
        image: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, text, created_at, author_id, group_id, image) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, text, timestamp_now(), author_id, group_id, image],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, id))
    }

    /// Overwrite the mutable columns of a post and return the stored row.
    /// `created_at` and `author_id` are never touched. Returns `None` if the
    /// post does not exist.
    pub fn update_post(
        &self,
        id: &str,
        text: &str,
        group_id: Option<&str>,
        image: Option<&str>,
    ) -> Result<Option<PostRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE posts SET text = ?1, group_id = ?2, image = ?3 WHERE id = ?4",
                rusqlite::params![text, group_id, image, id],
            )?;
            let row = if changed == 0 { None } else { query_post(&tx, id)? };
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn count_posts(&self, view: FeedView<'_>) -> Result<u64> {
        self.with_conn(|conn| count_posts_in(conn, view))
    }

    /// One window of a feed, newest first.
    pub fn list_posts(&self, view: FeedView<'_>, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| list_posts_in(conn, view, limit, offset))
    }

    /// Count `view` and fetch the window chosen by `window` under one lock,
    /// so the total and the rows describe the same state.
    ///
    /// `window` maps the total to `(value, limit, offset)`; its error aborts
    /// the read before any rows are fetched. A zero limit fetches nothing.
    pub fn feed_window<T, E, W>(&self, view: FeedView<'_>, window: W) -> std::result::Result<(u64, T, Vec<PostRow>), E>
    where
        W: FnOnce(u64) -> std::result::Result<(T, u32, u32), E>,
        E: From<anyhow::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("DB lock poisoned: {}", e))?;

        let total = count_posts_in(&conn, view)?;
        let (value, limit, offset) = window(total)?;
        let rows = if limit == 0 {
            vec![]
        } else {
            list_posts_in(&conn, view, limit, offset)?
        };
        Ok((total, value, rows))
    }

    // -- Comments --

    pub fn insert_comment(&self, id: &str, post_id: &str, author_id: &str, text: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, author_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, post_id, author_id, text, timestamp_now()],
            )?;
            Ok(())
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.author_id, u.username, c.text, c.created_at
                 FROM comments c
                 JOIN users u ON u.id = c.author_id
                 WHERE c.id = ?1",
            )?;
            let row = stmt.query_row([id], comment_from_row).optional()?;
            Ok(row)
        })
    }

    /// Comments on a post, oldest first.
    pub fn get_comments(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.author_id, u.username, c.text, c.created_at
                 FROM comments c
                 JOIN users u ON u.id = c.author_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.rowid ASC",
            )?;
            let rows = stmt
                .query_map([post_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_comments(&self, post_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM comments WHERE post_id = ?1", [post_id], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    // -- Follows --

    /// Insert a follow edge unless one already exists for the pair.
    /// Returns true if a row was created. The UNIQUE(user_id, author_id)
    /// constraint absorbs concurrent duplicates.
    pub fn insert_follow(&self, id: &str, user_id: &str, author_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (id, user_id, author_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user_id, author_id, timestamp_now()],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns true if an edge was removed.
    pub fn delete_follow(&self, user_id: &str, author_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE user_id = ?1 AND author_id = ?2",
                [user_id, author_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn get_follow(&self, user_id: &str, author_id: &str) -> Result<Option<FollowRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, author_id, created_at FROM follows WHERE user_id = ?1 AND author_id = ?2",
                [user_id, author_id],
                |row| {
                    Ok(FollowRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        author_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn follow_exists(&self, user_id: &str, author_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = ?1 AND author_id = ?2)",
                [user_id, author_id],
                |r| r.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn count_follows(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM follows WHERE user_id = ?1", [user_id], |r| r.get(0))?;
            Ok(count as u64)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let column = match column {
        "id" | "username" => column,
        other => return Err(anyhow!("Cannot look up users by {}", other)),
    };
    let sql = format!("SELECT id, username, password, created_at FROM users WHERE {} = ?1", column);

    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_group(conn: &Connection, column: &str, value: &str) -> Result<Option<GroupRow>> {
    let column = match column {
        "id" | "slug" => column,
        other => return Err(anyhow!("Cannot look up groups by {}", other)),
    };
    let sql = format!("SELECT id, title, slug, description FROM blog_groups WHERE {} = ?1", column);

    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row([value], |row| {
            Ok(GroupRow {
                id: row.get(0)?,
                title: row.get(1)?,
                slug: row.get(2)?,
                description: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn count_posts_in(conn: &Connection, view: FeedView<'_>) -> Result<u64> {
    let (join, filter, param) = view.filter();
    let sql = format!("SELECT COUNT(*) FROM posts p {} {}", join, filter);

    let count: i64 = match param {
        Some(p) => conn.query_row(&sql, [p], |r| r.get(0))?,
        None => conn.query_row(&sql, [], |r| r.get(0))?,
    };
    Ok(count as u64)
}

fn list_posts_in(conn: &Connection, view: FeedView<'_>, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
    let (join, filter, param) = view.filter();
    let limit = limit as i64;
    let offset = offset as i64;

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(3);
    if let Some(p) = param.as_ref() {
        params.push(p);
    }
    let first = params.len() + 1;
    params.push(&limit);
    params.push(&offset);

    let sql = format!(
        "SELECT {} {} {} {}
         ORDER BY p.created_at DESC, p.rowid DESC
         LIMIT ?{} OFFSET ?{}",
        POST_COLUMNS,
        POST_FROM,
        join,
        filter,
        first,
        first + 1
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params.as_slice(), post_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// True when `err` is SQLite rejecting a duplicate in a UNIQUE column.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn query_post(conn: &Connection, id: &str) -> Result<Option<PostRow>> {
    let sql = format!("SELECT {} {} WHERE p.id = ?1", POST_COLUMNS, POST_FROM);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], post_from_row).optional()?;
    Ok(row)
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        text: row.get(1)?,
        created_at: row.get(2)?,
        author_id: row.get(3)?,
        author_username: row.get(4)?,
        group_id: row.get(5)?,
        group_title: row.get(6)?,
        group_slug: row.get(7)?,
        image: row.get(8)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
