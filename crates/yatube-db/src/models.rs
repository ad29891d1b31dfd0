//! Raw SQLite rows. Ids and timestamps stay as stored text; the API crate
//! parses them into `yatube_types` models.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct GroupRow {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post joined with its author's username and its group, if any.
pub struct PostRow {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub author_id: String,
    pub author_username: String,
    pub group_id: Option<String>,
    pub group_title: Option<String>,
    pub group_slug: Option<String>,
    pub image: Option<String>,
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub text: String,
    pub created_at: String,
}

pub struct FollowRow {
    pub id: String,
    pub user_id: String,
    pub author_id: String,
    pub created_at: String,
}
