use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{Comment, Group, Post, User};

// -- JWT Claims --

/// JWT claims issued by the auth endpoints and checked by the viewer middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Posts --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPostRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: Option<Uuid>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Partial update. Absent fields are left untouched; `"group": null` and
/// `"image": null` clear the value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditPostRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub group: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "present")]
    pub image: Option<Option<String>>,
}

fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCommentRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    pub image: String,
    pub size: u64,
}

// -- Feeds --

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// A bounded slice of a feed plus pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_number: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupFeed {
    pub group: Group,
    pub page: Page<Post>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileFeed {
    pub author: User,
    pub post_count: u64,
    pub following: bool,
    pub page: Page<Post>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
    pub author_post_count: u64,
    pub comments: Vec<Comment>,
}
