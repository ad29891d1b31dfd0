use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use yatube_db::Database;
use yatube_db::models::UserRow;
use yatube_types::api::{Claims, LoginRequest, LoginResponse, SignupRequest, SignupResponse};

use crate::error::{BlogError, FieldErrors, Result};
use crate::middleware::Viewer;
use crate::state::{AppState, run_blocking};

/// Characters Django-style usernames may contain besides letters and digits.
const USERNAME_EXTRA_CHARS: &str = "@.+-_";

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse> {
    let mut errors = FieldErrors::default();
    if req.username.chars().count() < 3 || req.username.chars().count() > 32 {
        errors.add("username", "Username must be between 3 and 32 characters.");
    }
    if !req
        .username
        .chars()
        .all(|c| c.is_alphanumeric() || USERNAME_EXTRA_CHARS.contains(c))
    {
        errors.add("username", "Letters, digits and @/./+/-/_ only.");
    }
    if req.password.len() < 8 {
        errors.add("password", "Password must be at least 8 characters.");
    }
    errors.into_result()?;

    let st = state.clone();
    let (user_id, username) = run_blocking(move || {
        // Check if username is taken
        if st.db.get_user_by_username(&req.username)?.is_some() {
            return Err(BlogError::Conflict(format!("username '{}' is taken", req.username)));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let user_id = insert_user(&st.db, &req.username, &password_hash)?;

        info!("Registered user {}", req.username);
        Ok((user_id, req.username))
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &username)?;

    Ok((StatusCode::CREATED, Json(SignupResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let st = state.clone();
    let user = run_blocking(move || {
        let user = st
            .db
            .get_user_by_username(&req.username)?
            .ok_or(BlogError::Unauthorized)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored password hash is invalid: {}", e))?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| BlogError::Unauthorized)?;

        Ok(user)
    })
    .await?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

/// Store a new user. A concurrent signup that claimed the username first
/// surfaces as `Conflict`, like the up-front check.
fn insert_user(db: &Database, username: &str, password_hash: &str) -> Result<Uuid> {
    let user_id = Uuid::new_v4();
    db.create_user(&user_id.to_string(), username, password_hash)
        .map_err(|e| {
            if yatube_db::is_unique_violation(&e) {
                BlogError::Conflict(format!("username '{}' is taken", username))
            } else {
                BlogError::Internal(e)
            }
        })?;
    Ok(user_id)
}

/// The stored user behind an authenticated viewer.
///
/// A valid token whose user no longer exists counts as anonymous.
pub fn current_user(db: &Database, viewer: &Viewer) -> Result<UserRow> {
    let claims = viewer.require()?;
    db.get_user_by_id(&claims.sub.to_string())?
        .ok_or(BlogError::Unauthorized)
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    #[test]
    fn token_round_trips_through_viewer_decoding() {
        let user_id = Uuid::new_v4();
        let token = create_token("secret", user_id, "leo").unwrap();

        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "leo");

        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        insert_user(&db, "leo", "hash").unwrap();

        assert!(matches!(insert_user(&db, "leo", "hash"), Err(BlogError::Conflict(_))));
        assert!(insert_user(&db, "lev", "hash").is_ok());
    }

    #[test]
    fn anonymous_viewer_has_no_current_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            current_user(&db, &Viewer::anonymous()),
            Err(BlogError::Unauthorized)
        ));
    }

    #[test]
    fn token_for_missing_user_is_unauthorized() {
        let db = Database::open_in_memory().unwrap();
        let viewer = Viewer::authenticated(Claims {
            sub: Uuid::new_v4(),
            username: "ghost".into(),
            exp: usize::MAX,
        });
        assert!(matches!(current_user(&db, &viewer), Err(BlogError::Unauthorized)));
    }
}
