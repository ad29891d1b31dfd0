use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use yatube_types::api::Claims;

use crate::error::{BlogError, Result};
use crate::state::AppState;

/// The identity attached to a request. Anonymous when no valid token was sent.
#[derive(Debug, Clone, Default)]
pub struct Viewer(Option<Claims>);

impl Viewer {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn authenticated(claims: Claims) -> Self {
        Self(Some(claims))
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.0.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }

    /// Claims of an authenticated viewer, `Unauthorized` otherwise.
    pub fn require(&self) -> Result<&Claims> {
        self.0.as_ref().ok_or(BlogError::Unauthorized)
    }
}

/// Decode an optional Bearer token into a `Viewer` extension.
///
/// Never rejects: a missing, malformed or non-Bearer `Authorization` header
/// and an invalid token all yield an anonymous viewer. Routes decide for
/// themselves whether an anonymous viewer is acceptable.
pub async fn resolve_viewer(
    State(state): State<AppState>,
    bearer: std::result::Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Response {
    let viewer = match bearer {
        Ok(TypedHeader(Authorization(bearer))) => match decode_token(&state.jwt_secret, bearer.token()) {
            Ok(claims) => Viewer::authenticated(claims),
            Err(e) => {
                debug!("Ignoring invalid bearer token: {}", e);
                Viewer::anonymous()
            }
        },
        Err(rejection) if rejection.is_missing() => Viewer::anonymous(),
        Err(rejection) => {
            debug!("Ignoring unusable Authorization header: {}", rejection);
            Viewer::anonymous()
        }
    };

    req.extensions_mut().insert(viewer);
    next.run(req).await
}

pub fn decode_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
