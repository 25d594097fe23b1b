use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use kivendi_common::{AppError, StaffRole};

use crate::jwt::{Claims, JwtService, TokenKind};

/// Validates the bearer token, when one is sent, and stores its claims in the
/// request extensions. Requests without a token pass through unauthenticated;
/// the `CurrentUser` and `CurrentStaff` extractors turn that into a 401.
pub async fn auth_middleware(
    State(jwt_service): State<JwtService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers())
        .or_else(|| extract_token_from_query(request.uri().query()));

    if let Some(token) = token {
        let claims = jwt_service.validate_token(&token)?;
        request.extensions_mut().insert(claims);
    }

    Ok(next.run(request).await)
}

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let auth_str = headers.get(AUTHORIZATION)?.to_str().ok()?;
    auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Browsers cannot set headers on a WebSocket upgrade, so `?token=` is accepted too.
fn extract_token_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

fn claims_from_parts(parts: &Parts) -> Result<&Claims, AppError> {
    parts
        .extensions
        .get::<Claims>()
        .ok_or_else(|| AppError::Authentication("Not authenticated".to_string()))
}

/// An authenticated marketplace user.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub user_id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts)?;
        if claims.kind != TokenKind::User {
            return Err(AppError::Authorization("A user token is required".to_string()));
        }
        Ok(Self {
            user_id: claims.subject_id()?,
        })
    }
}

/// An authenticated staff member. Whether the account is still active is
/// checked against the database by the handlers.
#[derive(Debug, Clone, Copy)]
pub struct CurrentStaff {
    pub admin_id: i64,
    pub role: StaffRole,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentStaff
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts)?;
        match (claims.kind, claims.role) {
            (TokenKind::Staff, Some(role)) => Ok(Self {
                admin_id: claims.subject_id()?,
                role,
            }),
            _ => Err(AppError::Authorization("A staff token is required".to_string())),
        }
    }
}
