use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use kivendi_common::{AppError, JwtConfig, StaffRole};
use serde::{Deserialize, Serialize};

/// Who a token was issued to. End-users and staff live in separate tables,
/// so their ids overlap and must never be confused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    User,
    Staff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user or admin id
    pub kind: TokenKind,
    pub role: Option<StaffRole>,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    fn new(subject: i64, kind: TokenKind, role: Option<StaffRole>, config: &JwtConfig) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(config.expiration_hours as i64);

        Self {
            sub: subject.to_string(),
            kind,
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: config.issuer.clone(),
        }
    }

    pub fn subject_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Authentication("Invalid subject in token".to_string()))
    }
}

#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_issuer(&[config.issuer.as_str()]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    pub fn issue_user_token(&self, user_id: i64) -> Result<String, AppError> {
        self.generate_token(&Claims::new(user_id, TokenKind::User, None, &self.config))
    }

    pub fn issue_staff_token(&self, admin_id: i64, role: StaffRole) -> Result<String, AppError> {
        self.generate_token(&Claims::new(admin_id, TokenKind::Staff, Some(role), &self.config))
    }

    fn generate_token(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> JwtService {
        JwtService::new(JwtConfig {
            secret: secret.to_string(),
            expiration_hours: 1,
            issuer: "kivendi".to_string(),
        })
    }

    #[test]
    fn user_token_round_trip() {
        let jwt = service("secret");
        let token = jwt.issue_user_token(10).unwrap();
        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.kind, TokenKind::User);
        assert_eq!(claims.subject_id().unwrap(), 10);
        assert!(claims.role.is_none());
    }

    #[test]
    fn staff_token_carries_role() {
        let jwt = service("secret");
        let token = jwt.issue_staff_token(3, StaffRole::Moderator).unwrap();
        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.kind, TokenKind::Staff);
        assert_eq!(claims.role, Some(StaffRole::Moderator));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = service("one").issue_user_token(1).unwrap();
        let err = service("two").validate_token(&token).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }
}
