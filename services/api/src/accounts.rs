use kivendi_auth::{Capability, CurrentStaff, JwtService, PasswordService, RoleCapabilities};
use kivendi_common::{AccountType, AppError, Rejection, StaffRole};
use kivendi_database::{Admin, User};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use validator::Validate;

/// Shop name for professional accounts that have one, else first and last name.
pub fn display_name(account_type: &str, first_name: &str, last_name: &str, shop_name: Option<&str>) -> String {
    let professional = matches!(account_type.parse::<AccountType>(), Ok(AccountType::Professional));
    match shop_name.map(str::trim) {
        Some(shop) if professional && !shop.is_empty() => shop.to_string(),
        _ => format!("{} {}", first_name, last_name).trim().to_string(),
    }
}

impl DisplayName for User {
    fn display_name(&self) -> String {
        display_name(&self.account_type, &self.first_name, &self.last_name, self.shop_name.as_deref())
    }
}

pub trait DisplayName {
    fn display_name(&self) -> String;
}

pub async fn load_user<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Blocked or unverified users cannot open conversations or buy boosts.
pub fn ensure_can_transact(user: &User) -> Result<(), AppError> {
    if user.is_blocked {
        return Err(Rejection::AccountBlocked.into());
    }
    if !user.is_verified {
        return Err(Rejection::AccountUnverified.into());
    }
    Ok(())
}

/// Reloads the staff account behind a token and checks it may use `capability`.
/// The role stored in the database wins over the one in the token.
pub async fn require_capability(
    pool: &PgPool,
    staff: CurrentStaff,
    capability: Capability,
) -> Result<Admin, AppError> {
    let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE id = $1")
        .bind(staff.admin_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::Authentication("Staff account no longer exists".to_string()))?;

    if !admin.is_active {
        return Err(AppError::Authorization("Staff account is disabled".to_string()));
    }

    let role: StaffRole = admin.role.parse()?;
    if !role.can(capability) {
        tracing::debug!(admin_id = admin.id, ?capability, "capability denied");
        return Err(Rejection::Forbidden.into());
    }
    Ok(admin)
}

#[derive(Debug, Deserialize, Validate)]
pub struct StaffLoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct StaffLoginResponse {
    pub token: String,
    pub admin: Admin,
}

pub async fn staff_login(
    pool: &PgPool,
    jwt: &JwtService,
    request: StaffLoginRequest,
) -> Result<StaffLoginResponse, AppError> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE lower(email) = lower($1)")
        .bind(request.email.trim())
        .fetch_optional(pool)
        .await?;

    let admin = match admin {
        Some(admin) if PasswordService::verify_password(&request.password, &admin.password_hash) => admin,
        _ => return Err(AppError::Authentication("Invalid email or password".to_string())),
    };

    if !admin.is_active {
        return Err(AppError::Authorization("Staff account is disabled".to_string()));
    }

    let role: StaffRole = admin.role.parse()?;
    let token = jwt.issue_staff_token(admin.id, role)?;
    tracing::info!(admin_id = admin.id, role = role.as_str(), "staff signed in");

    Ok(StaffLoginResponse { token, admin })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(account_type: &str, shop: Option<&str>) -> User {
        User {
            id: 1,
            first_name: "Awa".to_string(),
            last_name: "Dossou".to_string(),
            email: "awa@example.com".to_string(),
            phone: None,
            password_hash: String::new(),
            account_type: account_type.to_string(),
            shop_name: shop.map(str::to_string),
            avatar_url: None,
            is_verified: true,
            is_blocked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn professional_with_shop_uses_shop_name() {
        assert_eq!(user("professional", Some("Boutique Awa")).display_name(), "Boutique Awa");
    }

    #[test]
    fn blank_shop_or_personal_account_uses_full_name() {
        assert_eq!(user("professional", Some("  ")).display_name(), "Awa Dossou");
        assert_eq!(user("professional", None).display_name(), "Awa Dossou");
        assert_eq!(user("personal", Some("Boutique Awa")).display_name(), "Awa Dossou");
    }

    #[test]
    fn blocked_user_is_refused_before_unverified() {
        let mut account = user("personal", None);
        account.is_blocked = true;
        account.is_verified = false;
        let err = ensure_can_transact(&account).unwrap_err();
        assert_eq!(err.error_code(), "ACCOUNT_BLOCKED");

        account.is_blocked = false;
        let err = ensure_can_transact(&account).unwrap_err();
        assert_eq!(err.error_code(), "ACCOUNT_UNVERIFIED");

        account.is_verified = true;
        assert!(ensure_can_transact(&account).is_ok());
    }
}
