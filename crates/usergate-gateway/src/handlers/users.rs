//! `/api/users` routes.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State, rejection::QueryRejection},
    http::{StatusCode, header::SET_COOKIE},
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use usergate_core::validation::{normalize_email, normalize_name};
use usergate_core::{AccountStatus, PageParams, Role, Rules};
use validator::{Validate, ValidationErrors};

use super::{ImageUpload, ValidatedJson};
use crate::auth::cookie::{clear_session_cookie, session_cookie};
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::{Anonymous, AuthError, Authenticated, PasswordRecovery, RequireAdmin};
use crate::error::ApiError;
use crate::server::AppState;
use crate::store::{Account, PublicAccount, Visibility};

type ApiResult<T> = Result<T, ApiError>;

/// Treat an empty optional email as "clear".
fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Login body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut rules = Rules::new();
        let email = rules.required(
            "email",
            self.email.as_deref().map(str::trim),
            "email is required",
        );
        rules.email("email", email, "email is invalid");
        let password = rules.required("password", self.password.as_deref(), "password is required");
        rules.not_empty("password", password, "password is required");
        rules.finish()
    }
}

/// Admin account creation body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
    /// Secondary email.
    #[serde(default)]
    pub personal_email: Option<String>,
    /// Initial password.
    #[serde(default)]
    pub password: Option<String>,
    /// `admin` or `user`; defaults to `user`.
    #[serde(default)]
    pub role: Option<String>,
}

impl Validate for CreateAccountRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut rules = Rules::new();
        let name = rules.required("name", self.name.as_deref().map(str::trim), "name is required");
        rules.letters("name", name, "name must only contain letters and spaces");
        let email = rules.required(
            "email",
            self.email.as_deref().map(str::trim),
            "email is required",
        );
        rules.email("email", email, "email is invalid");
        rules.email(
            "personalEmail",
            present(self.personal_email.as_ref()),
            "personalEmail is invalid",
        );
        let password = rules.required("password", self.password.as_deref(), "password is required");
        rules.strong_password("password", password);
        rules.one_of("role", self.role.as_deref(), &Role::NAMES, "role must be admin or user");
        rules.finish()
    }
}

/// Profile update body. Other fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New login email.
    #[serde(default)]
    pub email: Option<String>,
    /// New secondary email; empty clears it.
    #[serde(default)]
    pub personal_email: Option<String>,
}

impl Validate for UpdateAccountRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut rules = Rules::new();
        let name = self.name.as_deref().map(str::trim);
        rules.letters("name", name, "name must only contain letters and spaces");
        rules.email("email", self.email.as_deref().map(str::trim), "email is invalid");
        rules.email(
            "personalEmail",
            present(self.personal_email.as_ref()),
            "personalEmail is invalid",
        );
        rules.finish()
    }
}

impl UpdateAccountRequest {
    fn apply(self, account: &mut Account) {
        if let Some(name) = self.name {
            account.name = normalize_name(&name);
        }
        if let Some(email) = self.email {
            account.email = normalize_email(&email);
        }
        if let Some(personal) = self.personal_email {
            let personal = normalize_email(&personal);
            account.personal_email = (!personal.is_empty()).then_some(personal);
        }
        account.updated_at = chrono::Utc::now();
    }
}

/// Password change body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// Password in use.
    #[serde(default)]
    pub current_password: Option<String>,
    /// Replacement.
    #[serde(default)]
    pub new_password: Option<String>,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut rules = Rules::new();
        let current = rules.required(
            "currentPassword",
            self.current_password.as_deref(),
            "currentPassword is required",
        );
        rules.not_empty("currentPassword", current, "currentPassword is required");
        let new = rules.required(
            "newPassword",
            self.new_password.as_deref(),
            "newPassword is required",
        );
        rules.strong_password("newPassword", new);
        rules.finish()
    }
}

/// Forgot-password body.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    /// Email to send the reset link to.
    #[serde(default)]
    pub email: Option<String>,
}

impl Validate for ForgotPasswordRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut rules = Rules::new();
        let email = rules.required(
            "email",
            self.email.as_deref().map(str::trim),
            "email is required",
        );
        rules.email("email", email, "email is invalid");
        rules.finish()
    }
}

/// Reset-password body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Token from the reset link.
    #[serde(default)]
    pub token: Option<String>,
    /// Replacement password.
    #[serde(default)]
    pub new_password: Option<String>,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut rules = Rules::new();
        let token = rules.required("token", self.token.as_deref(), "token is required");
        rules.hex("token", token, "token is invalid");
        let new = rules.required(
            "newPassword",
            self.new_password.as_deref(),
            "newPassword is required",
        );
        rules.strong_password("newPassword", new);
        rules.finish()
    }
}

/// Build the `/api/users` router.
pub fn routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route("/login", post(login))
        .route("/logout", post(logout).get(logout))
        .route("/user", get(current_account).put(update_current_account))
        .route(
            "/user/image",
            put(upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/user/{id}", get(get_account).put(update_account))
        .route("/user/{id}/deactivate", put(deactivate_account))
        .route("/user/{id}/activate", put(activate_account))
        .route("/password", put(change_password))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword", post(reset_password))
}

fn header_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(format!("Invalid cookie header: {e}"))
}

fn own_account(state: &AppState, id: &str) -> ApiResult<Account> {
    state
        .auth
        .accounts
        .find_by_id(id, Visibility::ActiveOnly)?
        .ok_or_else(|| ApiError::Query("Your account no longer exists".to_string()))
}

fn no_user(id: &str) -> ApiError {
    ApiError::Query(format!("No user with id {id}"))
}

async fn login(
    State(state): State<AppState>,
    _anonymous: Anonymous,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(body.email.as_deref().unwrap_or_default());
    let password = body.password.unwrap_or_default();

    if !state.auth.login_limiter.check(&email) {
        tracing::warn!(email = %email, "Login rate limit exceeded");
        return Err(ApiError::RateLimited(
            "Too many login attempts, try again in a minute".to_string(),
        ));
    }

    let identity = state.auth.verifier.verify(&email, &password).await?;
    let issued = state.auth.jwt.issue(&identity)?;
    let cookie = session_cookie(&state.auth.config, &issued.token).map_err(header_error)?;

    tracing::info!(account_id = %identity.id, "Login succeeded");
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

async fn logout(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
) -> ApiResult<impl IntoResponse> {
    state.auth.validator.revoke(&session).await?;
    let cookie = clear_session_cookie(&state.auth.config).map_err(header_error)?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

async fn list_accounts(
    State(state): State<AppState>,
    Authenticated(_session): Authenticated,
    query: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = query.map_err(|e| ApiError::Query(e.body_text()))?;
    let request = params.parse()?;
    let page = state.auth.accounts.list_page(&request)?;
    request.check_bounds(page.count)?;
    Ok(Json(page))
}

async fn create_account(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    ValidatedJson(body): ValidatedJson<CreateAccountRequest>,
) -> ApiResult<impl IntoResponse> {
    let role = match body.role.as_deref() {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| ApiError::InvalidParam(e.to_string()))?,
        None => Role::User,
    };
    let hash = hash_password_blocking(body.password.unwrap_or_default()).await?;
    let personal = present(body.personal_email.as_ref()).map(normalize_email);

    let account = Account::new(
        normalize_name(body.name.as_deref().unwrap_or_default()),
        normalize_email(body.email.as_deref().unwrap_or_default()),
        hash,
        role,
        state.uploads.default_image(),
    )
    .with_personal_email(personal);
    state.auth.accounts.create(&account)?;

    tracing::info!(
        account_id = %account.id,
        created_by = %session.identity.id,
        role = %role,
        "Account created"
    );
    Ok((StatusCode::CREATED, Json(account.to_public())))
}

async fn current_account(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
) -> ApiResult<Json<PublicAccount>> {
    Ok(Json(own_account(&state, session.account_id())?.to_public()))
}

async fn update_current_account(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ValidatedJson(body): ValidatedJson<UpdateAccountRequest>,
) -> ApiResult<StatusCode> {
    let mut account = own_account(&state, session.account_id())?;
    body.apply(&mut account);
    state.auth.accounts.update(&account)?;
    tracing::info!(account_id = %account.id, "Profile updated");
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    upload: ImageUpload,
) -> ApiResult<StatusCode> {
    let account = own_account(&state, session.account_id())?;
    let name = state
        .uploads
        .store(&account.id, &account.image, upload.extension, &upload.bytes)
        .await?;

    match state.auth.accounts.set_image(&account.id, name.clone()) {
        Ok(_) => {
            if name != account.image {
                state.uploads.discard(&account.image).await;
            }
            tracing::info!(account_id = %account.id, file = %name, "Image updated");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            if name != account.image {
                state.uploads.discard(&name).await;
            }
            Err(e.into())
        }
    }
}

async fn get_account(
    State(state): State<AppState>,
    RequireAdmin(_session): RequireAdmin,
    Path(id): Path<String>,
) -> ApiResult<Json<PublicAccount>> {
    let account = state
        .auth
        .accounts
        .find_by_id(&id, Visibility::IncludeDisabled)?
        .ok_or_else(|| no_user(&id))?;
    Ok(Json(account.to_public()))
}

async fn update_account(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateAccountRequest>,
) -> ApiResult<StatusCode> {
    if id == session.account_id() {
        return Err(ApiError::Permission(
            "Use /api/users/user to update your own account".to_string(),
        ));
    }

    let mut account = state
        .auth
        .accounts
        .find_by_id(&id, Visibility::ActiveOnly)?
        .ok_or_else(|| no_user(&id))?;
    body.apply(&mut account);
    state.auth.accounts.update(&account)?;

    tracing::info!(account_id = %id, updated_by = %session.identity.id, "Account updated");
    Ok(StatusCode::NO_CONTENT)
}

async fn change_password(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ValidatedJson(body): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let account = own_account(&state, session.account_id())?;
    let current = body.current_password.unwrap_or_default();
    let new = body.new_password.unwrap_or_default();

    if !verify_password_blocking(current, account.password_hash.clone()).await? {
        return Err(AuthError::IncorrectPassword.into());
    }
    if verify_password_blocking(new.clone(), account.password_hash.clone()).await? {
        return Err(AuthError::PasswordUnchanged.into());
    }

    let hash = hash_password_blocking(new).await?;
    state.auth.accounts.set_password(&account.id, hash)?;
    tracing::info!(account_id = %account.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

async fn forgot_password(
    State(state): State<AppState>,
    _anonymous: Anonymous<PasswordRecovery>,
    ValidatedJson(body): ValidatedJson<ForgotPasswordRequest>,
) -> ApiResult<StatusCode> {
    let email = normalize_email(body.email.as_deref().unwrap_or_default());
    state.auth.reset.forgot(&email).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_password(
    State(state): State<AppState>,
    _anonymous: Anonymous<PasswordRecovery>,
    ValidatedJson(body): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let token = body.token.unwrap_or_default();
    let new = body.new_password.unwrap_or_default();
    state.auth.reset.reset(&token, &new).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    state: &AppState,
    session: &crate::auth::SessionContext,
    id: &str,
    status: AccountStatus,
) -> ApiResult<StatusCode> {
    let verb = match status {
        AccountStatus::Active => "activate",
        AccountStatus::Disabled => "deactivate",
    };
    if id == session.account_id() {
        return Err(ApiError::Permission(format!(
            "You cannot {verb} your own account"
        )));
    }

    let account = state
        .auth
        .accounts
        .find_by_id(id, Visibility::IncludeDisabled)?
        .ok_or_else(|| no_user(id))?;
    if account.status == status {
        return Err(ApiError::Permission(match status {
            AccountStatus::Active => "This user is already active".to_string(),
            AccountStatus::Disabled => "This user is already deactivated".to_string(),
        }));
    }

    state.auth.accounts.set_status(id, status)?;
    tracing::info!(account_id = %id, changed_by = %session.identity.id, "Account {verb}d");
    Ok(StatusCode::NO_CONTENT)
}

async fn deactivate_account(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    set_status(&state, &session, &id, AccountStatus::Disabled).await
}

async fn activate_account(
    State(state): State<AppState>,
    RequireAdmin(session): RequireAdmin,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    set_status(&state, &session, &id, AccountStatus::Active).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use usergate_core::field_messages;

    fn messages(result: Result<(), ValidationErrors>) -> Vec<(String, String)> {
        field_messages(&result.unwrap_err())
            .into_iter()
            .map(|m| (m.field, m.message))
            .collect()
    }

    #[test]
    fn test_login_rules() {
        let bad = LoginRequest {
            email: Some("invalidemail".to_string()),
            password: Some(String::new()),
        };
        assert_eq!(
            messages(bad.validate()),
            vec![
                ("email".to_string(), "email is invalid".to_string()),
                ("password".to_string(), "password is required".to_string()),
            ]
        );

        let good = LoginRequest {
            email: Some(" john@doe.com ".to_string()),
            password: Some("x".to_string()),
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_create_rules() {
        let bad = CreateAccountRequest {
            name: Some("R2D2".to_string()),
            email: None,
            personal_email: Some("nope".to_string()),
            password: Some("weak".to_string()),
            role: Some("root".to_string()),
        };
        let fields: Vec<String> = messages(bad.validate()).into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, ["email", "name", "password", "personalEmail", "role"]);
    }

    #[test]
    fn test_update_rules_and_apply() {
        let clear = UpdateAccountRequest {
            name: Some("  Ada  Lovelace ".to_string()),
            email: None,
            personal_email: Some(String::new()),
        };
        assert!(clear.validate().is_ok());

        let mut account = Account::new("Ada", "ada@x.com", "h", Role::User, "img.jpg")
            .with_personal_email(Some("ada@home.com".to_string()));
        clear.apply(&mut account);
        assert_eq!(account.name, "Ada Lovelace");
        assert_eq!(account.email, "ada@x.com");
        assert!(account.personal_email.is_none());
    }

    #[test]
    fn test_reset_rules() {
        let bad = ResetPasswordRequest {
            token: Some("not-hex".to_string()),
            new_password: Some("Secure#Pass1".to_string()),
        };
        assert_eq!(
            messages(bad.validate()),
            vec![("token".to_string(), "token is invalid".to_string())]
        );
    }
}
