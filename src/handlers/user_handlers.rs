use crate::api::{AuthenticatedUser, CreatedUser, RegeneratedToken, UserList, UserRecord};
use crate::auth::middleware::{LOGIN_REDIRECT_URL, LOGIN_URL};
use crate::auth::{session, AuthUser};
use crate::error::{AppError, Result};
use crate::forms::api_errors::{map_failure, FormKind};
use crate::forms::{
    language_options, timezone_options, ChangePasswordForm, EditProfileForm, FormErrors,
    LoginForm, RegenerateTokenForm, ResetPasswordForm, SelectOption, SignupForm,
};
use crate::handlers::{render, Nav};
use crate::middleware::csrf::{
    check_form_token, get_or_create_csrf_token, CsrfVerified, CSRF_FAILURE_MESSAGE,
};
use crate::middleware::Locale;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Extension, Form, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, info, warn};

const AUTHENTICATION_FAILED: &str =
    "Authentication failed. Check your email and password, and that your account is verified.";
const OLD_PASSWORD_MISMATCH: &str = "Your old password did not match.";
const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";
const WRONG_PASSWORD: &str = "Incorrect password.";
const RESET_UNAVAILABLE: &str =
    "Password reset is not available yet. Please contact an administrator.";

fn unexpected_status(status: u16) -> String {
    error!("User service answered with unexpected status {}", status);
    format!("Unexpected response from the user service (status {}).", status)
}

/// Logs the user out after the API rejected their token.
async fn expire_session(session: &Session) -> Result<Response> {
    warn!("Auth token rejected by the user service, ending session");
    session::logout(session).await?;
    Ok(Redirect::to(LOGIN_URL).into_response())
}

// --- signup ---

#[derive(Template)]
#[template(path = "user/signup.html")]
struct SignupTemplate {
    nav: Nav,
    csrf_token: String,
    email: String,
    nickname: String,
    timezones: Vec<SelectOption>,
    languages: Vec<SelectOption>,
    errors: FormErrors,
}

async fn render_signup(
    session: &Session,
    status: StatusCode,
    form: &SignupForm,
    errors: FormErrors,
) -> Result<Response> {
    let template = SignupTemplate {
        nav: Nav::from_session(session).await?,
        csrf_token: get_or_create_csrf_token(session).await?,
        email: form.email.clone(),
        nickname: form.nickname.clone(),
        timezones: timezone_options(&form.timezone),
        languages: language_options(&form.language),
        errors,
    };
    render(status, &template)
}

/// GET /user/signup/
pub async fn signup_page(session: Session) -> Result<Response> {
    render_signup(
        &session,
        StatusCode::OK,
        &SignupForm::default(),
        FormErrors::new(),
    )
    .await
}

/// POST /user/signup/
pub async fn signup_handler(
    State(state): State<AppState>,
    csrf_verified: Option<Extension<CsrfVerified>>,
    session: Session,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    if check_form_token(&session, csrf_verified.as_deref(), &form.csrf_token)
        .await
        .is_err()
    {
        let mut errors = FormErrors::new();
        errors.add_non_field(CSRF_FAILURE_MESSAGE);
        return render_signup(&session, StatusCode::FORBIDDEN, &form, errors).await;
    }

    let errors = form.validate();
    if !errors.is_empty() {
        return render_signup(&session, StatusCode::OK, &form, errors).await;
    }

    let response = state.api.create_user(&form.to_new_user()).await?;
    match response.status {
        201 => {
            let created: CreatedUser = response.data()?;
            // Mail delivery is not wired up; the link goes to the log instead
            info!(
                "Created user {}; verification link: /user/verify/?pk={}&code={}",
                created.pk, created.pk, created.verification_code
            );
            Ok(Redirect::to("/user/verify/").into_response())
        }
        400 => {
            let errors = map_failure(FormKind::Signup, &response.failure());
            render_signup(&session, StatusCode::OK, &form, errors).await
        }
        status => {
            let mut errors = FormErrors::new();
            errors.add_non_field(unexpected_status(status));
            render_signup(&session, StatusCode::BAD_GATEWAY, &form, errors).await
        }
    }
}

// --- verify ---

#[derive(Template)]
#[template(path = "user/verify_notice.html")]
struct VerifyNoticeTemplate {
    nav: Nav,
}

#[derive(Template)]
#[template(path = "user/verify_complete.html")]
struct VerifyCompleteTemplate {
    nav: Nav,
    success: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pk: Option<String>,
    code: Option<String>,
}

/// GET /user/verify/
pub async fn verify_handler(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<VerifyQuery>,
) -> Result<Response> {
    let nav = Nav::from_session(&session).await?;

    let (pk, code) = match (query.pk, query.code) {
        (Some(pk), Some(code)) => (pk, code),
        _ => return render(StatusCode::OK, &VerifyNoticeTemplate { nav }),
    };

    let success = match pk.parse::<i64>() {
        Ok(pk) => {
            let response = state.api.verify(pk, &code).await?;
            if response.status != 204 {
                info!(
                    "Verification of user {} failed with status {}",
                    pk, response.status
                );
            }
            response.status == 204
        }
        Err(_) => {
            warn!("Verification link with malformed pk '{}'", pk);
            false
        }
    };

    render(StatusCode::OK, &VerifyCompleteTemplate { nav, success })
}

// --- login / logout ---

#[derive(Template)]
#[template(path = "user/login.html")]
struct LoginTemplate {
    nav: Nav,
    csrf_token: String,
    email: String,
    errors: FormErrors,
}

async fn render_login(
    session: &Session,
    status: StatusCode,
    email: &str,
    errors: FormErrors,
) -> Result<Response> {
    let template = LoginTemplate {
        nav: Nav::from_session(session).await?,
        csrf_token: get_or_create_csrf_token(session).await?,
        email: email.to_string(),
        errors,
    };
    render(status, &template)
}

/// GET /user/login/
pub async fn login_page(session: Session) -> Result<Response> {
    render_login(&session, StatusCode::OK, "", FormErrors::new()).await
}

/// POST /user/login/
pub async fn login_handler(
    State(state): State<AppState>,
    csrf_verified: Option<Extension<CsrfVerified>>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if check_form_token(&session, csrf_verified.as_deref(), &form.csrf_token)
        .await
        .is_err()
    {
        let mut errors = FormErrors::new();
        errors.add_non_field(CSRF_FAILURE_MESSAGE);
        return render_login(&session, StatusCode::FORBIDDEN, &form.email, errors).await;
    }

    let errors = form.validate();
    if !errors.is_empty() {
        return render_login(&session, StatusCode::OK, &form.email, errors).await;
    }

    let response = state
        .api
        .authenticate(form.email.trim(), &form.password)
        .await?;
    match response.status {
        200 => {
            let authenticated: AuthenticatedUser = response.data()?;
            session::login(&session, authenticated.pk, &authenticated.auth_token).await?;
            session::refresh(&session, state.api.as_ref()).await;
            Ok(Redirect::to(LOGIN_REDIRECT_URL).into_response())
        }
        401 => {
            let mut errors = FormErrors::new();
            errors.add_non_field(AUTHENTICATION_FAILED);
            render_login(&session, StatusCode::OK, &form.email, errors).await
        }
        status => {
            let mut errors = FormErrors::new();
            errors.add_non_field(unexpected_status(status));
            render_login(&session, StatusCode::BAD_GATEWAY, &form.email, errors).await
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "user/logged_out.html")]
struct LoggedOutTemplate {
    nav: Nav,
}

/// GET /user/logout/
pub async fn logout_handler(session: Session) -> Result<Response> {
    session::logout(&session).await?;
    Ok(LoggedOutTemplate { nav: Nav::default() }.into_response())
}

// --- change password ---

#[derive(Template)]
#[template(path = "user/password_change_form.html")]
struct PasswordChangeTemplate {
    nav: Nav,
    csrf_token: String,
    errors: FormErrors,
}

#[derive(Template, WebTemplate)]
#[template(path = "user/password_change_done.html")]
struct PasswordChangeDoneTemplate {
    nav: Nav,
}

async fn render_change_password(
    session: &Session,
    status: StatusCode,
    errors: FormErrors,
) -> Result<Response> {
    let template = PasswordChangeTemplate {
        nav: Nav::from_session(session).await?,
        csrf_token: get_or_create_csrf_token(session).await?,
        errors,
    };
    render(status, &template)
}

/// GET /user/change-password/
pub async fn change_password_page(session: Session) -> Result<Response> {
    render_change_password(&session, StatusCode::OK, FormErrors::new()).await
}

/// POST /user/change-password/
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    csrf_verified: Option<Extension<CsrfVerified>>,
    session: Session,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response> {
    if check_form_token(&session, csrf_verified.as_deref(), &form.csrf_token)
        .await
        .is_err()
    {
        let mut errors = FormErrors::new();
        errors.add_non_field(CSRF_FAILURE_MESSAGE);
        return render_change_password(&session, StatusCode::FORBIDDEN, errors).await;
    }

    let errors = form.validate();
    if !errors.is_empty() {
        return render_change_password(&session, StatusCode::OK, errors).await;
    }

    let response = state
        .api
        .change_password(&user.token, &form.old_password, &form.new_password1)
        .await?;
    let (status, errors) = match response.status {
        204 => {
            info!("User {} changed their password", user.pk);
            let nav = Nav::from_session(&session).await?;
            return Ok(PasswordChangeDoneTemplate { nav }.into_response());
        }
        403 => {
            let mut errors = FormErrors::new();
            errors.add("old_password", OLD_PASSWORD_MISMATCH);
            (StatusCode::OK, errors)
        }
        401 => {
            let mut errors = FormErrors::new();
            errors.add_non_field(SESSION_EXPIRED);
            (StatusCode::OK, errors)
        }
        400 => (
            StatusCode::OK,
            map_failure(FormKind::ChangePassword, &response.failure()),
        ),
        status => {
            let mut errors = FormErrors::new();
            errors.add_non_field(unexpected_status(status));
            (StatusCode::BAD_GATEWAY, errors)
        }
    };
    render_change_password(&session, status, errors).await
}

// --- reset password ---

#[derive(Template)]
#[template(path = "user/password_reset_form.html")]
struct PasswordResetTemplate {
    nav: Nav,
    csrf_token: String,
    email: String,
    errors: FormErrors,
    notice: Option<String>,
}

/// GET /user/reset-password/
pub async fn reset_password_page(session: Session) -> Result<Response> {
    let template = PasswordResetTemplate {
        nav: Nav::from_session(&session).await?,
        csrf_token: get_or_create_csrf_token(&session).await?,
        email: String::new(),
        errors: FormErrors::new(),
        notice: None,
    };
    render(StatusCode::OK, &template)
}

/// POST /user/reset-password/
///
/// The user API has no reset endpoint, so a valid submission only explains
/// that resetting is unavailable.
pub async fn reset_password_handler(
    csrf_verified: Option<Extension<CsrfVerified>>,
    session: Session,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response> {
    let token_check =
        check_form_token(&session, csrf_verified.as_deref(), &form.csrf_token).await;
    let (status, errors) = if token_check.is_err() {
        let mut errors = FormErrors::new();
        errors.add_non_field(CSRF_FAILURE_MESSAGE);
        (StatusCode::FORBIDDEN, errors)
    } else {
        (StatusCode::OK, form.validate())
    };

    let notice = if errors.is_empty() {
        Some(RESET_UNAVAILABLE.to_string())
    } else {
        None
    };

    let template = PasswordResetTemplate {
        nav: Nav::from_session(&session).await?,
        csrf_token: get_or_create_csrf_token(&session).await?,
        email: form.email,
        errors,
        notice,
    };
    render(status, &template)
}

// --- API token ---

#[derive(Template)]
#[template(path = "user/api_settings.html")]
struct ApiSettingsTemplate {
    nav: Nav,
    csrf_token: String,
    token: String,
    errors: FormErrors,
    regenerated: bool,
}

async fn render_api_settings(
    session: &Session,
    status: StatusCode,
    token: &str,
    errors: FormErrors,
    regenerated: bool,
) -> Result<Response> {
    let template = ApiSettingsTemplate {
        nav: Nav::from_session(session).await?,
        csrf_token: get_or_create_csrf_token(session).await?,
        token: token.to_string(),
        errors,
        regenerated,
    };
    render(status, &template)
}

/// GET /user/api/
pub async fn api_settings_page(
    Extension(user): Extension<AuthUser>,
    session: Session,
) -> Result<Response> {
    render_api_settings(&session, StatusCode::OK, &user.token, FormErrors::new(), false).await
}

/// POST /user/api/
pub async fn regenerate_token_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    csrf_verified: Option<Extension<CsrfVerified>>,
    session: Session,
    Form(form): Form<RegenerateTokenForm>,
) -> Result<Response> {
    if check_form_token(&session, csrf_verified.as_deref(), &form.csrf_token)
        .await
        .is_err()
    {
        let mut errors = FormErrors::new();
        errors.add_non_field(CSRF_FAILURE_MESSAGE);
        return render_api_settings(&session, StatusCode::FORBIDDEN, &user.token, errors, false)
            .await;
    }

    let errors = form.validate();
    if !errors.is_empty() {
        return render_api_settings(&session, StatusCode::OK, &user.token, errors, false).await;
    }

    let response = state.api.regenerate_token(user.pk, &form.password).await?;
    match response.status {
        200 => {
            let regenerated: RegeneratedToken = response.data()?;
            session::replace_token(&session, &regenerated.auth_token).await?;
            info!("User {} regenerated their API token", user.pk);
            render_api_settings(
                &session,
                StatusCode::OK,
                &regenerated.auth_token,
                FormErrors::new(),
                true,
            )
            .await
        }
        401 => {
            let mut errors = FormErrors::new();
            errors.add("password", WRONG_PASSWORD);
            render_api_settings(&session, StatusCode::OK, &user.token, errors, false).await
        }
        status => {
            let mut errors = FormErrors::new();
            errors.add_non_field(unexpected_status(status));
            render_api_settings(&session, StatusCode::BAD_GATEWAY, &user.token, errors, false)
                .await
        }
    }
}

// --- profiles ---

/// GET /user/
pub async fn detail_self_handler(Extension(user): Extension<AuthUser>) -> Redirect {
    Redirect::to(&format!("/user/{}/", user.pk))
}

/// Display form of a user record.
struct ProfileView {
    pk: i64,
    nickname: String,
    is_active: bool,
    access_level: String,
    timezone: String,
    language: String,
    date_created: String,
    last_login: String,
    /// Wall-clock time in the profile owner's timezone.
    local_time: String,
}

impl ProfileView {
    fn new(record: &UserRecord, viewer: &Locale) -> Self {
        let local_time = match record.timezone.parse::<Tz>() {
            Ok(tz) => Utc::now().with_timezone(&tz).format("%H:%M").to_string(),
            Err(_) => "unknown".to_string(),
        };

        Self {
            pk: record.pk,
            nickname: record.nickname.clone(),
            is_active: record.is_active,
            access_level: record.access_level.to_string(),
            timezone: record.timezone.clone(),
            language: record.language.clone(),
            date_created: viewer.format_timestamp(&record.date_created),
            last_login: record
                .last_login
                .as_deref()
                .map(|t| viewer.format_timestamp(t))
                .unwrap_or_else(|| "never".to_string()),
            local_time,
        }
    }
}

#[derive(Template)]
#[template(path = "user/user_detail.html")]
struct UserDetailTemplate {
    nav: Nav,
    profile: ProfileView,
    is_self: bool,
}

/// GET /user/{pk}/
pub async fn detail_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(locale): Extension<Locale>,
    session: Session,
    Path(pk): Path<String>,
) -> Result<Response> {
    let pk: i64 = pk.parse().map_err(|_| AppError::NotFound)?;

    let response = state.api.get_user(pk, &user.token).await?;
    match response.status {
        200 => {
            let record: UserRecord = response.data()?;
            let template = UserDetailTemplate {
                nav: Nav::from_session(&session).await?,
                profile: ProfileView::new(&record, &locale),
                is_self: record.pk == user.pk,
            };
            render(StatusCode::OK, &template)
        }
        404 => Err(AppError::NotFound),
        401 => expire_session(&session).await,
        status => Err(AppError::UnexpectedStatus(status)),
    }
}

#[derive(Template)]
#[template(path = "user/profile_edit.html")]
struct ProfileEditTemplate {
    nav: Nav,
    csrf_token: String,
    email: String,
    nickname: String,
    timezones: Vec<SelectOption>,
    languages: Vec<SelectOption>,
    errors: FormErrors,
}

async fn render_profile_edit(
    session: &Session,
    status: StatusCode,
    form: &EditProfileForm,
    errors: FormErrors,
) -> Result<Response> {
    let template = ProfileEditTemplate {
        nav: Nav::from_session(session).await?,
        csrf_token: get_or_create_csrf_token(session).await?,
        email: form.email.clone(),
        nickname: form.nickname.clone(),
        timezones: timezone_options(&form.timezone),
        languages: language_options(&form.language),
        errors,
    };
    render(status, &template)
}

/// GET /user/edit/
pub async fn edit_page(State(state): State<AppState>, session: Session) -> Result<Response> {
    match session::fetch_record(&session, state.api.as_ref()).await {
        Ok(Some(record)) => {
            let form = EditProfileForm::from_record(&record);
            render_profile_edit(&session, StatusCode::OK, &form, FormErrors::new()).await
        }
        Ok(None) => Err(AppError::NotFound),
        Err(AppError::UnexpectedStatus(401)) => expire_session(&session).await,
        Err(e) => Err(e),
    }
}

/// POST /user/edit/
pub async fn edit_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    csrf_verified: Option<Extension<CsrfVerified>>,
    session: Session,
    Form(form): Form<EditProfileForm>,
) -> Result<Response> {
    if check_form_token(&session, csrf_verified.as_deref(), &form.csrf_token)
        .await
        .is_err()
    {
        let mut errors = FormErrors::new();
        errors.add_non_field(CSRF_FAILURE_MESSAGE);
        return render_profile_edit(&session, StatusCode::FORBIDDEN, &form, errors).await;
    }

    let errors = form.validate();
    if !errors.is_empty() {
        return render_profile_edit(&session, StatusCode::OK, &form, errors).await;
    }

    let response = state
        .api
        .edit_user(&user.token, &form.to_profile_edit())
        .await?;
    match response.status {
        204 => {
            session::refresh(&session, state.api.as_ref()).await;
            Ok(Redirect::to(LOGIN_REDIRECT_URL).into_response())
        }
        400 => {
            let errors = map_failure(FormKind::EditProfile, &response.failure());
            render_profile_edit(&session, StatusCode::OK, &form, errors).await
        }
        401 => expire_session(&session).await,
        status => {
            let mut errors = FormErrors::new();
            errors.add_non_field(unexpected_status(status));
            render_profile_edit(&session, StatusCode::BAD_GATEWAY, &form, errors).await
        }
    }
}

struct UserRow {
    pk: i64,
    nickname: String,
}

#[derive(Template)]
#[template(path = "user/user_list.html")]
struct UserListTemplate {
    nav: Nav,
    users: Vec<UserRow>,
}

/// GET /user/list/
pub async fn list_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    session: Session,
) -> Result<Response> {
    let response = state.api.list_users(&user.token).await?;
    match response.status {
        200 => {
            let list: UserList = response.data()?;
            let template = UserListTemplate {
                nav: Nav::from_session(&session).await?,
                users: list
                    .users
                    .into_iter()
                    .map(|u| UserRow {
                        pk: u.pk,
                        nickname: u.nickname,
                    })
                    .collect(),
            };
            render(StatusCode::OK, &template)
        }
        401 => expire_session(&session).await,
        status => Err(AppError::UnexpectedStatus(status)),
    }
}
