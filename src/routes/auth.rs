use crate::{
    db::users as db_users,
    error::AppError,
    middleware::auth::{clear_session_cookie, set_session_cookie, AuthUser, CurrentUser},
    models::user::*,
    routes::{parse_body, AppState},
    services::password::{hash_password, verify_password},
};
use axum::{
    body::Bytes,
    extract::State,
    response::Redirect,
    Json,
};
use serde_json::{json, Value};
use tower_cookies::Cookies;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let req: LoginRequest = parse_body(&body, AppError::InvalidInput)?;
    if !looks_like_email(&req.email) {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }

    let user = db_users::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    // A row with an email always has a hash; treat anything else as a failed login.
    let stored_hash = user
        .password_hash
        .as_deref()
        .ok_or(AppError::InvalidCredentials)?;
    if !verify_password(&req.password, stored_hash) {
        return Err(AppError::InvalidCredentials);
    }

    set_session_cookie(&cookies, &state, &user.id);
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(json!({ "ok": true })))
}

/// Attaches credentials to the caller's guest account. The user id never changes,
/// so every session created as a guest stays with the account.
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    AuthUser { user_id }: AuthUser,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let req: RegisterRequest = parse_body(&body, AppError::InvalidInput)?;
    if !looks_like_email(&req.email) {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if db_users::find_by_email(&state.pool, &req.email).await?.is_some() {
        return Err(AppError::EmailTaken);
    }

    let user = db_users::find_by_id(&state.pool, &user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !user.is_guest() {
        return Err(AppError::AlreadyRegistered);
    }

    let password_hash = hash_password(&req.password)?;
    // Lost a race with another register call on the same account.
    if !db_users::set_credentials(&state.pool, &user_id, &req.email, &password_hash).await? {
        return Err(AppError::AlreadyRegistered);
    }

    set_session_cookie(&cookies, &state, &user_id);
    tracing::info!(%user_id, "guest account registered");
    Ok(Json(json!({ "ok": true })))
}

pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Redirect {
    clear_session_cookie(&cookies, state.cookie_secure);
    Redirect::to(&format!("{}/", state.app_base_url))
}

pub async fn me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<MeResponse>, AppError> {
    let Some(user_id) = current.user_id else {
        return Ok(Json(MeResponse { user: None }));
    };

    let user = db_users::find_by_id(&state.pool, &user_id).await?;
    Ok(Json(MeResponse {
        user: user.map(MeUser::from),
    }))
}

/// `local@domain.tld` with no whitespace.
fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{cookie_pair, TestApp};

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email("a@b.co"));
        assert!(looks_like_email("first.last@mail.example.com"));
        assert!(!looks_like_email("no-at-sign"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("a@localhost"));
        assert!(!looks_like_email("a b@example.com"));
        assert!(!looks_like_email("a@@example.com"));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let app = TestApp::new("http://unused").await;
        let guest = app.guest_cookie().await;

        let (status, set_cookie, body) = app
            .call(
                "POST",
                "/api/auth/register",
                Some(&guest),
                Some(json!({ "email": "me@example.com", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "ok": true }));
        assert!(set_cookie.is_some());

        let (_, _, me) = app.call("GET", "/api/me", Some(&guest), None).await;
        assert_eq!(me["user"]["email"], json!("me@example.com"));
        assert_eq!(me["user"]["isGuest"], json!(false));

        let (status, set_cookie, _) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "me@example.com", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, 200);
        let login_cookie = cookie_pair(&set_cookie.unwrap());
        let (_, _, me_again) = app.call("GET", "/api/me", Some(&login_cookie), None).await;
        assert_eq!(me_again["user"]["id"], me["user"]["id"]);
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password_and_unknown_email() {
        let app = TestApp::new("http://unused").await;
        let guest = app.guest_cookie().await;
        app.call(
            "POST",
            "/api/auth/register",
            Some(&guest),
            Some(json!({ "email": "me@example.com", "password": "correct horse" })),
        )
        .await;

        let (status, _, body) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "me@example.com", "password": "wrong horse" })),
            )
            .await;
        assert_eq!(status, 401);
        assert_eq!(body["error"]["code"], json!("invalid_credentials"));

        let (status, _, _) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "nobody@example.com", "password": "whatever1" })),
            )
            .await;
        assert_eq!(status, 401);

        let (status, _, body) = app
            .call("POST", "/api/auth/login", None, Some(json!({ "email": "x" })))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], json!("invalid_input"));
    }

    #[tokio::test]
    async fn test_register_with_taken_email_changes_nothing() {
        let app = TestApp::new("http://unused").await;
        let first = app.guest_cookie().await;
        let second = app.guest_cookie().await;

        app.call(
            "POST",
            "/api/auth/register",
            Some(&first),
            Some(json!({ "email": "taken@example.com", "password": "password1" })),
        )
        .await;

        let (status, _, body) = app
            .call(
                "POST",
                "/api/auth/register",
                Some(&second),
                Some(json!({ "email": "taken@example.com", "password": "password2" })),
            )
            .await;
        assert_eq!(status, 409);
        assert_eq!(body["error"]["code"], json!("email_taken"));

        let (_, _, first_me) = app.call("GET", "/api/me", Some(&first), None).await;
        assert_eq!(first_me["user"]["email"], json!("taken@example.com"));
        let (_, _, second_me) = app.call("GET", "/api/me", Some(&second), None).await;
        assert_eq!(second_me["user"]["isGuest"], json!(true));
        assert_eq!(second_me["user"]["email"], Value::Null);

        // The original owner's password is untouched.
        let (status, _, _) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "taken@example.com", "password": "password1" })),
            )
            .await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let app = TestApp::new("http://unused").await;

        let (status, _, _) = app
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "email": "me@example.com", "password": "password1" })),
            )
            .await;
        assert_eq!(status, 401);

        let guest = app.guest_cookie().await;
        let (status, _, body) = app
            .call(
                "POST",
                "/api/auth/register",
                Some(&guest),
                Some(json!({ "email": "me@example.com", "password": "short" })),
            )
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], json!("invalid_input"));

        app.call(
            "POST",
            "/api/auth/register",
            Some(&guest),
            Some(json!({ "email": "me@example.com", "password": "password1" })),
        )
        .await;
        let (status, _, body) = app
            .call(
                "POST",
                "/api/auth/register",
                Some(&guest),
                Some(json!({ "email": "other@example.com", "password": "password1" })),
            )
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], json!("already_registered"));
    }

    #[tokio::test]
    async fn test_me_and_logout() {
        let app = TestApp::new("http://unused").await;

        let (status, _, body) = app.call("GET", "/api/me", None, None).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "user": null }));

        let (_, _, body) = app
            .call("GET", "/api/me", Some("kettei_session=forged.deadbeef"), None)
            .await;
        assert_eq!(body, json!({ "user": null }));

        let guest = app.guest_cookie().await;
        let (_, _, body) = app.call("GET", "/api/me", Some(&guest), None).await;
        assert_eq!(body["user"]["isGuest"], json!(true));

        let (status, set_cookie, _) = app.call("POST", "/api/auth/logout", Some(&guest), None).await;
        assert_eq!(status, 303);
        let set_cookie = set_cookie.unwrap();
        assert!(set_cookie.starts_with("kettei_session=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }
}
