use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies,
};

use crate::{
    db::users as db_users,
    error::AppError,
    routes::AppState,
    services::token::{TokenCodec, SESSION_TTL_DAYS},
};

pub const SESSION_COOKIE: &str = "kettei_session";

/// Identity of the caller, if the session cookie carries a valid, unexpired token.
///
/// Never rejects on a bad cookie: a missing, expired and tampered token all read as `None`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Option<String>,
}

impl CurrentUser {
    pub fn require(self) -> Result<String, AppError> {
        self.user_id.ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(msg.to_string()))?;

        Ok(CurrentUser {
            user_id: resolve(&cookies, &state.tokens),
        })
    }
}

/// Like `CurrentUser`, but rejects with 401 when there is no identity.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = CurrentUser::from_request_parts(parts, state)
            .await?
            .require()?;
        Ok(AuthUser { user_id })
    }
}

pub fn resolve(cookies: &Cookies, codec: &TokenCodec) -> Option<String> {
    let cookie = cookies.get(SESSION_COOKIE)?;
    codec
        .decode(cookie.value(), Utc::now().timestamp())
        .map(|claims| claims.user_id)
}

pub fn set_session_cookie(cookies: &Cookies, state: &AppState, user_id: &str) {
    let token = state.tokens.issue(user_id, Utc::now().timestamp());
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(state.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::days(SESSION_TTL_DAYS))
        .build();
    cookies.add(cookie);
}

pub fn clear_session_cookie(cookies: &Cookies, secure: bool) {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::ZERO)
        .build();
    cookies.add(cookie);
}

/// Returns the caller's user id, provisioning a guest account (and cookie) when there is none.
///
/// A valid token whose user row no longer exists is treated like no token.
pub async fn get_or_create_user(
    state: &AppState,
    cookies: &Cookies,
    current: CurrentUser,
) -> Result<String, AppError> {
    if let Some(user_id) = current.user_id {
        if db_users::find_by_id(&state.pool, &user_id).await?.is_some() {
            return Ok(user_id);
        }
        tracing::warn!(%user_id, "session cookie refers to an unknown user");
    }

    let guest = db_users::create_guest(&state.pool).await?;
    tracing::info!(user_id = %guest.id, "provisioned guest user");
    set_session_cookie(cookies, state, &guest.id);
    Ok(guest.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{cookie_pair, TestApp};
    use serde_json::json;

    fn attributes(set_cookie: &str) -> Vec<&str> {
        set_cookie.split("; ").skip(1).collect()
    }

    #[tokio::test]
    async fn test_guest_cookie_attributes() {
        let app = TestApp::new("http://unused").await;
        let (status, set_cookie, _) = app.call("POST", "/api/sessions", None, Some(json!({}))).await;
        assert_eq!(status, 200);
        let set_cookie = set_cookie.expect("guest cookie issued");

        assert!(set_cookie.starts_with(&format!("{SESSION_COOKIE}=")));
        let attrs = attributes(&set_cookie);
        assert!(attrs.contains(&"HttpOnly"), "{set_cookie}");
        assert!(attrs.contains(&"SameSite=Lax"), "{set_cookie}");
        assert!(attrs.contains(&"Path=/"), "{set_cookie}");
        assert!(attrs.contains(&"Max-Age=2592000"), "{set_cookie}");
        assert!(!attrs.contains(&"Secure"), "{set_cookie}");
    }

    #[tokio::test]
    async fn test_secure_flag_follows_config() {
        let app = TestApp::with_secure_cookies("http://unused").await;
        let (_, set_cookie, _) = app.call("POST", "/api/sessions", None, Some(json!({}))).await;
        let set_cookie = set_cookie.expect("guest cookie issued");

        let attrs = attributes(&set_cookie);
        assert!(attrs.contains(&"Secure"), "{set_cookie}");
        assert!(attrs.contains(&"HttpOnly"), "{set_cookie}");
        assert!(attrs.contains(&"Max-Age=2592000"), "{set_cookie}");
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_provisions_new_guest() {
        let app = TestApp::new("http://unused").await;
        let token = app.state.tokens.issue("vanished-user", Utc::now().timestamp());
        let stale = format!("{SESSION_COOKIE}={token}");

        // The token itself is valid, only the user row is missing.
        let (_, _, body) = app.call("GET", "/api/me", Some(&stale), None).await;
        assert_eq!(body, json!({ "user": null }));

        let (status, set_cookie, created) = app
            .call("POST", "/api/sessions", Some(&stale), Some(json!({})))
            .await;
        assert_eq!(status, 200);
        let fresh = cookie_pair(&set_cookie.expect("replacement cookie issued"));
        assert_ne!(fresh, stale);

        let (_, _, body) = app.call("GET", "/api/me", Some(&fresh), None).await;
        let user_id = body["user"]["id"].as_str().unwrap();
        assert_ne!(user_id, "vanished-user");
        assert_eq!(body["user"]["isGuest"], json!(true));

        let (_, _, list) = app.call("GET", "/api/sessions", Some(&fresh), None).await;
        assert_eq!(list[0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_known_user_keeps_cookie() {
        let app = TestApp::new("http://unused").await;
        let cookie = app.guest_cookie().await;

        let (status, set_cookie, _) = app
            .call("POST", "/api/sessions", Some(&cookie), Some(json!({})))
            .await;
        assert_eq!(status, 200);
        assert!(set_cookie.is_none());
    }
}
