use serde::{Deserialize, Serialize};

/// email/password_hash가 모두 None이면 게스트 계정입니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_guest(&self) -> bool {
        self.email.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(rename = "isGuest")]
    pub is_guest: bool,
}

impl From<User> for MeUser {
    fn from(user: User) -> Self {
        Self {
            is_guest: user.is_guest(),
            id: user.id,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Option<MeUser>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}
