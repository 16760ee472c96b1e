use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::AppError;

pub const SESSION_COOKIE: &str = "session_token";
const TOKEN_LENGTH: usize = 64;

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub user_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub token: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbUserSession> for UserSession {
    type Error = AppError;

    fn try_from(session: DbUserSession) -> Result<Self, Self::Error> {
        let missing = |field: &str| AppError::Internal(format!("session row is missing {}", field));

        Ok(Self {
            id: session.id.ok_or_else(|| missing("id"))?,
            user_id: session.user_id.ok_or_else(|| missing("user_id"))?,
            token: session.token.ok_or_else(|| missing("token"))?,
            created_at: session.created_at.unwrap_or_else(Utc::now),
            expires_at: session.expires_at.ok_or_else(|| missing("expires_at"))?,
        })
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}
