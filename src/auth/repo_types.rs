use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
///
/// Deliberately not `Serialize`: anything leaving the service goes through
/// [`crate::auth::dto::PublicUser`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,                    // assigned by the store
    pub email: String,              // unique, case-sensitive
    pub password_hash: String,      // Argon2 PHC string
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,            // false blocks login
    pub created_at: OffsetDateTime, // set once on insert
}

/// Fields supplied on signup; the store fills in the rest.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
