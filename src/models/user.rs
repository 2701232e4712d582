use chrono::{DateTime, Utc};

/// Owner of registered sources. Credentials and sessions live elsewhere.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
