use chrono::{DateTime, Utc};

/// A user's subscription to a source, joined with both names for display.
#[derive(Debug, Clone)]
pub struct Follow {
    pub id: i64,
    pub user_id: i64,
    pub source_id: i64,
    pub user_name: String,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
}
