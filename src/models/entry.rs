use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl NewEntry {
    /// Build an entry, treating an empty description as absent.
    pub fn new(
        source_id: i64,
        title: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let description = description.into();
        Self {
            source_id,
            title: title.into(),
            url: url.into(),
            description: (!description.is_empty()).then_some(description),
            published_at,
        }
    }
}
