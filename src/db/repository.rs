use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Entry, Follow, NewEntry, NewSource, Source, User};

use super::schema::SCHEMA;
use super::store::SourceStore;

const SOURCE_COLUMNS: &str =
    "id, name, url, user_id, last_fetched_at, created_at, updated_at";

const FOLLOW_SELECT: &str = r#"SELECT f.id, f.user_id, f.source_id, u.name, s.name, f.created_at
    FROM source_follows f
    JOIN users u ON f.user_id = u.id
    JOIN sources s ON f.source_id = s.id"#;

const ENTRY_COLUMNS: &str =
    "e.id, e.source_id, e.title, e.url, e.description, e.published_at, e.created_at, e.updated_at";

enum Inserted {
    Row(i64),
    Conflict,
}

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    pub async fn create_user(&self, name: &str) -> Result<User> {
        let name = name.to_string();
        let created_at = Utc::now();
        let stored_name = name.clone();
        let outcome = self
            .conn
            .call(move |conn| {
                insert_or_conflict(
                    conn,
                    "INSERT INTO users (name, created_at) VALUES (?1, ?2)",
                    params![stored_name, format_timestamp(created_at)],
                )
            })
            .await?;

        match outcome {
            Inserted::Row(id) => Ok(User {
                id,
                name,
                created_at,
            }),
            Inserted::Conflict => Err(AppError::InvalidArgument(format!(
                "user {:?} already exists",
                name
            ))),
        }
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let name = name.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, name, created_at FROM users WHERE name = ?1",
                        params![name],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, name, created_at FROM users WHERE id = ?1",
                        params![id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    /// All users, oldest first.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, created_at FROM users ORDER BY id")?;
                let users = stmt
                    .query_map([], user_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    /// Delete every user. Their sources, follows and entries go with them.
    pub async fn delete_all_users(&self) -> Result<usize> {
        let deleted = self
            .conn
            .call(|conn| Ok(conn.execute("DELETE FROM users", [])?))
            .await?;
        Ok(deleted)
    }

    // Source operations

    pub async fn create_source(&self, source: NewSource) -> Result<Source> {
        let now = Utc::now();
        let url = source.url.clone();
        let outcome = self
            .conn
            .call(move |conn| {
                let ts = format_timestamp(now);
                insert_or_conflict(
                    conn,
                    "INSERT INTO sources (name, url, user_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![source.name, source.url, source.user_id, ts],
                )
            })
            .await?;

        match outcome {
            Inserted::Row(_) => self
                .get_source_by_url(&url)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("source {}", url))),
            Inserted::Conflict => Err(AppError::InvalidArgument(format!(
                "a source with url {} already exists",
                url
            ))),
        }
    }

    pub async fn get_source_by_url(&self, url: &str) -> Result<Option<Source>> {
        let url = url.to_string();
        let source = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM sources WHERE url = ?1", SOURCE_COLUMNS);
                let source = conn
                    .query_row(&sql, params![url], source_from_row)
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let source = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM sources WHERE id = ?1", SOURCE_COLUMNS);
                let source = conn
                    .query_row(&sql, params![id], source_from_row)
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let sources = self
            .conn
            .call(|conn| {
                let sql = format!("SELECT {} FROM sources ORDER BY name, id", SOURCE_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let sources = stmt
                    .query_map([], source_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await?;
        Ok(sources)
    }

    // Follow operations

    pub async fn create_follow(&self, user_id: i64, source_id: i64) -> Result<Follow> {
        let now = Utc::now();
        let outcome = self
            .conn
            .call(move |conn| {
                let ts = format_timestamp(now);
                insert_or_conflict(
                    conn,
                    "INSERT INTO source_follows (user_id, source_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                    params![user_id, source_id, ts],
                )
            })
            .await?;

        let id = match outcome {
            Inserted::Row(id) => id,
            Inserted::Conflict => {
                return Err(AppError::InvalidArgument(
                    "already following this feed".to_string(),
                ))
            }
        };

        let follow = self
            .conn
            .call(move |conn| {
                let sql = format!("{} WHERE f.id = ?1", FOLLOW_SELECT);
                let follow = conn.query_row(&sql, params![id], follow_from_row).optional()?;
                Ok(follow)
            })
            .await?;
        follow.ok_or_else(|| AppError::NotFound(format!("follow {}", id)))
    }

    /// Remove a follow. Returns `NotFound` when the user wasn't following.
    pub async fn delete_follow(&self, user_id: i64, source_id: i64) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM source_follows WHERE user_id = ?1 AND source_id = ?2",
                    params![user_id, source_id],
                )?)
            })
            .await?;

        if deleted == 0 {
            return Err(AppError::NotFound(format!(
                "follow of source {} by user {}",
                source_id, user_id
            )));
        }
        Ok(())
    }

    pub async fn list_follows_for_user(&self, user_id: i64) -> Result<Vec<Follow>> {
        let follows = self
            .conn
            .call(move |conn| {
                let sql = format!("{} WHERE f.user_id = ?1 ORDER BY s.name, f.id", FOLLOW_SELECT);
                let mut stmt = conn.prepare(&sql)?;
                let follows = stmt
                    .query_map(params![user_id], follow_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(follows)
            })
            .await?;
        Ok(follows)
    }

    // Entry operations

    /// Newest entries from the sources `user_id` follows.
    pub async fn list_entries_for_user(&self, user_id: i64, limit: usize) -> Result<Vec<Entry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {}
                       FROM entries e
                       JOIN source_follows f ON f.source_id = e.source_id
                       WHERE f.user_id = ?1
                       ORDER BY e.published_at DESC, e.id DESC
                       LIMIT ?2"#,
                    ENTRY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let entries = stmt
                    .query_map(params![user_id, limit], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    pub async fn list_entries_for_source(&self, source_id: i64) -> Result<Vec<Entry>> {
        let entries = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM entries e WHERE e.source_id = ?1 ORDER BY e.id",
                    ENTRY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let entries = stmt
                    .query_map(params![source_id], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    pub async fn count_entries(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl SourceStore for Repository {
    async fn next_source_to_fetch(&self) -> Result<Option<Source>> {
        let source = self
            .conn
            .call(|conn| {
                let sql = format!(
                    "SELECT {} FROM sources ORDER BY last_fetched_at ASC NULLS FIRST, id ASC LIMIT 1",
                    SOURCE_COLUMNS
                );
                let source = conn.query_row(&sql, [], source_from_row).optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    async fn mark_fetched(&self, source_id: i64, at: DateTime<Utc>) -> Result<()> {
        let ts = format_timestamp(at);
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE sources SET last_fetched_at = ?1, updated_at = ?1
                       WHERE id = ?2 AND (last_fetched_at IS NULL OR last_fetched_at <= ?1)"#,
                    params![ts, source_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn insert_entry(&self, entry: NewEntry) -> Result<i64> {
        let url = entry.url.clone();
        let now = format_timestamp(Utc::now());
        let outcome = self
            .conn
            .call(move |conn| {
                insert_or_conflict(
                    conn,
                    r#"INSERT INTO entries (source_id, title, url, description, published_at, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)"#,
                    params![
                        entry.source_id,
                        entry.title,
                        entry.url,
                        entry.description,
                        format_timestamp(entry.published_at),
                        now,
                    ],
                )
            })
            .await?;

        match outcome {
            Inserted::Row(id) => Ok(id),
            Inserted::Conflict => Err(AppError::Duplicate(url)),
        }
    }
}

/// Run an insert, reporting a UNIQUE violation as `Inserted::Conflict`.
fn insert_or_conflict(
    conn: &mut rusqlite::Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> tokio_rusqlite::Result<Inserted> {
    match conn.execute(sql, params) {
        Ok(_) => Ok(Inserted::Row(conn.last_insert_rowid())),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Ok(Inserted::Conflict)
        }
        Err(e) => Err(e.into()),
    }
}

/// Fixed-width UTC text so that lexical order matches time order.
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format, e.g. rows written by hand
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn required_datetime(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    checked_datetime(idx, &text)
}

fn optional_datetime(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| checked_datetime(idx, &text))
        .transpose()
}

fn checked_datetime(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_datetime(text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp {:?}", text).into(),
        )
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: required_datetime(row, 2)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        user_id: row.get(3)?,
        last_fetched_at: optional_datetime(row, 4)?,
        created_at: required_datetime(row, 5)?,
        updated_at: required_datetime(row, 6)?,
    })
}

fn follow_from_row(row: &Row) -> rusqlite::Result<Follow> {
    Ok(Follow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        source_id: row.get(2)?,
        user_name: row.get(3)?,
        source_name: row.get(4)?,
        created_at: required_datetime(row, 5)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        source_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        published_at: required_datetime(row, 5)?,
        created_at: required_datetime(row, 6)?,
        updated_at: required_datetime(row, 7)?,
    })
}
