use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{FieldValue, PreferenceField, PreferenceStore, StoreError, UserId, UserPreferences};

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// SQLite document store: one row per (user, field)
#[derive(Clone)]
pub struct SqlitePreferenceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePreferenceStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| {
            StoreError::Unavailable(format!("failed to open {}: {}", path.display(), e))
        })?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Preference store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user_preferences (
                user_id INTEGER NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, field)
            );
            ",
        )?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserPreferences>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT field, value FROM user_preferences WHERE user_id = ?1")?;
        let rows = stmt
            .query_map(rusqlite::params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(UserPreferences::from_fields(rows)))
    }

    async fn set_field(
        &self,
        user_id: UserId,
        field: PreferenceField,
        value: FieldValue,
    ) -> Result<(), StoreError> {
        if !value.fits(field) {
            return Err(StoreError::InvalidValue(field));
        }
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_preferences (user_id, field, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, field) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            rusqlite::params![user_id, field.key(), value.encode()],
        )?;
        debug!("Set preference '{}' for user {}", field, user_id);
        Ok(())
    }

    async fn unset_field(&self, user_id: UserId, field: PreferenceField) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "DELETE FROM user_preferences WHERE user_id = ?1 AND field = ?2",
            rusqlite::params![user_id, field.key()],
        )?;
        debug!(
            "Unset preference '{}' for user {} ({} row(s))",
            field, user_id, rows
        );
        Ok(())
    }
}
