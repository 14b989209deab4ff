//! Per-user configuration values.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ConfigRow, ConfigValue};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Key/value settings scoped by `(owner, namespace, name)`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl From<&Database> for ConfigStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl ConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, owner_id: i64, namespace: &str, name: &str) -> Result<Option<ConfigValue>> {
        let row: Option<ConfigRow> = sqlx::query_as(include_str!("../queries/get_config.sql"))
            .bind(owner_id)
            .bind(namespace)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Insert or replace a value, including its kind.
    pub async fn set(&self, owner_id: i64, namespace: &str, name: &str, value: &ConfigValue) -> Result<()> {
        sqlx::query(include_str!("../queries/set_config.sql"))
            .bind(owner_id)
            .bind(namespace)
            .bind(name)
            .bind(value.kind())
            .bind(value.encode()?)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Returns `false` if there was nothing to remove.
    pub async fn remove(&self, owner_id: i64, namespace: &str, name: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_config.sql"))
            .bind(owner_id)
            .bind(namespace)
            .bind(name)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let db = Database::connect_in_memory().await.unwrap();
        let config = db.config();
        assert_eq!(config.get(1, "github", "token").await.unwrap(), None);

        config.set(1, "github", "token", &ConfigValue::from("first")).await.unwrap();
        config.set(1, "github", "token", &ConfigValue::from("second")).await.unwrap();
        assert_eq!(config.get(1, "github", "token").await.unwrap(), Some(ConfigValue::from("second")));
        // Scoped by owner.
        assert_eq!(config.get(2, "github", "token").await.unwrap(), None);

        assert!(config.remove(1, "github", "token").await.unwrap());
        assert!(!config.remove(1, "github", "token").await.unwrap());
    }

    #[tokio::test]
    async fn test_kind_survives_round_trip() {
        let db = Database::connect_in_memory().await.unwrap();
        let config = db.config();
        let value = ConfigValue::Json(serde_json::json!({"sizes": [64, 128]}));
        config.set(1, "file", "thumbnails", &value).await.unwrap();
        assert_eq!(config.get(1, "file", "thumbnails").await.unwrap(), Some(value));
        // Overwriting with another kind replaces the tag too.
        config.set(1, "file", "thumbnails", &ConfigValue::Bool(false)).await.unwrap();
        assert_eq!(config.get(1, "file", "thumbnails").await.unwrap(), Some(ConfigValue::Bool(false)));
    }
}
