//! Linked repositories.

use crate::Database;
use crate::error::{ErrorKind, Result, WriteResultExt};
use crate::models::{NewRepository, Repository, RepositoryRow};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

#[derive(Debug, Clone)]
pub struct RepositoryStore {
    pool: SqlitePool,
}

impl From<&Database> for RepositoryStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl RepositoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns [`ErrorKind::Conflict`] if the owner already linked this URL.
    pub async fn insert(&self, repository: &NewRepository) -> Result<Repository> {
        let row: RepositoryRow = sqlx::query_as(include_str!("../queries/insert_repository.sql"))
            .bind(repository.owner_id)
            .bind(repository.display_name.as_str())
            .bind(repository.url.as_str())
            .bind(repository.branch.as_str())
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&self.pool)
            .await
            .or_raise_write(|| repository.url.clone())?;
        row.try_into()
    }

    pub async fn get(&self, id: i64) -> Result<Option<Repository>> {
        let row: Option<RepositoryRow> = sqlx::query_as(include_str!("../queries/get_repository.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Repository>> {
        let row: Option<RepositoryRow> = sqlx::query_as(include_str!("../queries/get_owned_repository.sql"))
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn find_by_url(&self, owner_id: i64, url: &str) -> Result<Option<Repository>> {
        let row: Option<RepositoryRow> = sqlx::query_as(include_str!("../queries/find_repository_by_url.sql"))
            .bind(owner_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Find the repository whose URL ends in `owner/name`, the way push
    /// notifications identify repositories. Case-insensitive.
    pub async fn find_by_full_name(&self, full_name: &str) -> Result<Option<Repository>> {
        let row: Option<RepositoryRow> = sqlx::query_as(include_str!("../queries/find_repository_by_full_name.sql"))
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Whether any linked repository, of any owner, tracks `branch`.
    pub async fn tracks_branch(&self, branch: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(include_str!("../queries/any_repository_tracks_branch.sql"))
            .bind(branch)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn list(&self, owner_id: i64) -> Result<Vec<Repository>> {
        let rows: Vec<RepositoryRow> = sqlx::query_as(include_str!("../queries/list_repositories.sql"))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Overwrite the mutable fields of an owned repository. Returns `None` if
    /// the owner has no such repository.
    pub async fn update(&self, id: i64, owner_id: i64, changes: &NewRepository) -> Result<Option<Repository>> {
        let row: Option<RepositoryRow> = sqlx::query_as(include_str!("../queries/update_repository.sql"))
            .bind(id)
            .bind(owner_id)
            .bind(changes.display_name.as_str())
            .bind(changes.url.as_str())
            .bind(changes.branch.as_str())
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_optional(&self.pool)
            .await
            .or_raise_write(|| changes.url.clone())?;
        row.map(TryInto::try_into).transpose()
    }

    /// Delete an owned repository and, by cascade, all of its file records.
    pub async fn delete(&self, id: i64, owner_id: i64) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_repository.sql"))
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
