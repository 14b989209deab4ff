//! File records and push reconciliation.

use crate::Database;
use crate::error::{ErrorKind, Result, WriteResultExt};
use crate::models::{FileRecord, FileRow, NewFileRecord, NewFileRow, RemoteUpdate, remote_name};
use crate::page::{Page, Paginated};
use exn::{OptionExt, ResultExt};
use sqlx::{Sqlite, SqlitePool, Transaction};
use time::UtcDateTime;
use tracing::instrument;

fn now() -> i64 {
    UtcDateTime::now().unix_timestamp()
}

fn bind_new<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    row: &NewFileRow<'q>,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(row.record.repo_id)
        .bind(row.record.owner_id)
        .bind(row.record.content_hash.as_deref())
        .bind(row.record.remote_path.as_str())
        .bind(row.filename)
        .bind(row.record.display_name.as_str())
        .bind(row.record.original_filename.as_str())
        .bind(row.size)
        .bind(row.record.mime.as_str())
        .bind(row.file_type)
        .bind(row.width)
        .bind(row.height)
        .bind(now())
}

/// File records of every repository.
///
/// Two identities coexist on the same rows:
/// - uploads deduplicate on `(repository, content hash)`;
/// - imports and push notifications match on `(repository, remote path)` and
///   fall back to the object's name, the last segment of its remote path.
///   The client's original filename plays no part in matching.
///
/// The `UNIQUE(repo_id, remote_path)` constraint keeps both from producing two
/// live records for one remote object.
#[derive(Debug, Clone)]
pub struct FileIndex {
    pool: SqlitePool,
}

impl From<&Database> for FileIndex {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl FileIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Insert/Update
    // =========================================================================

    /// Insert a new record.
    ///
    /// Returns [`ErrorKind::Conflict`] if the repository already has a record
    /// at the same remote path.
    #[instrument(skip(self, record), fields(repo = record.repo_id, path = %record.remote_path))]
    pub async fn insert(&self, record: &NewFileRecord) -> Result<FileRecord> {
        let row = NewFileRow::try_from(record)?;
        let result = bind_new(sqlx::query(include_str!("../queries/insert_file.sql")), &row)
            .execute(&self.pool)
            .await
            .or_raise_write(|| record.remote_path.clone())?;
        self.get(result.last_insert_rowid()).await?.ok_or_raise(|| ErrorKind::Database)
    }

    /// Overwrite the remote-derived fields of an existing record, resetting
    /// its image dimensions.
    pub async fn update_from_remote(&self, id: i64, update: &RemoteUpdate) -> Result<Option<FileRecord>> {
        let size = i64::try_from(update.size).or_raise(|| ErrorKind::InvalidData("file size"))?;
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/update_file_from_remote.sql"))
            .bind(id)
            .bind(update.content_hash.as_str())
            .bind(update.remote_path.as_str())
            .bind(remote_name(&update.remote_path))
            .bind(update.display_name.as_str())
            .bind(size)
            .bind(update.mime.as_str())
            .bind(i64::from(update.file_type.code()))
            .bind(now())
            .fetch_optional(&self.pool)
            .await
            .or_raise_write(|| update.remote_path.clone())?;
        row.map(TryInto::try_into).transpose()
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    pub async fn get(&self, id: i64) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_file.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Get a record only if it belongs to `owner_id`.
    pub async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_owned_file.sql"))
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// The oldest record in a repository with exactly this content hash.
    pub async fn find_by_hash(&self, repo_id: i64, content_hash: &str) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/find_file_by_hash.sql"))
            .bind(repo_id)
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn count_by_hash(&self, repo_id: i64, content_hash: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_files_by_hash.sql"))
            .bind(repo_id)
            .bind(content_hash)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    pub async fn find_by_path(&self, repo_id: i64, remote_path: &str) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/find_file_by_path.sql"))
            .bind(repo_id)
            .bind(remote_path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Records whose remote object is named `filename`, oldest first.
    pub async fn find_by_filename(&self, repo_id: i64, owner_id: i64, filename: &str) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/find_files_by_filename.sql"))
            .bind(repo_id)
            .bind(owner_id)
            .bind(filename)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// List an owner's records newest first, optionally within one repository.
    pub async fn list(&self, owner_id: i64, repo_id: Option<i64>, page: Page) -> Result<Paginated<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/list_files.sql"))
            .bind(owner_id)
            .bind(repo_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let total: i64 = sqlx::query_scalar(include_str!("../queries/count_files.sql"))
            .bind(owner_id)
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Paginated {
            items: rows.into_iter().map(TryInto::try_into).collect::<Result<Vec<_>>>()?,
            total: u64::try_from(total).or_raise(|| ErrorKind::InvalidData("count"))?,
            page: page.number,
            page_size: page.size,
        })
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a record owned by `owner_id`. Returns `false` if there was none.
    pub async fn delete(&self, id: i64, owner_id: i64) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_owned_file.sql"))
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Start a transaction for applying one push notification.
    ///
    /// Nothing is visible to other readers until [`Reconciliation::commit`];
    /// dropping the reconciliation rolls everything back.
    pub async fn begin_reconciliation(&self) -> Result<Reconciliation> {
        let tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        Ok(Reconciliation { tx })
    }
}

/// All-or-nothing application of remote changes.
pub struct Reconciliation {
    tx: Transaction<'static, Sqlite>,
}

impl Reconciliation {
    /// Record a remote object unless the repository already tracks one at the
    /// same path. Returns whether a row was inserted.
    pub async fn add(&mut self, record: &NewFileRecord) -> Result<bool> {
        let row = NewFileRow::try_from(record)?;
        let result = bind_new(sqlx::query(include_str!("../queries/upsert_remote_file.sql")), &row)
            .execute(&mut *self.tx)
            .await
            .or_raise_write(|| record.remote_path.clone())?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every record of the repository whose remote object is named
    /// `filename`, wherever it lives.
    pub async fn remove_by_filename(&mut self, repo_id: i64, filename: &str) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_files_by_filename.sql"))
            .bind(repo_id)
            .bind(filename)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    /// Point every record whose remote object is named `filename` at
    /// `remote_path`.
    pub async fn relocate_by_filename(&mut self, repo_id: i64, filename: &str, remote_path: &str) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/relocate_files_by_filename.sql"))
            .bind(repo_id)
            .bind(filename)
            .bind(remote_path)
            .bind(remote_name(remote_path))
            .bind(now())
            .execute(&mut *self.tx)
            .await
            .or_raise_write(|| remote_path.to_string())?;
        Ok(result.rows_affected())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.or_raise(|| ErrorKind::Database)
    }
}
