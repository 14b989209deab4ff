use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

/// A linked remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: i64,
    pub owner_id: i64,
    pub display_name: String,
    /// Normalized remote URL (no trailing slash or `.git` suffix).
    pub url: String,
    pub branch: String,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub owner_id: i64,
    pub display_name: String,
    pub url: String,
    pub branch: String,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RepositoryRow {
    id: i64,
    owner_id: i64,
    display_name: String,
    url: String,
    branch: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<RepositoryRow> for Repository {
    type Error = Error;
    fn try_from(row: RepositoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            display_name: row.display_name,
            url: row.url,
            branch: row.branch,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("update date"))?,
        })
    }
}
