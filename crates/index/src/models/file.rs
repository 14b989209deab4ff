use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use gitshelf_detect::FileType;
use time::UtcDateTime;

/// One stored object, as known to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub repo_id: i64,
    pub owner_id: i64,
    /// Git blob hash of the raw bytes. Unknown for records learned from push
    /// notifications until the file is imported or uploaded.
    pub content_hash: Option<String>,
    /// Location inside the remote repository.
    pub remote_path: String,
    pub display_name: String,
    pub original_filename: String,
    pub size: u64,
    pub mime: String,
    pub file_type: FileType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

/// A record about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub repo_id: i64,
    pub owner_id: i64,
    pub content_hash: Option<String>,
    pub remote_path: String,
    pub display_name: String,
    pub original_filename: String,
    pub size: u64,
    pub mime: String,
    pub file_type: FileType,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Fields overwritten when an existing record is matched during import.
///
/// Dimensions are always reset, since the importer never downloads content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUpdate {
    pub content_hash: String,
    pub remote_path: String,
    pub display_name: String,
    pub size: u64,
    pub mime: String,
    pub file_type: FileType,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) id: i64,
    pub(crate) repo_id: i64,
    pub(crate) owner_id: i64,
    pub(crate) content_hash: Option<String>,
    pub(crate) remote_path: String,
    pub(crate) display_name: String,
    pub(crate) original_filename: String,
    pub(crate) size: i64,
    pub(crate) mime: String,
    pub(crate) file_type: i64,
    pub(crate) width: Option<i64>,
    pub(crate) height: Option<i64>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let dimension = |value: Option<i64>| {
            value.map(|v| u32::try_from(v).or_raise(|| ErrorKind::InvalidData("image dimension"))).transpose()
        };
        Ok(Self {
            id: row.id,
            repo_id: row.repo_id,
            owner_id: row.owner_id,
            content_hash: row.content_hash,
            remote_path: row.remote_path,
            display_name: row.display_name,
            original_filename: row.original_filename,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            mime: row.mime,
            file_type: u8::try_from(row.file_type)
                .ok()
                .and_then(FileType::from_code)
                .ok_or_raise(|| ErrorKind::InvalidData("file type"))?,
            width: dimension(row.width)?,
            height: dimension(row.height)?,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("update date"))?,
        })
    }
}

/// The object's name inside the repository, i.e. the last segment of its
/// remote path. Push notifications and imports identify records by it.
pub(crate) fn remote_name(remote_path: &str) -> &str {
    remote_path.rsplit_once('/').map_or(remote_path, |(_, name)| name)
}

/// Bind-ready values of a [`NewFileRecord`].
pub(crate) struct NewFileRow<'a> {
    pub(crate) record: &'a NewFileRecord,
    pub(crate) filename: &'a str,
    pub(crate) size: i64,
    pub(crate) file_type: i64,
    pub(crate) width: Option<i64>,
    pub(crate) height: Option<i64>,
}

impl<'a> TryFrom<&'a NewFileRecord> for NewFileRow<'a> {
    type Error = Error;
    fn try_from(record: &'a NewFileRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            record,
            filename: remote_name(&record.remote_path),
            size: i64::try_from(record.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            file_type: i64::from(record.file_type.code()),
            width: record.width.map(i64::from),
            height: record.height.map(i64::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> FileRow {
        FileRow {
            id: 7,
            repo_id: 1,
            owner_id: 42,
            content_hash: Some("3b18e512dba79e4c8300dd08aeb37f8e728b8dad".to_string()),
            remote_path: "files/3b/3b18e512dba79e4c8300dd08aeb37f8e728b8dad.txt".to_string(),
            display_name: "hello.txt".to_string(),
            original_filename: "hello.txt".to_string(),
            size: 12,
            mime: "text/plain".to_string(),
            file_type: 4,
            width: None,
            height: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_remote_name() {
        let path = "files/3b/3b18e512dba79e4c8300dd08aeb37f8e728b8dad.txt";
        assert_eq!(remote_name(path), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad.txt");
        assert_eq!(remote_name("README.md"), "README.md");
    }

    #[test]
    fn test_row_to_model() {
        let model = FileRecord::try_from(row()).unwrap();
        assert_eq!(model.file_type, FileType::Text);
        assert_eq!(model.size, 12);
        assert_eq!(model.created_at.unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_row_with_unknown_type_code() {
        let err = FileRecord::try_from(FileRow { file_type: 9, ..row() }).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("file type")));
    }

    #[test]
    fn test_row_with_negative_size() {
        let err = FileRecord::try_from(FileRow { size: -1, ..row() }).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("file size")));
    }
}
