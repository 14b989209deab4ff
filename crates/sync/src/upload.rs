//! Content-addressed uploads.
//!
//! Bytes are hashed the way git hashes blobs, so the same content always maps
//! to the same remote path. Within one repository a second upload of the same
//! bytes returns the existing record without touching the remote, unless the
//! caller forces a new copy.

use crate::Context;
use crate::error::{self, ErrorKind, Result};
use crate::repository::{owned, repo_ref};
use exn::ResultExt;
use futures::io::{AsyncRead, AsyncReadExt};
use gitshelf_detect::{AsyncPeekableReader, Classification, FileType, SNIFF_LEN, classify, image_dimensions};
use gitshelf_hash::HashingReader;
use gitshelf_hash::error::ErrorKind as HashErrorKind;
use gitshelf_index::{FileRecord, NewFileRecord, Repository};
use tracing::instrument;

/// What the caller knows about an upload besides its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub owner_id: i64,
    pub repo_id: i64,
    /// Name given by the client. Only the last path component is kept.
    pub filename: String,
    /// MIME type declared by the client, if any.
    pub content_type: Option<String>,
    /// Store a new copy even if the repository already holds these bytes.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub record: FileRecord,
    /// The bytes were already stored; `record` is the existing record.
    pub deduplicated: bool,
}

impl UploadRequest {
    fn filename(&self) -> Result<&str> {
        let name = self.filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
        if name.is_empty() || name == "." || name == ".." {
            exn::bail!(ErrorKind::Validation(format!("invalid filename {:?}", self.filename)));
        }
        Ok(name)
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

fn check_size(ctx: &Context, size: u64) -> Result<()> {
    let limit = ctx.settings.storage.max_upload_bytes;
    if size > limit {
        exn::bail!(ErrorKind::Validation(format!("upload of {size} bytes exceeds the limit of {limit} bytes")));
    }
    Ok(())
}

/// Upload a buffered file.
#[instrument(skip(ctx, content), fields(size = content.len()))]
pub async fn upload(ctx: &Context, request: &UploadRequest, content: &[u8]) -> Result<Uploaded> {
    let filename = request.filename()?;
    check_size(ctx, content.len() as u64)?;
    let repository = owned(ctx, request.repo_id, request.owner_id).await?;
    let hash = gitshelf_hash::compute_bytes(content);
    let head = &content[..content.len().min(SNIFF_LEN)];
    let classification = classify(head, filename, request.content_type());
    store(ctx, request, &repository, filename, hash, classification, content).await
}

/// Upload a raw byte stream of exactly `declared_len` bytes.
///
/// The leading bytes are sniffed first, then replayed in front of the rest
/// of the stream, which is hashed while it is buffered. A stream that is
/// shorter or longer than declared is rejected before anything is written.
#[instrument(skip(ctx, reader))]
pub async fn upload_stream<R>(ctx: &Context, request: &UploadRequest, declared_len: u64, reader: R) -> Result<Uploaded>
where
    R: AsyncRead + Unpin,
{
    let filename = request.filename()?;
    check_size(ctx, declared_len)?;
    let repository = owned(ctx, request.repo_id, request.owner_id).await?;

    let mut peekable = AsyncPeekableReader::new(reader);
    let head = peekable
        .peek(SNIFF_LEN)
        .await
        .or_raise(|| ErrorKind::Validation("could not read upload body".to_string()))?;
    let classification = classify(head, filename, request.content_type());

    let capacity = usize::try_from(declared_len).unwrap_or_default();
    let mut content = Vec::with_capacity(capacity);
    let mut reader = HashingReader::new(peekable.into_reader().take(declared_len.saturating_add(1)), declared_len);
    reader
        .read_to_end(&mut content)
        .await
        .or_raise(|| ErrorKind::Validation("could not read upload body".to_string()))?;
    let hash = reader.finalize().map_err(|e| {
        let kind = match &*e {
            HashErrorKind::SizeMismatch { declared, actual } => {
                ErrorKind::Validation(format!("declared length {declared} but received {actual} bytes"))
            },
            HashErrorKind::Io => ErrorKind::Validation("could not read upload body".to_string()),
        };
        e.raise(kind)
    })?;
    store(ctx, request, &repository, filename, hash, classification, &content).await
}

/// `{root}/{hash[0..2]}/{hash}{suffix}.{ext}`, where the suffix tells forced
/// copies of the same content apart.
fn remote_path(root: &str, hash: &str, copy: u64, extension: Option<&str>) -> String {
    let suffix = match copy {
        0 => String::new(),
        n => format!("-{n}"),
    };
    let extension = extension.map(|e| format!(".{e}")).unwrap_or_default();
    format!("{root}/{}/{hash}{suffix}{extension}", &hash[..2])
}

async fn store(
    ctx: &Context,
    request: &UploadRequest,
    repository: &Repository,
    filename: &str,
    hash: String,
    classification: Classification,
    content: &[u8],
) -> Result<Uploaded> {
    // Held until the record is written, so two uploads of the same bytes
    // cannot both miss the dedup lookup.
    let _guard = ctx.upload_locks.lock((repository.id, hash.clone())).await;

    if !request.force
        && let Some(record) = ctx.files.find_by_hash(repository.id, &hash).await.or_raise(|| ErrorKind::Index)?
    {
        tracing::info!(id = record.id, hash = %hash, "content already stored, skipping upload");
        return Ok(Uploaded { record, deduplicated: true });
    }

    let root = ctx.settings.storage_root();
    let extension = classification.extension.as_deref();
    let mut copy = ctx.files.count_by_hash(repository.id, &hash).await.or_raise(|| ErrorKind::Index)?;
    let mut path = remote_path(root, &hash, copy, extension);
    while ctx.files.find_by_path(repository.id, &path).await.or_raise(|| ErrorKind::Index)?.is_some() {
        copy += 1;
        path = remote_path(root, &hash, copy, extension);
    }

    let credential = ctx.credentials.get(request.owner_id).await?;
    let repo = repo_ref(repository)?;
    ctx.backend
        .upload(&credential, &repo, &path, content, &format!("Upload file: {filename}"))
        .await
        .map_err(|e| error::remote(e, "upload"))?;

    let (width, height) = match classification.file_type {
        FileType::Image => match image_dimensions(content) {
            Ok((width, height)) => (Some(width), Some(height)),
            Err(e) => {
                tracing::debug!(error = %e, path = %path, "could not decode image dimensions");
                (None, None)
            },
        },
        _ => (None, None),
    };
    let record = ctx
        .files
        .insert(&NewFileRecord {
            repo_id: repository.id,
            owner_id: request.owner_id,
            content_hash: Some(hash),
            remote_path: path,
            display_name: filename.to_string(),
            original_filename: filename.to_string(),
            size: content.len() as u64,
            mime: classification.mime,
            file_type: classification.file_type,
            width,
            height,
        })
        .await
        .map_err(error::index)?;
    tracing::info!(id = record.id, path = %record.remote_path, sniffed = classification.sniffed, "file uploaded");
    Ok(Uploaded { record, deduplicated: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, OWNER};
    use gitshelf_config::{Settings, StorageSettings};
    use gitshelf_storage::backend::{MockBackend, Operation};
    use gitshelf_storage::error::ErrorKind as StorageErrorKind;
    use rstest::rstest;

    const HELLO_HASH: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";

    fn request(repo_id: i64, filename: &str, force: bool) -> UploadRequest {
        UploadRequest {
            owner_id: OWNER,
            repo_id,
            filename: filename.to_string(),
            content_type: None,
            force,
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR".to_vec();
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0]);
        data
    }

    #[rstest]
    #[case(0, Some("txt"), "files/3b/3b18e512dba79e4c8300dd08aeb37f8e728b8dad.txt")]
    #[case(2, Some("txt"), "files/3b/3b18e512dba79e4c8300dd08aeb37f8e728b8dad-2.txt")]
    #[case(0, None, "files/3b/3b18e512dba79e4c8300dd08aeb37f8e728b8dad")]
    fn test_remote_path(#[case] copy: u64, #[case] extension: Option<&str>, #[case] expected: &str) {
        assert_eq!(remote_path("files", HELLO_HASH, copy, extension), expected);
    }

    #[rstest]
    #[case("hello.txt", Some("hello.txt"))]
    #[case("../../etc/hello.txt", Some("hello.txt"))]
    #[case("C:\\Users\\octo\\hello.txt", Some("hello.txt"))]
    #[case("uploads/", None)]
    #[case("..", None)]
    fn test_filename(#[case] filename: &str, #[case] expected: Option<&str>) {
        assert_eq!(request(1, filename, false).filename().ok(), expected);
    }

    #[tokio::test]
    async fn test_upload_is_idempotent() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        let first = upload(&h.ctx, &request(repository.id, "hello.txt", false), b"hello world\n").await.unwrap();
        assert!(!first.deduplicated);
        assert_eq!(first.record.content_hash.as_deref(), Some(HELLO_HASH));
        assert_eq!(first.record.remote_path, format!("files/3b/{HELLO_HASH}.txt"));
        assert_eq!(first.record.file_type, FileType::Text);

        let second = upload(&h.ctx, &request(repository.id, "again.txt", false), b"hello world\n").await.unwrap();
        assert!(second.deduplicated);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(h.backend.calls(Operation::Upload), 1);

        let repo = repo_ref(&repository).unwrap();
        assert_eq!(h.backend.paths(&repo).await, vec![first.record.remote_path.clone()]);
    }

    #[tokio::test]
    async fn test_forced_upload_creates_second_copy() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        let first = upload(&h.ctx, &request(repository.id, "hello.txt", false), b"hello world\n").await.unwrap();
        let second = upload(&h.ctx, &request(repository.id, "hello.txt", true), b"hello world\n").await.unwrap();
        assert!(!second.deduplicated);
        assert_ne!(second.record.id, first.record.id);
        assert_eq!(second.record.remote_path, format!("files/3b/{HELLO_HASH}-1.txt"));
        assert_eq!(h.backend.calls(Operation::Upload), 2);
        assert_eq!(h.ctx.files.count_by_hash(repository.id, HELLO_HASH).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_identical_uploads_store_once() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        let req = request(repository.id, "hello.txt", false);
        let (a, b) = tokio::join!(upload(&h.ctx, &req, b"hello world\n"), upload(&h.ctx, &req, b"hello world\n"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.record.id, b.record.id);
        assert!(a.deduplicated != b.deduplicated);
        assert_eq!(h.backend.calls(Operation::Upload), 1);
    }

    #[tokio::test]
    async fn test_sniffed_image_wins_over_extension() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        let data = png(640, 480);
        let uploaded = upload(&h.ctx, &request(repository.id, "notes.txt", false), &data).await.unwrap();
        assert_eq!(uploaded.record.file_type, FileType::Image);
        assert_eq!(uploaded.record.file_type.code(), 1);
        assert_eq!(uploaded.record.mime, "image/png");
        assert_eq!((uploaded.record.width, uploaded.record.height), (Some(640), Some(480)));
        // The client's extension is kept when it gave one.
        assert!(uploaded.record.remote_path.ends_with(".txt"));

        let unnamed = upload(&h.ctx, &request(repository.id, "photo", true), &data).await.unwrap();
        assert!(unnamed.record.remote_path.ends_with("-1.png"));
    }

    #[tokio::test]
    async fn test_undecodable_image_still_uploads() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        // PNG signature, truncated header.
        let data = b"\x89PNG\r\n\x1a\n\0\0".to_vec();
        let uploaded = upload(&h.ctx, &request(repository.id, "broken.png", false), &data).await.unwrap();
        assert_eq!(uploaded.record.file_type, FileType::Image);
        assert_eq!((uploaded.record.width, uploaded.record.height), (None, None));
    }

    #[tokio::test]
    async fn test_missing_credential_uploads_nothing() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        h.ctx.credentials.clear(OWNER).await.unwrap();
        let err = upload(&h.ctx, &request(repository.id, "hello.txt", false), b"hello world\n").await.unwrap_err();
        assert_eq!(*err, ErrorKind::CredentialMissing);
        assert_eq!(h.backend.calls(Operation::Upload), 0);
        assert!(h.ctx.files.find_by_hash(repository.id, HELLO_HASH).await.unwrap().is_none());
    }

    #[rstest]
    #[case(StorageErrorKind::Timeout("upload".into()), ErrorKind::RemoteUnavailable { operation: "upload" })]
    #[case(StorageErrorKind::AlreadyExists("files/3b".into()), ErrorKind::Conflict("files/3b".into()))]
    #[tokio::test]
    async fn test_remote_failure_leaves_no_record(#[case] failure: StorageErrorKind, #[case] expected: ErrorKind) {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        h.backend.fail_next(Operation::Upload, failure).await;
        let err = upload(&h.ctx, &request(repository.id, "hello.txt", false), b"hello world\n").await.unwrap_err();
        assert_eq!(*err, expected);
        assert!(h.ctx.files.find_by_hash(repository.id, HELLO_HASH).await.unwrap().is_none());

        // Nothing is cached about the failure; a retry goes through.
        upload(&h.ctx, &request(repository.id, "hello.txt", false), b"hello world\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_other_owner_cannot_upload() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        let req = UploadRequest { owner_id: OWNER + 1, ..request(repository.id, "hello.txt", false) };
        let err = upload(&h.ctx, &req, b"hello world\n").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Permission(_)));
        assert_eq!(h.backend.calls(Operation::Upload), 0);
    }

    #[tokio::test]
    async fn test_size_limit() {
        let settings = Settings {
            storage: StorageSettings { max_upload_bytes: 8, ..StorageSettings::default() },
            ..Settings::default()
        };
        let h = Harness::with_settings(MockBackend::default(), settings).await;
        let repository = h.linked().await;
        let err = upload(&h.ctx, &request(repository.id, "hello.txt", false), b"hello world\n").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        let body = futures::io::Cursor::new(b"hello world\n".to_vec());
        let err = upload_stream(&h.ctx, &request(repository.id, "hello.txt", false), 12, body).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
    }

    #[tokio::test]
    async fn test_stream_keeps_every_byte() {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        // Longer than the sniffed prefix, and not periodic in it.
        let mut data = png(3, 2);
        data.extend((0..4096u32).map(|i| (i * 7 % 251) as u8));
        let body = futures::io::Cursor::new(data.clone());
        let uploaded =
            upload_stream(&h.ctx, &request(repository.id, "pixel.png", false), data.len() as u64, body).await.unwrap();
        assert_eq!(uploaded.record.content_hash, Some(gitshelf_hash::compute_bytes(&data)));
        assert_eq!(uploaded.record.size, data.len() as u64);
        assert_eq!((uploaded.record.width, uploaded.record.height), (Some(3), Some(2)));
        let repo = repo_ref(&repository).unwrap();
        assert_eq!(h.backend.contents(&repo, &uploaded.record.remote_path).await, Some(data));
    }

    #[rstest]
    #[case(11)]
    #[case(13)]
    #[tokio::test]
    async fn test_stream_length_mismatch(#[case] declared: u64) {
        let h = Harness::new(MockBackend::default()).await;
        let repository = h.linked().await;
        let body = futures::io::Cursor::new(b"hello world\n".to_vec());
        let err = upload_stream(&h.ctx, &request(repository.id, "hello.txt", false), declared, body).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        assert_eq!(h.backend.calls(Operation::Upload), 0);
    }
}
