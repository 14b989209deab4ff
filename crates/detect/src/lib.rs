//! Content classification for uploaded files.
//!
//! Uploads are classified from their leading bytes first (file signatures,
//! via [`infer`]) and only fall back to the filename's extension when the
//! signature is inconclusive. A file that *is* a PNG is an image even when
//! the client calls it `report.txt`.
//!
//! Streaming uploads only get to look at a bounded prefix before committing
//! to reading the rest; [`AsyncPeekableReader`] buffers that prefix and
//! replays it in front of the remainder exactly once.

pub mod error;
mod kind;
mod peekable;

pub use crate::kind::{FileType, Kind, extension_of};
pub use crate::peekable::AsyncPeekableReader;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing::instrument;

/// Number of leading bytes inspected for signature sniffing.
pub const SNIFF_LEN: usize = 512;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Everything the sync engine needs to know about a file's type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub file_type: FileType,
    pub mime: String,
    /// Extension for the stored object, without the dot. Taken from the
    /// client's filename when it has one, otherwise from the sniffed
    /// signature.
    pub extension: Option<String>,
    /// Whether the type came from the content signature rather than the name.
    pub sniffed: bool,
}

/// Classify content from its leading bytes, its filename and the MIME type
/// the client declared (if any).
///
/// MIME precedence is: sniffed signature, then the declared type, then the
/// extension table, then `application/octet-stream`.
pub fn classify(head: &[u8], filename: &str, declared_mime: Option<&str>) -> Classification {
    let head = &head[..head.len().min(SNIFF_LEN)];
    let sniffed = Kind::sniff(head);
    let by_name = Kind::from_filename(filename);
    let declared_mime = declared_mime.map(str::trim).filter(|m| !m.is_empty());

    let file_type = match (sniffed, by_name) {
        (Some(kind), _) | (None, Some(kind)) => kind.file_type(),
        (None, None) => FileType::Unknown,
    };
    let mime = sniffed
        .map(|k| k.mime)
        .or(declared_mime)
        .or(by_name.map(|k| k.mime))
        .unwrap_or(FALLBACK_MIME)
        .to_string();
    let extension = extension_of(filename).or_else(|| sniffed.map(|k| k.extension.to_string()));
    Classification { file_type, mime, extension, sniffed: sniffed.is_some() }
}

/// Classify by filename only (used when the content is not available, e.g.
/// entries discovered in a remote listing).
pub fn classify_name(filename: &str) -> Classification {
    classify(&[], filename, None)
}

/// Decode pixel dimensions from an image's header bytes.
#[instrument(level = "debug", skip(data), fields(size = data.len()))]
pub fn image_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    let size = imagesize::blob_size(data).or_raise(|| ErrorKind::Dimensions)?;
    let width = u32::try_from(size.width).or_raise(|| ErrorKind::Dimensions)?;
    let height = u32::try_from(size.height).or_raise(|| ErrorKind::Dimensions)?;
    Ok((width, height))
}
