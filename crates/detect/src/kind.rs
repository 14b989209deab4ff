use derive_more::Display;
use std::path::Path;

/// Coarse file classifier, stored as a small integer code.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileType {
    #[default]
    #[display("unknown")]
    Unknown = 0,
    #[display("image")]
    Image = 1,
    #[display("video")]
    Video = 2,
    #[display("audio")]
    Audio = 3,
    #[display("text")]
    Text = 4,
    #[display("other")]
    Other = 5,
}

impl FileType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Unknown,
            1 => Self::Image,
            2 => Self::Video,
            3 => Self::Audio,
            4 => Self::Text,
            5 => Self::Other,
            _ => return None,
        })
    }

    /// Classify by the top-level part of a MIME type.
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or_default() {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" => Self::Text,
            "" => Self::Unknown,
            _ => Self::Other,
        }
    }
}

/// A recognised content kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kind {
    pub mime: &'static str,
    /// Canonical extension, without the leading dot.
    pub extension: &'static str,
}

impl Kind {
    pub fn file_type(&self) -> FileType {
        FileType::from_mime(self.mime)
    }

    /// Identify content from its leading bytes (file signature).
    pub fn sniff(head: &[u8]) -> Option<Self> {
        infer::get(head).map(|t| Self {
            mime: t.mime_type(),
            extension: t.extension(),
        })
    }

    /// Identify content from a filename's extension alone.
    pub fn from_filename(filename: impl AsRef<Path>) -> Option<Self> {
        let extension = extension_of(filename)?;
        Self::from_extension(&extension)
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let (mime, extension) = match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => ("image/jpeg", "jpg"),
            "png" => ("image/png", "png"),
            "gif" => ("image/gif", "gif"),
            "webp" => ("image/webp", "webp"),
            "avif" => ("image/avif", "avif"),
            "svg" => ("image/svg+xml", "svg"),
            "mp4" => ("video/mp4", "mp4"),
            "avi" => ("video/x-msvideo", "avi"),
            "mov" => ("video/quicktime", "mov"),
            "mkv" => ("video/x-matroska", "mkv"),
            "webm" => ("video/webm", "webm"),
            "mp3" => ("audio/mpeg", "mp3"),
            "wav" => ("audio/x-wav", "wav"),
            "ogg" => ("audio/ogg", "ogg"),
            "m4a" => ("audio/m4a", "m4a"),
            "flac" => ("audio/x-flac", "flac"),
            "txt" => ("text/plain", "txt"),
            "md" => ("text/markdown", "md"),
            "html" => ("text/html", "html"),
            "css" => ("text/css", "css"),
            "js" => ("text/javascript", "js"),
            "json" => ("text/json", "json"),
            "xml" => ("text/xml", "xml"),
            "yaml" => ("text/yaml", "yaml"),
            "yml" => ("text/yaml", "yml"),
            "csv" => ("text/csv", "csv"),
            "pdf" => ("application/pdf", "pdf"),
            "doc" => ("application/msword", "doc"),
            "docx" => ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
            "xls" => ("application/vnd.ms-excel", "xls"),
            "xlsx" => ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
            "zip" => ("application/zip", "zip"),
            "rar" => ("application/vnd.rar", "rar"),
            "gz" => ("application/gzip", "gz"),
            "tar" => ("application/x-tar", "tar"),
            "7z" => ("application/x-7z-compressed", "7z"),
            _ => return None,
        };
        Some(Self { mime, extension })
    }
}

/// Lowercased extension of a filename, without the dot.
pub fn extension_of(filename: impl AsRef<Path>) -> Option<String> {
    let extension = filename.as_ref().extension()?.to_str()?;
    match extension.is_empty() {
        true => None,
        false => Some(extension.to_ascii_lowercase()),
    }
}
