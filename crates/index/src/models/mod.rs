mod config;
mod file;
mod repository;

pub use self::config::ConfigValue;
pub(crate) use self::config::ConfigRow;
pub use self::file::{FileRecord, NewFileRecord, RemoteUpdate};
pub(crate) use self::file::{FileRow, NewFileRow, remote_name};
pub use self::repository::{NewRepository, Repository};
pub(crate) use self::repository::RepositoryRow;
