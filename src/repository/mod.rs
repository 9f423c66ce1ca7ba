pub mod archive;
pub mod database;

pub use archive::{ArchiveStore, PairtreeArchive};
pub use database::{
    LastErrorRecord, MySqlRepository, NamespaceInfo, QueueInfo, QueueStatus, RepositoryError,
    RepositoryStore, Table, WatchRecord,
};
