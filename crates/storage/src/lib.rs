pub mod backend;
pub mod file;
pub mod ltm;
pub mod sqlite;

pub use backend::{CacheEntry, LtmBackend};
pub use file::FileBackend;
pub use ltm::{Clock, Ltm, LtmRecord, LtmStats};
pub use sqlite::SqliteBackend;
