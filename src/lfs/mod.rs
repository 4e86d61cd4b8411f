mod storage;

pub use storage::{LfsStorage, LfsStorageError, is_valid_oid};
