mod models;
mod permission;

pub use models::*;
pub use permission::Permission;

/// All timestamps in the system are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
