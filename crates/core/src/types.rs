/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Job identifier. UUIDv7, so ids sort by creation time.
pub type JobId = uuid::Uuid;

/// File name -> file contents. Ordered so serialized file sets are stable.
pub type FileSet = std::collections::BTreeMap<String, String>;
