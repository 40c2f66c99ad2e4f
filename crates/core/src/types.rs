/// All upload timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Format of the second-resolution stamp prefixed to stored uploads.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
