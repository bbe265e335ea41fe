use chrono::{DateTime, Utc};
use serde::Serialize;

/// Guestbook line left on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub author: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}
