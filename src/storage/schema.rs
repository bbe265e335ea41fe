use rusqlite::Connection;

pub mod tables {
    pub const VOTES: &str = "votes";
    pub const LEDGER_REVISION: &str = "ledger_revision";
    pub const COMMENTS: &str = "comments";

    pub const ALL_TABLES: &[&str] = &[VOTES, LEDGER_REVISION, COMMENTS];
}

pub mod columns {
    pub const URL: &str = "url";
    pub const NAME: &str = "name";
    pub const ARTIST: &str = "artist";
    pub const VOTES_COUNT: &str = "votes";
    pub const VOTED_BY: &str = "voted_by";
    pub const ADDED_AT: &str = "added_at";
    pub const REVISION: &str = "revision";
    pub const AUTHOR: &str = "author";
    pub const COMMENT: &str = "comment";
    pub const CREATED_AT: &str = "created_at";
}

pub use columns::*;
pub use tables::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS votes (
    url TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    artist TEXT NOT NULL,
    votes INTEGER NOT NULL,
    voted_by TEXT NOT NULL,
    added_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_revision (
    revision INTEGER NOT NULL
);

INSERT INTO ledger_revision (revision)
SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM ledger_revision);

CREATE TABLE IF NOT EXISTS comments (
    author TEXT NOT NULL,
    comment TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
