pub const SCHEMA: &str = r#"
-- Classification history, one row per stored upload
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL,          -- authenticated user (email)
    image BLOB NOT NULL,             -- JPEG as stored at upload time
    emotion TEXT NOT NULL,
    score REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
    recorded_at TEXT NOT NULL        -- RFC 3339, UTC
);

CREATE INDEX IF NOT EXISTS idx_history_identity ON history(identity, id);
"#;
