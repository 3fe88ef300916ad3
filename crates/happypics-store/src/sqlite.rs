//! SQLite-backed history, scoped by authenticated identity.

use chrono::{DateTime, SecondsFormat, Utc};
use happypics_core::{EmotionLabel, EmotionScore, HistoryRecord};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::schema::SCHEMA;
use crate::{AppendOutcome, HistoryStore, StoreError};

/// Persistent history. Reads return the most recent record first.
///
/// Concurrent writers are serialized by SQLite itself; this type adds no
/// locking of its own.
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    /// Open (creating if needed) the database file and its schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened history database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn require(identity: Option<&str>) -> Result<&str, StoreError> {
    identity
        .filter(|id| !id.trim().is_empty())
        .ok_or(StoreError::IdentityRequired)
}

struct RawRow {
    id: i64,
    identity: String,
    image: Vec<u8>,
    emotion: String,
    score: f64,
    recorded_at: String,
}

impl RawRow {
    fn into_record(self) -> Result<HistoryRecord, StoreError> {
        let id = self.id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let emotion: EmotionLabel = self.emotion.parse().map_err(|e| corrupt(format!("{e}")))?;
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map_err(|e| corrupt(format!("recorded_at: {e}")))?
            .with_timezone(&Utc);

        Ok(HistoryRecord {
            id: Some(self.id),
            identity: Some(self.identity),
            image: self.image,
            emotion,
            score: self.score as f32,
            recorded_at,
        })
    }
}

impl HistoryStore for SqliteHistory {
    fn append(
        &mut self,
        identity: Option<&str>,
        image: Vec<u8>,
        result: EmotionScore,
    ) -> Result<AppendOutcome, StoreError> {
        let identity = require(identity)?;
        let recorded_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        self.conn.execute(
            "INSERT INTO history (identity, image, emotion, score, recorded_at) VALUES (?, ?, ?, ?, ?)",
            params![identity, image, result.label.as_str(), result.score as f64, recorded_at],
        )?;

        tracing::debug!(
            id = self.conn.last_insert_rowid(),
            emotion = %result.label,
            score = result.score,
            "history record stored"
        );
        Ok(AppendOutcome::Inserted)
    }

    fn list(&self, identity: Option<&str>) -> Result<Vec<HistoryRecord>, StoreError> {
        let identity = require(identity)?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, identity, image, emotion, score, recorded_at
            FROM history
            WHERE identity = ?
            ORDER BY id DESC
            "#,
        )?;

        let rows = stmt.query_map([identity], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                identity: row.get(1)?,
                image: row.get(2)?,
                emotion: row.get(3)?,
                score: row.get(4)?,
                recorded_at: row.get(5)?,
            })
        })?;

        let records = rows
            .map(|row| row?.into_record())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn clear(&mut self, identity: Option<&str>) -> Result<usize, StoreError> {
        let identity = require(identity)?;
        let removed = self
            .conn
            .execute("DELETE FROM history WHERE identity = ?", [identity])?;
        tracing::info!(removed, "history cleared");
        Ok(removed)
    }

    fn count(&self, identity: Option<&str>) -> Result<usize, StoreError> {
        let identity = require(identity)?;
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM history WHERE identity = ?",
            [identity],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Option<&str> = Some("alice@example.com");
    const BOB: Option<&str> = Some("bob@example.com");

    fn score(label: EmotionLabel, s: f32) -> EmotionScore {
        EmotionScore::new(label, s).unwrap()
    }

    #[test]
    fn test_list_is_most_recent_first() {
        let mut store = SqliteHistory::open_in_memory().unwrap();
        store.append(ALICE, vec![1], score(EmotionLabel::Happy, 0.9)).unwrap();
        store.append(ALICE, vec![2], score(EmotionLabel::Sad, 0.7)).unwrap();
        store.append(ALICE, vec![3], score(EmotionLabel::Angry, 0.4)).unwrap();

        let records = store.list(ALICE).unwrap();
        let emotions: Vec<EmotionLabel> = records.iter().map(|r| r.emotion).collect();
        assert_eq!(emotions, vec![EmotionLabel::Angry, EmotionLabel::Sad, EmotionLabel::Happy]);
        assert_eq!(records[0].image, vec![3]);
        assert_eq!(records[0].identity.as_deref(), ALICE);
        assert!(records[0].id > records[1].id);
    }

    #[test]
    fn test_no_dedup_in_durable_store() {
        let mut store = SqliteHistory::open_in_memory().unwrap();
        for _ in 0..2 {
            let outcome = store.append(ALICE, vec![7, 7], score(EmotionLabel::Neutral, 0.5)).unwrap();
            assert_eq!(outcome, AppendOutcome::Inserted);
        }
        assert_eq!(store.count(ALICE).unwrap(), 2);
    }

    #[test]
    fn test_identity_scoping() {
        let mut store = SqliteHistory::open_in_memory().unwrap();
        store.append(ALICE, vec![1], score(EmotionLabel::Happy, 0.9)).unwrap();
        store.append(BOB, vec![2], score(EmotionLabel::Fear, 0.6)).unwrap();
        store.append(BOB, vec![3], score(EmotionLabel::Fear, 0.3)).unwrap();

        assert_eq!(store.list(ALICE).unwrap().len(), 1);
        assert_eq!(store.list(BOB).unwrap().len(), 2);
    }

    #[test]
    fn test_clear_only_touches_own_identity() {
        let mut store = SqliteHistory::open_in_memory().unwrap();
        store.append(ALICE, vec![1], score(EmotionLabel::Happy, 0.9)).unwrap();
        store.append(BOB, vec![2], score(EmotionLabel::Sad, 0.2)).unwrap();

        assert_eq!(store.clear(ALICE).unwrap(), 1);
        assert!(store.list(ALICE).unwrap().is_empty());
        assert_eq!(store.list(BOB).unwrap().len(), 1);
    }

    #[test]
    fn test_identity_required() {
        let mut store = SqliteHistory::open_in_memory().unwrap();
        let err = store.append(None, vec![1], score(EmotionLabel::Happy, 0.9)).unwrap_err();
        assert!(matches!(err, StoreError::IdentityRequired));
        assert!(matches!(store.list(Some("  ")).unwrap_err(), StoreError::IdentityRequired));
        assert!(matches!(store.clear(None).unwrap_err(), StoreError::IdentityRequired));
    }

    #[test]
    fn test_records_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        {
            let mut store = SqliteHistory::open(&path).unwrap();
            store.append(ALICE, vec![0xFF, 0xD8], score(EmotionLabel::Surprise, 0.77)).unwrap();
        }

        let store = SqliteHistory::open(&path).unwrap();
        let records = store.list(ALICE).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].emotion, EmotionLabel::Surprise);
        assert_eq!(records[0].image, vec![0xFF, 0xD8]);
        assert!((records[0].score - 0.77).abs() < 1e-6);
    }

    #[test]
    fn test_corrupt_label_reported() {
        let store = SqliteHistory::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO history (identity, image, emotion, score, recorded_at) VALUES (?, ?, ?, ?, ?)",
                params!["alice@example.com", vec![1u8], "bored", 0.5, "2024-01-01T00:00:00Z"],
            )
            .unwrap();

        let err = store.list(ALICE).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_score_out_of_range_rejected_by_schema() {
        let store = SqliteHistory::open_in_memory().unwrap();
        let result = store.conn.execute(
            "INSERT INTO history (identity, image, emotion, score, recorded_at) VALUES (?, ?, ?, ?, ?)",
            params!["alice@example.com", vec![1u8], "happy", 1.5, "2024-01-01T00:00:00Z"],
        );
        assert!(result.is_err());
    }
}
