//! happypics-store — Emotion history bookkeeping.
//!
//! Two implementations of [`HistoryStore`]: [`VolatileHistory`] lives in a
//! single session and drops consecutive duplicate uploads, [`SqliteHistory`]
//! persists records per authenticated identity.

mod schema;
pub mod sqlite;
pub mod volatile;

use happypics_core::{EmotionScore, HistoryRecord};
use thiserror::Error;

pub use sqlite::SqliteHistory;
pub use volatile::VolatileHistory;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("an identity is required for persistent history")]
    IdentityRequired,
    #[error("history row {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// What `append` did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// Same image bytes as the previous upload; nothing stored.
    DuplicateSuppressed,
}

/// Ordered, append-only history of classification results.
///
/// `identity` scopes every operation in stores that need it and is
/// ignored by stores that don't.
pub trait HistoryStore: Send {
    /// Store one classification result for `image`.
    fn append(
        &mut self,
        identity: Option<&str>,
        image: Vec<u8>,
        result: EmotionScore,
    ) -> Result<AppendOutcome, StoreError>;

    /// All records in scope, in the store's read order.
    fn list(&self, identity: Option<&str>) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Delete every record in scope, returning how many were removed.
    fn clear(&mut self, identity: Option<&str>) -> Result<usize, StoreError>;

    fn count(&self, identity: Option<&str>) -> Result<usize, StoreError> {
        Ok(self.list(identity)?.len())
    }
}
