//! In-memory history for the unauthenticated variant.

use chrono::Utc;
use happypics_core::{EmotionScore, HistoryRecord};

use crate::{AppendOutcome, HistoryStore, StoreError};

/// Session-lifetime history in insertion order.
///
/// Remembers only the image bytes of the last stored upload: re-submitting
/// the same picture right after itself stores nothing, while any other
/// picture in between makes it storable again.
#[derive(Debug, Default)]
pub struct VolatileHistory {
    records: Vec<HistoryRecord>,
    last_uploaded: Option<Vec<u8>>,
}

impl VolatileHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop the last-upload cache but keep every record.
    pub fn forget_last_upload(&mut self) {
        self.last_uploaded = None;
    }
}

impl HistoryStore for VolatileHistory {
    fn append(
        &mut self,
        _identity: Option<&str>,
        image: Vec<u8>,
        result: EmotionScore,
    ) -> Result<AppendOutcome, StoreError> {
        if self.last_uploaded.as_deref() == Some(image.as_slice()) {
            tracing::debug!("same image as previous upload, not stored");
            return Ok(AppendOutcome::DuplicateSuppressed);
        }

        self.records.push(HistoryRecord {
            id: None,
            identity: None,
            image: image.clone(),
            emotion: result.label,
            score: result.score,
            recorded_at: Utc::now(),
        });
        self.last_uploaded = Some(image);
        Ok(AppendOutcome::Inserted)
    }

    fn list(&self, _identity: Option<&str>) -> Result<Vec<HistoryRecord>, StoreError> {
        Ok(self.records.clone())
    }

    fn clear(&mut self, _identity: Option<&str>) -> Result<usize, StoreError> {
        let removed = self.records.len();
        self.records.clear();
        self.last_uploaded = None;
        Ok(removed)
    }

    fn count(&self, _identity: Option<&str>) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}
