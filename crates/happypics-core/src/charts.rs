//! Chart data derived from a history snapshot.
//!
//! Every projection is a pure function of the ordered record slice and
//! returns `None` for an empty history, so callers render nothing at all.
//! Indices are 1-based upload positions within the given slice.

use crate::types::{EmotionLabel, HistoryRecord};
use serde::{Deserialize, Serialize};

/// One point of the confidence-over-time line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePoint {
    pub index: usize,
    /// Tick label of the point on the x-axis.
    pub emotion: EmotionLabel,
    pub score: f32,
}

/// Share of one emotion in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProportionSlice {
    pub emotion: EmotionLabel,
    pub count: usize,
    /// Percentage of all records, 0–100.
    pub percent: f64,
}

/// Scores of one emotion plotted against upload position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub emotion: EmotionLabel,
    pub points: Vec<(usize, f32)>,
}

/// Confidence of every record in order, labeled by its emotion.
pub fn confidence_over_time(records: &[HistoryRecord]) -> Option<Vec<ConfidencePoint>> {
    if records.is_empty() {
        return None;
    }
    Some(
        records
            .iter()
            .enumerate()
            .map(|(i, r)| ConfidencePoint {
                index: i + 1,
                emotion: r.emotion,
                score: r.score,
            })
            .collect(),
    )
}

/// Record counts per emotion as a percentage distribution.
///
/// Slices are ordered by first appearance of the emotion in `records`.
pub fn proportions(records: &[HistoryRecord]) -> Option<Vec<ProportionSlice>> {
    if records.is_empty() {
        return None;
    }

    let mut counts: Vec<(EmotionLabel, usize)> = Vec::new();
    for record in records {
        match counts.iter_mut().find(|(label, _)| *label == record.emotion) {
            Some((_, n)) => *n += 1,
            None => counts.push((record.emotion, 1)),
        }
    }

    let total = records.len() as f64;
    Some(
        counts
            .into_iter()
            .map(|(emotion, count)| ProportionSlice {
                emotion,
                count,
                percent: count as f64 * 100.0 / total,
            })
            .collect(),
    )
}

/// One series per emotion, in first-appearance order.
///
/// Positions come from one counter shared by all series: each record takes
/// the next position whichever series it joins, so points of different
/// emotions interleave on a common x-axis.
pub fn score_trends(records: &[HistoryRecord]) -> Option<Vec<TrendSeries>> {
    if records.is_empty() {
        return None;
    }

    let mut series: Vec<TrendSeries> = Vec::new();
    for (position, record) in (1..).zip(records) {
        let point = (position, record.score);
        match series.iter_mut().find(|s| s.emotion == record.emotion) {
            Some(s) => s.points.push(point),
            None => series.push(TrendSeries {
                emotion: record.emotion,
                points: vec![point],
            }),
        }
    }
    Some(series)
}
