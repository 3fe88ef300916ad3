//! What a page render returns: history list, toggles and chart data.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use happypics_core::charts::{self, ConfidencePoint, ProportionSlice, TrendSeries};
use happypics_core::{EmotionLabel, HistoryRecord};
use image::imageops::FilterType;
use image::ImageFormat;
use serde::Serialize;

use crate::config::Mode;
use crate::session::ChartToggles;

/// One sidebar entry: "Image N", label and confidence. The picture itself
/// is served by the thumbnail route.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// 1-based position in the listed order.
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub emotion: EmotionLabel,
    pub score: f32,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn list(records: &[HistoryRecord]) -> Vec<Self> {
        records
            .iter()
            .enumerate()
            .map(|(i, r)| HistoryEntry {
                position: i + 1,
                id: r.id,
                emotion: r.emotion,
                score: r.score,
                recorded_at: r.recorded_at,
            })
            .collect()
    }
}

/// Chart data for the toggled charts only. An absent field renders nothing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChartsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Vec<ConfidencePoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proportions: Option<Vec<ProportionSlice>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<Vec<TrendSeries>>,
}

impl ChartsView {
    pub fn derive(records: &[HistoryRecord], toggles: ChartToggles) -> Self {
        Self {
            confidence: toggles
                .confidence
                .then(|| charts::confidence_over_time(records))
                .flatten(),
            proportions: toggles.proportions.then(|| charts::proportions(records)).flatten(),
            trends: toggles.trends.then(|| charts::score_trends(records)).flatten(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub toggles: ChartToggles,
    pub history: Vec<HistoryEntry>,
    pub charts: ChartsView,
}

impl PageView {
    pub fn render(
        mode: Mode,
        identity: Option<String>,
        toggles: ChartToggles,
        records: &[HistoryRecord],
    ) -> Self {
        Self {
            mode,
            identity,
            toggles,
            history: HistoryEntry::list(records),
            charts: ChartsView::derive(records, toggles),
        }
    }
}

/// Scale a stored picture down to `width` pixels wide and encode it as PNG.
pub fn thumbnail(stored_image: &[u8], width: u32) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(stored_image)?;
    let width = width.clamp(1, img.width().max(1));
    let height = ((img.height() as u64 * width as u64) / img.width().max(1) as u64).max(1) as u32;
    let thumb = img.resize_exact(width, height, FilterType::Triangle);

    let mut buf = Cursor::new(Vec::new());
    thumb.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
