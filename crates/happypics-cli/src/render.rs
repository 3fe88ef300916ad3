//! Plain-text rendering of history and charts.
//!
//! Every writer is silent for empty input: no heading, no blank line.

use std::io::{self, Write};

use happypics_core::charts::{ConfidencePoint, ProportionSlice, TrendSeries};

use crate::client::{Charts, HistoryEntry};

const BAR_WIDTH: usize = 30;

fn bar(fraction: f64) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(filled)
}

pub fn history(out: &mut impl Write, entries: &[HistoryEntry]) -> io::Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    writeln!(out, "History")?;
    for e in entries {
        writeln!(
            out,
            "  Image {:<3} {:<9} {:.2}  {}",
            e.position,
            e.emotion,
            e.score,
            e.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
    }
    Ok(())
}

pub fn confidence(out: &mut impl Write, points: &[ConfidencePoint]) -> io::Result<()> {
    if points.is_empty() {
        return Ok(());
    }
    writeln!(out, "Confidence over time")?;
    for p in points {
        writeln!(
            out,
            "  {:>3} {:<9} {:.2} {}",
            p.index,
            p.emotion,
            p.score,
            bar(p.score as f64)
        )?;
    }
    Ok(())
}

pub fn proportions(out: &mut impl Write, slices: &[ProportionSlice]) -> io::Result<()> {
    if slices.is_empty() {
        return Ok(());
    }
    writeln!(out, "Emotion proportions")?;
    for s in slices {
        writeln!(
            out,
            "  {:<9} {:>5.1}% ({}) {}",
            s.emotion,
            s.percent,
            s.count,
            bar(s.percent / 100.0)
        )?;
    }
    Ok(())
}

pub fn trends(out: &mut impl Write, series: &[TrendSeries]) -> io::Result<()> {
    if series.is_empty() {
        return Ok(());
    }
    writeln!(out, "Emotion score trends")?;
    for s in series {
        let points: Vec<String> = s
            .points
            .iter()
            .map(|(index, score)| format!("{index}:{score:.2}"))
            .collect();
        writeln!(out, "  {:<9} {}", s.emotion, points.join("  "))?;
    }
    Ok(())
}

/// Render whichever charts the service derived.
pub fn charts(out: &mut impl Write, charts: &Charts) -> io::Result<()> {
    if let Some(points) = &charts.confidence {
        confidence(out, points)?;
    }
    if let Some(slices) = &charts.proportions {
        proportions(out, slices)?;
    }
    if let Some(series) = &charts.trends {
        trends(out, series)?;
    }
    Ok(())
}
