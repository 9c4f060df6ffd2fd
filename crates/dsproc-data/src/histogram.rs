//! Token length histograms rendered as SVG.
//!
//! One subplot per split, at most three per row, with one translucent
//! histogram per feature drawn over a shared range.

use crate::dataset::DatasetDict;
use crate::fields::Field;
use dsproc_core::{DsprocError, Result};
use std::fmt::{self, Write as _};
use std::path::Path;
use tracing::info;

const MAX_COLS: usize = 3;
const CELL_WIDTH: f64 = 600.0;
const CELL_HEIGHT: f64 = 500.0;
const TITLE_HEIGHT: f64 = 50.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 60.0;
const PALETTE: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

/// Counts of `values` in `bins` equal-width buckets spanning `[lo, hi]`.
pub fn bin_counts(values: &[usize], lo: usize, hi: usize, bins: usize) -> Vec<usize> {
    let mut counts = vec![0; bins];
    if bins == 0 {
        return counts;
    }
    let span = (hi - lo).max(1) as f64;
    for &value in values {
        let offset = value.saturating_sub(lo) as f64 / span;
        let bin = ((offset * bins as f64) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    counts
}

/// Grid shape `(rows, cols)` for `num_splits` subplots.
pub fn grid_shape(num_splits: usize) -> (usize, usize) {
    let cols = num_splits.clamp(1, MAX_COLS);
    (num_splits.div_ceil(cols).max(1), cols)
}

/// Render the token length distribution of every split.
pub fn render_svg(features: &[Field], dataset: &DatasetDict, bins: usize) -> Result<String> {
    if bins == 0 {
        return Err(DsprocError::InvalidArgument("bins must be positive".into()));
    }
    if dataset.is_empty() {
        return Err(DsprocError::InvalidArgument("no splits to visualize".into()));
    }

    let splits = dataset
        .iter()
        .map(|(name, split)| {
            let lengths = features
                .iter()
                .map(|&field| split.column_lengths(field))
                .collect::<Result<Vec<_>>>()?;
            Ok((name, lengths))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut svg = String::new();
    write_document(&mut svg, features, &splits, bins)
        .map_err(|e| DsprocError::Serialization(format!("rendering SVG: {}", e)))?;
    Ok(svg)
}

fn write_document(
    svg: &mut String,
    features: &[Field],
    splits: &[(&str, Vec<Vec<usize>>)],
    bins: usize,
) -> fmt::Result {
    let (rows, cols) = grid_shape(splits.len());
    let width = CELL_WIDTH * cols as f64;
    let height = CELL_HEIGHT * rows as f64 + TITLE_HEIGHT;

    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="{}" y="32" font-size="22" text-anchor="middle">Token Length Distribution</text>"#,
        width / 2.0
    )?;

    for (idx, (split_name, lengths)) in splits.iter().enumerate() {
        let x0 = CELL_WIDTH * (idx % cols) as f64;
        let y0 = TITLE_HEIGHT + CELL_HEIGHT * (idx / cols) as f64;
        render_subplot(svg, x0, y0, split_name, features, lengths, bins)?;
    }

    svg.push_str("</svg>\n");
    Ok(())
}

fn render_subplot(
    svg: &mut String,
    x0: f64,
    y0: f64,
    split_name: &str,
    features: &[Field],
    lengths: &[Vec<usize>],
    bins: usize,
) -> fmt::Result {
    let lo = lengths.iter().flatten().copied().min().unwrap_or(0);
    let hi = lengths.iter().flatten().copied().max().unwrap_or(0);
    let counts: Vec<Vec<usize>> = lengths.iter().map(|l| bin_counts(l, lo, hi, bins)).collect();
    let peak = counts.iter().flatten().copied().max().unwrap_or(0).max(1);

    let left = x0 + MARGIN_LEFT;
    let top = y0 + MARGIN_TOP;
    let plot_w = CELL_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = CELL_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let bar_w = plot_w / bins as f64;
    let bottom = top + plot_h;

    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="16" text-anchor="middle">{} split</text>"#,
        left + plot_w / 2.0,
        top - 12.0,
        escape(split_name)
    )?;

    for (feature_idx, feature_counts) in counts.iter().enumerate() {
        let color = PALETTE[feature_idx % PALETTE.len()];
        for (bin, &count) in feature_counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let h = plot_h * count as f64 / peak as f64;
            writeln!(
                svg,
                r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{color}" fill-opacity="0.5" stroke="black" stroke-width="0.5"/>"#,
                left + bar_w * bin as f64,
                bottom - h,
                bar_w,
                h
            )?;
        }
    }

    writeln!(
        svg,
        r#"<path d="M{left} {top} V{bottom} H{}" fill="none" stroke="black"/>"#,
        left + plot_w
    )?;
    writeln!(
        svg,
        r#"<text x="{left}" y="{}" font-size="12" text-anchor="middle">{lo}</text>"#,
        bottom + 16.0
    )?;
    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="12" text-anchor="middle">{hi}</text>"#,
        left + plot_w,
        bottom + 16.0
    )?;
    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="12" text-anchor="end">{peak}</text>"#,
        left - 6.0,
        top + 4.0
    )?;
    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="14" text-anchor="middle">Token Length</text>"#,
        left + plot_w / 2.0,
        bottom + 40.0
    )?;
    writeln!(
        svg,
        r#"<text x="{x}" y="{y}" font-size="14" text-anchor="middle" transform="rotate(-90 {x} {y})">Frequency</text>"#,
        x = x0 + 20.0,
        y = top + plot_h / 2.0
    )?;

    for (feature_idx, field) in features.iter().enumerate() {
        let color = PALETTE[feature_idx % PALETTE.len()];
        let y = top + 10.0 + 18.0 * feature_idx as f64;
        let x = left + plot_w - 170.0;
        writeln!(
            svg,
            r#"<rect x="{x}" y="{y}" width="12" height="12" fill="{color}" fill-opacity="0.5" stroke="black" stroke-width="0.5"/><text x="{}" y="{}" font-size="12">{}</text>"#,
            x + 18.0,
            y + 10.0,
            field.key()
        )?;
    }
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render and write the histogram to `save_path`.
pub fn save_svg(
    features: &[Field],
    dataset: &DatasetDict,
    save_path: impl AsRef<Path>,
    bins: usize,
) -> Result<()> {
    let svg = render_svg(features, dataset, bins)?;
    std::fs::write(save_path.as_ref(), svg)?;
    info!(
        "Saved token length distribution plot to {}",
        save_path.as_ref().display()
    );
    Ok(())
}
