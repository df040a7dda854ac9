use std::path::Path;

use anyhow::{Result, anyhow};
use plotters::prelude::*;

use crate::qa::timeseries::PivotTable;

const CHART_SIZE: (u32, u32) = (1400, 800);

pub fn chart_title(test_name: &str, release: &str) -> String {
    format!("Evolution of {test_name} issues over time by Lot and Issue Type ({release})")
}

// Log mode plots log10(count); zero counts have no point on that axis.
pub fn plotted_value(count: u64, log_scale: bool) -> Option<f64> {
    match (log_scale, count) {
        (false, count) => Some(count as f64),
        (true, 0) => None,
        (true, count) => Some((count as f64).log10()),
    }
}

fn y_upper_bound(max_value: u64, log_scale: bool) -> f64 {
    if log_scale {
        (max_value.max(1) as f64).log10() + 0.5
    } else {
        max_value as f64 * 1.1 + 1.0
    }
}

fn draw_error(err: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("failed to render chart: {err}")
}

pub fn render_chart(path: &Path, pivot: &PivotTable, title: &str, log_scale: bool) -> Result<()> {
    let date_count = pivot.dates.len();
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(
            -0.5_f64..(date_count as f64 - 0.5),
            0.0_f64..y_upper_bound(pivot.max_value(), log_scale),
        )
        .map_err(draw_error)?;

    let x_labels = |x: &f64| {
        let idx = x.round();
        if (x - idx).abs() > 1e-6 || idx < 0.0 {
            return String::new();
        }
        pivot
            .dates
            .get(idx as usize)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };
    let y_labels = |y: &f64| {
        if log_scale {
            format!("{:.0}", 10_f64.powf(*y))
        } else {
            format!("{y:.0}")
        }
    };

    chart
        .configure_mesh()
        .x_desc("Snapshot date")
        .y_desc(if log_scale { "Issue count (log)" } else { "Issue count" })
        .x_labels(date_count.clamp(1, 12))
        .x_label_formatter(&x_labels)
        .y_label_formatter(&y_labels)
        .draw()
        .map_err(draw_error)?;

    for idx in 0..pivot.columns.len() {
        let style = Palette99::pick(idx).stroke_width(2);
        let points: Vec<(f64, f64)> = pivot
            .series(idx)
            .enumerate()
            .filter_map(|(position, (_, count))| {
                plotted_value(count, log_scale).map(|value| (position as f64, value))
            })
            .collect();

        chart
            .draw_series(LineSeries::new(points, style))
            .map_err(draw_error)?
            .label(pivot.column_label(idx))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(draw_error)?;

    root.present().map_err(draw_error)?;
    Ok(())
}
