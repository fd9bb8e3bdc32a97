// ============================================================
// Layer 6 - Prediction Plots
// ============================================================
// One SVG per target parameter:
//
//   x axis   truth
//   y axis   prediction
//   black    identity line
//   blue     vertical error bars (4/12 modes only)
//
// The caption carries the mean percent error.

use anyhow::{Context, Result};
use plotters::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::parameters::CosmoParameter;
use crate::ml::evaluator::{EvaluationSummary, PredictionPoint};

const SIZE: (u32, u32) = (640, 640);

/// Render every parameter's plot into `dir`, returning the written paths.
pub fn render_all(dir: &Path, summary: &EvaluationSummary) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create plot directory '{}'", dir.display()))?;

    summary
        .points
        .iter()
        .zip(&summary.reports)
        .map(|((param, points), report)| {
            let path    = dir.join(format!("{}.svg", param.label()));
            let caption = format!("{}: {:.3} % error", param.label(), report.percent_error);
            render_scatter(&path, *param, &caption, points)?;
            Ok(path)
        })
        .collect()
}

/// Plot range: the prior bounds, widened to include any outlier.
fn axis_range(param: CosmoParameter, points: &[PredictionPoint]) -> (f64, f64) {
    let mut lo = param.min();
    let mut hi = param.max();
    for p in points {
        let spread = p.sigma.unwrap_or(0.0);
        for v in [p.truth, p.prediction - spread, p.prediction + spread] {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
    }
    let pad = 0.05 * (hi - lo);
    (lo - pad, hi + pad)
}

pub fn render_scatter(
    path:    &Path,
    param:   CosmoParameter,
    caption: &str,
    points:  &[PredictionPoint],
) -> Result<()> {
    let (lo, hi) = axis_range(param, points);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(lo..hi, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc("truth")
        .y_desc("prediction")
        .draw()?;

    chart.draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], BLACK.stroke_width(1)))?;

    if points.iter().any(|p| p.sigma.is_some()) {
        chart.draw_series(points.iter().filter_map(|p| {
            p.sigma.map(|s| {
                ErrorBar::new_vertical(
                    p.truth,
                    p.prediction - s,
                    p.prediction,
                    p.prediction + s,
                    BLUE.mix(0.3).stroke_width(1),
                    4,
                )
            })
        }))?;
    }

    chart.draw_series(
        points
            .iter()
            .map(|p| Circle::new((p.truth, p.prediction), 2, RED.mix(0.6).filled())),
    )?;

    root.present()
        .with_context(|| format!("Cannot write plot '{}'", path.display()))?;
    tracing::debug!("Wrote plot '{}'", path.display());
    Ok(())
}
