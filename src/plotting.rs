//! SVG rendering of fitted trajectories and the landing-error histogram.

use std::path::{Path, PathBuf};

use log::info;
use plotters::prelude::*;

use crate::error::{CalibrationError, Result};
use crate::report::FitReport;

/// Labels, sizes and destination for rendered plots
#[derive(Debug, Clone, PartialEq)]
pub struct PlotConfig {
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub histogram_title: String,
    pub histogram_x_label: String,
    pub histogram_y_label: String,
    pub font_size: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("plots"),
            width: 1024,
            height: 768,
            title: "Fitted trajectories".to_string(),
            x_label: "Horizontal distance (m)".to_string(),
            y_label: "Height (m)".to_string(),
            histogram_title: "Landing error distribution".to_string(),
            histogram_x_label: "Landing error (m)".to_string(),
            histogram_y_label: "Count".to_string(),
            font_size: 22,
        }
    }
}

impl PlotConfig {
    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
}

/// Paths of the files written by [`render_report`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPlots {
    pub trajectories: PathBuf,
    pub histogram: PathBuf,
}

fn render_error<E: std::fmt::Display>(e: E) -> CalibrationError {
    CalibrationError::Render(e.to_string())
}

/// Write `trajectories.svg` and `error_histogram.svg` into `config.output_dir`
pub fn render_report(report: &FitReport, config: &PlotConfig) -> Result<RenderedPlots> {
    std::fs::create_dir_all(&config.output_dir)?;

    let trajectories = config.output_dir.join("trajectories.svg");
    let histogram = config.output_dir.join("error_histogram.svg");

    draw_trajectories(report, config, &trajectories)?;
    draw_error_histogram(report, config, &histogram)?;

    info!(
        "Rendered {} and {}",
        trajectories.display(),
        histogram.display()
    );

    Ok(RenderedPlots {
        trajectories,
        histogram,
    })
}

fn padded_range(lo: f64, hi: f64) -> (f64, f64) {
    let span = (hi - lo).abs().max(1e-3);
    (lo - 0.05 * span, hi + 0.05 * span)
}

fn draw_trajectories(report: &FitReport, config: &PlotConfig, path: &Path) -> Result<()> {
    let points = report.entries.iter().flat_map(|e| {
        e.trajectory
            .iter()
            .map(|p| (p.x, p.y))
            .chain(std::iter::once((e.observation.target_x, e.observation.target_y)))
    });
    let (mut x_min, mut x_max, mut y_min, mut y_max) = (0.0_f64, 1.0_f64, -1.0_f64, 0.5_f64);
    for (x, y) in points {
        if x.is_finite() && y.is_finite() {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
    }
    let (x_min, x_max) = padded_range(x_min, x_max);
    let (y_min, y_max) = padded_range(y_min, y_max);

    let root = SVGBackend::new(path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let caption = format!(
        "{} (Cd = {:.5}, mean error {:.3} m, max error {:.3} m)",
        config.title, report.cd, report.mean_error, report.max_error
    );
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", config.font_size).into_font())
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc(config.x_label.as_str())
        .y_desc(config.y_label.as_str())
        .draw()
        .map_err(render_error)?;

    for (i, entry) in report.entries.iter().enumerate() {
        let color = Palette99::pick(i).mix(0.9);
        let obs = &entry.observation;

        chart
            .draw_series(LineSeries::new(
                entry.trajectory.iter().map(|p| (p.x, p.y)),
                color.stroke_width(2),
            ))
            .map_err(render_error)?
            .label(format!("{:.2}°", obs.launch_angle_deg()))
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });

        chart
            .draw_series(std::iter::once(Cross::new(
                (obs.target_x, obs.target_y),
                6,
                color.stroke_width(2),
            )))
            .map_err(render_error)?;

        chart
            .draw_series(std::iter::once(Circle::new(
                (entry.landing.x, entry.landing.y),
                5,
                color.stroke_width(2),
            )))
            .map_err(render_error)?;

        // dotted segment from measured to predicted landing point
        let dots = 12;
        chart
            .draw_series((0..=dots).map(|k| {
                let s = k as f64 / dots as f64;
                let x = obs.target_x + s * (entry.landing.x - obs.target_x);
                let y = obs.target_y + s * (entry.landing.y - obs.target_y);
                Circle::new((x, y), 1, color.filled())
            }))
            .map_err(render_error)?;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    Ok(())
}

/// Equal-width bins over `[0, max]`; returns `(lower, upper, count)` per bin
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    let bins = bins.max(1);
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let width = if max > 0.0 { max / bins as f64 } else { 1e-6 };

    let mut counts = vec![0usize; bins];
    for v in values.iter().copied().filter(|v| v.is_finite()) {
        let idx = ((v / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| (i as f64 * width, (i + 1) as f64 * width, count))
        .collect()
}

/// Number of histogram bins for `n` errors
pub fn bin_count(n: usize) -> usize {
    (n / 2).max(5)
}

fn draw_error_histogram(report: &FitReport, config: &PlotConfig, path: &Path) -> Result<()> {
    let errors = report.errors();
    let bins = histogram_bins(&errors, bin_count(errors.len()));

    let x_max = bins.last().map(|b| b.1).unwrap_or(1.0);
    let y_max = bins.iter().map(|b| b.2).max().unwrap_or(0) as f64 + 1.0;

    let root = SVGBackend::new(path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            config.histogram_title.as_str(),
            ("sans-serif", config.font_size).into_font(),
        )
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..x_max, 0.0..y_max)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc(config.histogram_x_label.as_str())
        .y_desc(config.histogram_y_label.as_str())
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(bins.iter().map(|&(lo, hi, count)| {
            Rectangle::new([(lo, 0.0), (hi, count as f64)], BLUE.mix(0.5).filled())
        }))
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    Ok(())
}
