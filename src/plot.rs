//! Kaplan-Meier curve rendering (SVG).
//!
//! One panel per analysis: step curves, optional confidence bands, median
//! guide lines, log-rank p-value and a number-at-risk table underneath.

use std::path::Path;

use log::info;
use plotters::prelude::*;

use crate::config::PlotConfig;
use crate::error::{Result, SurvivalError};
use crate::kaplan_meier::{KaplanMeierCurve, SurvivalTableRow};

static PALETTE: [RGBColor; 5] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
];

/// number of columns in the risk table
const RISK_TABLE_TICKS: usize = 6;

fn plot_err<E: std::fmt::Display>(e: E) -> SurvivalError {
    SurvivalError::plot(e.to_string())
}

/// staircase through (time, value) points starting at (0, 1)
fn step_points(curve: &KaplanMeierCurve, value: impl Fn(&SurvivalTableRow) -> f64) -> Vec<(f64, f64)> {
    let mut points = vec![(0.0, 1.0)];
    let mut previous = 1.0;
    for row in curve.table() {
        let current = value(row);
        points.push((row.time, previous));
        points.push((row.time, current));
        previous = current;
    }
    points
}

fn legend_label(config: &PlotConfig, index: usize, curve: &KaplanMeierCurve) -> String {
    let name = config
        .legend_labels
        .as_ref()
        .and_then(|labels| labels.get(index).cloned())
        .unwrap_or_else(|| curve.label.clone());
    match &config.legend_title {
        Some(title) => format!("{title}: {name}"),
        None => name,
    }
}

/// draw `curves` into an SVG at `path`; `p_value` is the log-rank p for grouped plots
pub fn render_km_plot(
    path: &Path,
    curves: &[KaplanMeierCurve],
    p_value: Option<f64>,
    config: &PlotConfig,
    default_title: &str,
) -> Result<()> {
    if curves.is_empty() {
        return Err(SurvivalError::plot("nothing to draw"));
    }
    let title = config.title.clone().unwrap_or_else(|| default_title.to_string());
    let max_time = curves
        .iter()
        .map(KaplanMeierCurve::max_time)
        .fold(1.0_f64, f64::max);

    let root = SVGBackend::new(path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let (chart_area, table_area) = if config.risk_table {
        let table_rows = u32::try_from(curves.len()).unwrap_or(u32::MAX).saturating_add(2);
        let table_height = (table_rows * 22).min(config.height / 2);
        let (upper, lower) = root.split_vertically(config.height - table_height);
        (upper, Some(lower))
    } else {
        (root.clone(), None)
    };

    let mut chart = ChartBuilder::on(&chart_area)
        .caption(&title, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..max_time * 1.02, 0.0..1.05)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc(config.x_label.as_str())
        .y_desc(config.y_label.as_str())
        .draw()
        .map_err(plot_err)?;

    for (i, curve) in curves.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];

        if config.confidence_interval {
            let mut band = step_points(curve, |row| row.upper);
            let mut lower = step_points(curve, |row| row.lower);
            lower.reverse();
            band.extend(lower);
            chart
                .draw_series(std::iter::once(Polygon::new(band, color.mix(0.15).filled())))
                .map_err(plot_err)?;
        }

        chart
            .draw_series(LineSeries::new(step_points(curve, |row| row.survival), color.stroke_width(2)))
            .map_err(plot_err)?
            .label(legend_label(config, i, curve))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));

        // censoring ticks
        let censored = curve
            .table()
            .iter()
            .filter(|row| row.censored > 0)
            .map(|row| Cross::new((row.time, row.survival), 4, color.stroke_width(1)));
        chart.draw_series(censored).map_err(plot_err)?;

        if config.median_line {
            if let Some(median) = curve.median_survival() {
                let guide = BLACK.mix(0.4);
                chart
                    .draw_series(LineSeries::new(vec![(0.0, 0.5), (median, 0.5), (median, 0.0)], guide))
                    .map_err(plot_err)?;
            }
        }
    }

    if config.show_p_value {
        if let Some(p) = p_value {
            chart
                .draw_series(std::iter::once(Text::new(
                    format!("log-rank p = {p:.4}"),
                    (max_time * 0.05, 0.12),
                    ("sans-serif", 16),
                )))
                .map_err(plot_err)?;
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    if let Some(table_area) = table_area {
        let (base_x, _) = table_area.get_base_pixel();
        let style: TextStyle = ("sans-serif", 14).into();
        table_area
            .draw_text("Number at risk", &style, (10, 4))
            .map_err(plot_err)?;

        #[allow(clippy::cast_precision_loss)]
        let ticks: Vec<f64> = (0..RISK_TABLE_TICKS)
            .map(|k| (max_time * k as f64 / (RISK_TABLE_TICKS - 1) as f64).round())
            .collect();

        for (i, curve) in curves.iter().enumerate() {
            let y = 26 + 20 * i32::try_from(i).unwrap_or(0);
            let label_style = style.color(&PALETTE[i % PALETTE.len()]);
            table_area
                .draw_text(&legend_label(config, i, curve), &label_style, (10, y))
                .map_err(plot_err)?;
            for &t in &ticks {
                let (x, _) = chart.backend_coord(&(t, 0.0));
                table_area
                    .draw_text(&curve.at_risk_at(t).to_string(), &style, (x - base_x, y))
                    .map_err(plot_err)?;
            }
        }
    }

    root.present().map_err(plot_err)?;
    info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curves() -> Vec<KaplanMeierCurve> {
        vec![
            KaplanMeierCurve::fit(&[5.0, 10.0, 10.0, 15.0], &[true, true, false, true], 0.95)
                .unwrap()
                .with_label("a"),
            KaplanMeierCurve::fit(&[3.0, 8.0, 20.0], &[true, false, false], 0.95)
                .unwrap()
                .with_label("b"),
        ]
    }

    #[test]
    fn test_step_points() {
        let curves = curves();
        let points = step_points(&curves[0], |row| row.survival);
        assert_eq!(points[0], (0.0, 1.0));
        assert!(points.contains(&(5.0, 1.0)));
        assert!(points.contains(&(5.0, 0.75)));
        assert_eq!(*points.last().unwrap(), (15.0, 0.0));
    }

    #[test]
    fn test_legend_overrides() {
        let config = PlotConfig {
            legend_labels: Some(vec!["Arm A".into()]),
            ..PlotConfig::default()
        }
        .with_legend_title("arm");
        let curves = curves();
        assert_eq!(legend_label(&config, 0, &curves[0]), "arm: Arm A");
        assert_eq!(legend_label(&config, 1, &curves[1]), "arm: b");
    }

    #[test]
    fn test_render_writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("km.svg");
        render_km_plot(&path, &curves(), Some(0.1234), &PlotConfig::default(), "test").unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("log-rank p = 0.1234"));
        assert!(svg.contains("Number at risk"));
    }

    #[test]
    fn test_render_minimal_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("km.svg");
        let config = PlotConfig {
            risk_table: false,
            confidence_interval: false,
            median_line: false,
            show_p_value: false,
            ..PlotConfig::default()
        };
        render_km_plot(&path, &curves()[..1], None, &config, "overall").unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(!svg.contains("Number at risk"));
    }

    #[test]
    fn test_render_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(render_km_plot(&dir.path().join("x.svg"), &[], None, &PlotConfig::default(), "t").is_err());
    }
}
