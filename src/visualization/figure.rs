//! Minimal SVG figure builder for diagnostic plots

use crate::error::Result;
use std::fs;
use std::path::Path;

const MARGIN_TOP: f64 = 44.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_BOTTOM: f64 = 52.0;
const MIN_MARGIN_LEFT: f64 = 64.0;
const CHAR_WIDTH: f64 = 6.5;
const FONT: &str = "DejaVu Sans, Arial, sans-serif";

/// Five-number summary with 1.5 IQR whiskers
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

/// Quantile with linear interpolation between closest ranks
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl BoxStats {
    /// `None` for an empty or non-finite sample
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let low_fence = q1 - 1.5 * iqr;
        let high_fence = q3 + 1.5 * iqr;

        let inside: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|v| *v >= low_fence && *v <= high_fence)
            .collect();
        let whisker_low = inside.first().copied().unwrap_or(q1);
        let whisker_high = inside.last().copied().unwrap_or(q3);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| *v < low_fence || *v > high_fence)
            .collect();

        Some(Self {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
        })
    }
}

/// A line series drawn over the x axis
#[derive(Debug, Clone)]
pub struct LineSeries {
    pub label: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub color: String,
    pub markers: bool,
}

impl LineSeries {
    pub fn new(label: impl Into<String>, xs: Vec<f64>, ys: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            xs,
            ys,
            color: "#1f77b4".to_string(),
            markers: false,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_markers(mut self, markers: bool) -> Self {
        self.markers = markers;
        self
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Line(LineSeries),
    HorizontalBars {
        labels: Vec<String>,
        values: Vec<f64>,
        color: String,
    },
    HorizontalBox {
        stats: BoxStats,
        color: String,
    },
}

/// Axis-aligned plot rendered to a standalone SVG document
#[derive(Debug, Clone)]
pub struct Figure {
    width: f64,
    height: f64,
    title: String,
    x_label: String,
    y_label: String,
    grid: bool,
    legend: bool,
    x_ticks: Option<Vec<f64>>,
    layers: Vec<Layer>,
}

impl Figure {
    /// Size in pixels
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            title: String::new(),
            x_label: String::new(),
            y_label: String::new(),
            grid: false,
            legend: false,
            x_ticks: None,
            layers: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_x_label(mut self, label: impl Into<String>) -> Self {
        self.x_label = label.into();
        self
    }

    pub fn with_y_label(mut self, label: impl Into<String>) -> Self {
        self.y_label = label.into();
        self
    }

    pub fn with_grid(mut self, grid: bool) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_legend(mut self, legend: bool) -> Self {
        self.legend = legend;
        self
    }

    /// Fixed x tick positions instead of automatic ones
    pub fn with_x_ticks(mut self, ticks: Vec<f64>) -> Self {
        self.x_ticks = Some(ticks);
        self
    }

    pub fn line(mut self, series: LineSeries) -> Self {
        self.layers.push(Layer::Line(series));
        self
    }

    /// Horizontal bars, first label at the bottom
    pub fn horizontal_bars(mut self, labels: Vec<String>, values: Vec<f64>, color: impl Into<String>) -> Self {
        self.layers.push(Layer::HorizontalBars {
            labels,
            values,
            color: color.into(),
        });
        self
    }

    /// A single horizontal box plot; skipped when `values` has no finite entries
    pub fn horizontal_box(mut self, values: &[f64], color: impl Into<String>) -> Self {
        if let Some(stats) = BoxStats::from_values(values) {
            self.layers.push(Layer::HorizontalBox {
                stats,
                color: color.into(),
            });
        }
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Category labels drawn on the y axis, bottom to top
    fn categories(&self) -> Option<&[String]> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::HorizontalBars { labels, .. } => Some(labels.as_slice()),
            _ => None,
        })
    }

    fn x_extent(&self) -> (f64, f64) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut include = |v: f64| {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        };
        for layer in &self.layers {
            match layer {
                Layer::Line(s) => s.xs.iter().for_each(|v| include(*v)),
                Layer::HorizontalBars { values, .. } => {
                    include(0.0);
                    values.iter().for_each(|v| include(*v));
                }
                Layer::HorizontalBox { stats, .. } => {
                    include(stats.whisker_low);
                    include(stats.whisker_high);
                    stats.outliers.iter().for_each(|v| include(*v));
                }
            }
        }
        if let Some(ticks) = &self.x_ticks {
            ticks.iter().for_each(|v| include(*v));
        }
        padded(lo, hi)
    }

    fn y_extent(&self) -> (f64, f64) {
        if let Some(labels) = self.categories() {
            return (-0.5, labels.len().max(1) as f64 - 0.5);
        }
        if self.layers.iter().any(|l| matches!(l, Layer::HorizontalBox { .. })) {
            return (0.5, 1.5);
        }
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for layer in &self.layers {
            if let Layer::Line(s) = layer {
                for v in s.ys.iter().filter(|v| v.is_finite()) {
                    lo = lo.min(*v);
                    hi = hi.max(*v);
                }
            }
        }
        padded(lo, hi)
    }

    fn margin_left(&self) -> f64 {
        let longest = self
            .categories()
            .map(|labels| labels.iter().map(|l| l.chars().count()).max().unwrap_or(0))
            .unwrap_or(0);
        (longest as f64 * CHAR_WIDTH + 36.0).max(MIN_MARGIN_LEFT)
    }

    /// Render the figure as an SVG document
    pub fn to_svg(&self) -> String {
        let left = self.margin_left();
        let plot_w = (self.width - left - MARGIN_RIGHT).max(1.0);
        let plot_h = (self.height - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);
        let (x0, x1) = self.x_extent();
        let (y0, y1) = self.y_extent();
        let sx = |v: f64| left + (v - x0) / (x1 - x0) * plot_w;
        let sy = |v: f64| MARGIN_TOP + plot_h - (v - y0) / (y1 - y0) * plot_h;

        let mut out = String::new();
        out.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{FONT}">"#,
            w = self.width,
            h = self.height,
        ));
        out.push('\n');
        out.push_str(&format!(
            r#"<rect x="0" y="0" width="{}" height="{}" fill="white"/>"#,
            self.width, self.height
        ));
        out.push('\n');

        // axes and ticks
        let x_ticks = self.x_ticks.clone().unwrap_or_else(|| nice_ticks(x0, x1));
        for t in x_ticks.iter().filter(|t| **t >= x0 && **t <= x1) {
            let x = sx(*t);
            if self.grid {
                out.push_str(&format!(
                    r##"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" stroke="#dddddd" stroke-width="1"/>"##,
                    MARGIN_TOP,
                    MARGIN_TOP + plot_h
                ));
                out.push('\n');
            }
            out.push_str(&format!(
                r#"<line x1="{x:.2}" y1="{y:.2}" x2="{x:.2}" y2="{:.2}" stroke="black"/>"#,
                MARGIN_TOP + plot_h + 4.0,
                y = MARGIN_TOP + plot_h,
            ));
            out.push_str(&format!(
                r#"<text x="{x:.2}" y="{:.2}" font-size="11" text-anchor="middle">{}</text>"#,
                MARGIN_TOP + plot_h + 17.0,
                format_tick(*t)
            ));
            out.push('\n');
        }

        match self.categories() {
            Some(labels) => {
                for (i, label) in labels.iter().enumerate() {
                    let y = sy(i as f64);
                    out.push_str(&format!(
                        r#"<text x="{:.2}" y="{:.2}" font-size="11" text-anchor="end" dominant-baseline="middle">{}</text>"#,
                        left - 6.0,
                        y,
                        escape(label)
                    ));
                    out.push('\n');
                }
            }
            None if self.layers.iter().any(|l| matches!(l, Layer::Line(_))) => {
                for t in nice_ticks(y0, y1).iter().filter(|t| **t >= y0 && **t <= y1) {
                    let y = sy(*t);
                    if self.grid {
                        out.push_str(&format!(
                            r##"<line x1="{left:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="#dddddd" stroke-width="1"/>"##,
                            left + plot_w
                        ));
                        out.push('\n');
                    }
                    out.push_str(&format!(
                        r#"<text x="{:.2}" y="{y:.2}" font-size="11" text-anchor="end" dominant-baseline="middle">{}</text>"#,
                        left - 6.0,
                        format_tick(*t)
                    ));
                    out.push('\n');
                }
            }
            None => {}
        }

        for layer in &self.layers {
            match layer {
                Layer::Line(series) => {
                    let points: Vec<String> = series
                        .xs
                        .iter()
                        .zip(&series.ys)
                        .filter(|(x, y)| x.is_finite() && y.is_finite())
                        .map(|(x, y)| format!("{:.2},{:.2}", sx(*x), sy(*y)))
                        .collect();
                    out.push_str(&format!(
                        r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
                        points.join(" "),
                        series.color
                    ));
                    out.push('\n');
                    if series.markers {
                        for (x, y) in series.xs.iter().zip(&series.ys).filter(|(x, y)| x.is_finite() && y.is_finite()) {
                            out.push_str(&format!(
                                r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{}"/>"#,
                                sx(*x),
                                sy(*y),
                                series.color
                            ));
                        }
                        out.push('\n');
                    }
                }
                Layer::HorizontalBars { values, color, .. } => {
                    let bar_h = plot_h / values.len().max(1) as f64 * 0.8;
                    for (i, v) in values.iter().enumerate() {
                        let x_start = sx(0.0);
                        let x_end = sx(*v);
                        out.push_str(&format!(
                            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>"#,
                            x_start.min(x_end),
                            sy(i as f64) - bar_h / 2.0,
                            (x_end - x_start).abs(),
                            bar_h,
                            color
                        ));
                        out.push('\n');
                    }
                }
                Layer::HorizontalBox { stats, color } => {
                    let cy = sy(1.0);
                    let half = plot_h * 0.25;
                    out.push_str(&format!(
                        r#"<line x1="{:.2}" y1="{cy:.2}" x2="{:.2}" y2="{cy:.2}" stroke="black"/>"#,
                        sx(stats.whisker_low),
                        sx(stats.q1)
                    ));
                    out.push_str(&format!(
                        r#"<line x1="{:.2}" y1="{cy:.2}" x2="{:.2}" y2="{cy:.2}" stroke="black"/>"#,
                        sx(stats.q3),
                        sx(stats.whisker_high)
                    ));
                    for w in [stats.whisker_low, stats.whisker_high] {
                        out.push_str(&format!(
                            r#"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" stroke="black"/>"#,
                            cy - half / 2.0,
                            cy + half / 2.0,
                            x = sx(w)
                        ));
                    }
                    out.push_str(&format!(
                        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="{}" stroke-width="1.5"/>"#,
                        sx(stats.q1),
                        cy - half,
                        (sx(stats.q3) - sx(stats.q1)).max(1.0),
                        2.0 * half,
                        color
                    ));
                    out.push_str(&format!(
                        r#"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" stroke="orange" stroke-width="2"/>"#,
                        cy - half,
                        cy + half,
                        x = sx(stats.median)
                    ));
                    for o in &stats.outliers {
                        out.push_str(&format!(
                            r#"<circle cx="{:.2}" cy="{cy:.2}" r="3" fill="none" stroke="black"/>"#,
                            sx(*o)
                        ));
                    }
                    out.push('\n');
                }
            }
        }

        // frame on top of the data
        out.push_str(&format!(
            r#"<rect x="{left:.2}" y="{MARGIN_TOP:.2}" width="{plot_w:.2}" height="{plot_h:.2}" fill="none" stroke="black"/>"#
        ));
        out.push('\n');

        if !self.title.is_empty() {
            out.push_str(&format!(
                r#"<text x="{:.2}" y="24" font-size="15" text-anchor="middle">{}</text>"#,
                left + plot_w / 2.0,
                escape(&self.title)
            ));
            out.push('\n');
        }
        if !self.x_label.is_empty() {
            out.push_str(&format!(
                r#"<text x="{:.2}" y="{:.2}" font-size="12" text-anchor="middle">{}</text>"#,
                left + plot_w / 2.0,
                self.height - 12.0,
                escape(&self.x_label)
            ));
            out.push('\n');
        }
        if !self.y_label.is_empty() {
            let cx = 14.0;
            let cy = MARGIN_TOP + plot_h / 2.0;
            out.push_str(&format!(
                r#"<text x="{cx}" y="{cy:.2}" font-size="12" text-anchor="middle" transform="rotate(-90 {cx} {cy:.2})">{}</text>"#,
                escape(&self.y_label)
            ));
            out.push('\n');
        }

        if self.legend {
            let series: Vec<&LineSeries> = self
                .layers
                .iter()
                .filter_map(|l| match l {
                    Layer::Line(s) => Some(s),
                    _ => None,
                })
                .collect();
            for (i, s) in series.iter().enumerate() {
                let y = MARGIN_TOP + 14.0 + i as f64 * 18.0;
                let x = left + plot_w - 110.0;
                out.push_str(&format!(
                    r#"<line x1="{x:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{}" stroke-width="2"/>"#,
                    x + 22.0,
                    s.color
                ));
                out.push_str(&format!(
                    r#"<text x="{:.2}" y="{y:.2}" font-size="11" dominant-baseline="middle">{}</text>"#,
                    x + 28.0,
                    escape(&s.label)
                ));
                out.push('\n');
            }
        }

        out.push_str("</svg>\n");
        out
    }

    /// Write the SVG document to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_svg())?;
        Ok(())
    }
}

/// Extent widened by 5% on each side; degenerate extents get unit width
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// Tick positions at a 1/2/5 x 10^k step covering `[lo, hi]`
fn nice_ticks(lo: f64, hi: f64) -> Vec<f64> {
    let span = hi - lo;
    if !span.is_finite() || span <= 0.0 {
        return Vec::new();
    }
    let raw = span / 5.0;
    let magnitude = 10f64.powi(raw.log10().floor() as i32);
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);
    let start = (lo / step - 1e-9).ceil() as i64;
    let end = (hi / step + 1e-9).floor() as i64;
    (start..=end).map(|i| i as f64 * step).collect()
}

fn format_tick(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        let s = format!("{:.4}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
