use ratatui::prelude::*;
use ratatui::symbols;
use ratatui::widgets::{Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, GraphType, Paragraph};

use crate::dataset::Dataset;

const PALETTE: [Color; 3] = [Color::Cyan, Color::Yellow, Color::Magenta];

/// Numeric columns plotted per dataset
pub const MAX_SERIES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
  pub name: String,
  pub points: Vec<(f64, f64)>,
}

impl Series {
  pub fn new(name: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
    Self {
      name: name.into(),
      points,
    }
  }
}

/// Up to [`MAX_SERIES`] numeric columns of `dataset` against row index, plus
/// x labels (first, middle, last) from the timestamp column when present.
pub fn dataset_series(dataset: &Dataset) -> (Vec<Series>, Vec<String>) {
  let series = dataset
    .numeric_columns()
    .into_iter()
    .take(MAX_SERIES)
    .map(|col| {
      let points = (0..dataset.rows.len())
        .filter_map(|row| {
          let value = dataset.cell(row, col).as_number();
          value.is_finite().then_some((row as f64, value))
        })
        .collect();
      Series::new(dataset.columns[col].name.clone(), points)
    })
    .collect();

  let labels = match dataset.timestamp_column() {
    Some(col) if !dataset.rows.is_empty() => {
      let last = dataset.rows.len() - 1;
      let mut picks = vec![0, last / 2, last];
      picks.dedup();
      picks
        .into_iter()
        .map(|row| short_time(&dataset.cell(row, col).to_string()))
        .collect()
    }
    _ => Vec::new(),
  };

  (series, labels)
}

/// `HH:MM` from an RFC 3339 timestamp, the raw text otherwise
fn short_time(value: &str) -> String {
  match value.split_once('T') {
    Some((_, time)) if time.len() >= 5 => time[..5].to_string(),
    _ => value.to_string(),
  }
}

fn bounds(values: impl Iterator<Item = f64>) -> [f64; 2] {
  let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
    (lo.min(v), hi.max(v))
  });
  if !lo.is_finite() {
    return [0.0, 1.0];
  }
  if lo == hi {
    return [lo - 1.0, hi + 1.0];
  }
  [lo, hi]
}

pub fn draw_line_chart(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  series: &[Series],
  x_labels: &[String],
) {
  let block = Block::default()
    .title(format!(" {} ", title))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if series.iter().all(|s| s.points.is_empty()) {
    frame.render_widget(
      Paragraph::new("No numeric data to chart.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray)),
      area,
    );
    return;
  }

  let all_points = || series.iter().flat_map(|s| s.points.iter());
  let x = bounds(all_points().map(|p| p.0));
  let y = bounds(all_points().map(|p| p.1));

  let datasets = series
    .iter()
    .zip(PALETTE.iter().cycle())
    .map(|(s, color)| {
      ratatui::widgets::Dataset::default()
        .name(s.name.clone())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(*color))
        .data(&s.points)
    })
    .collect();

  let x_axis = Axis::default()
    .bounds(x)
    .style(Style::default().fg(Color::DarkGray))
    .labels(x_labels.iter().map(|l| Span::raw(l.clone())).collect::<Vec<_>>());
  let y_axis = Axis::default()
    .bounds(y)
    .style(Style::default().fg(Color::DarkGray))
    .labels(vec![
      Span::raw(format!("{:.0}", y[0])),
      Span::raw(format!("{:.0}", (y[0] + y[1]) / 2.0)),
      Span::raw(format!("{:.0}", y[1])),
    ]);

  let chart = Chart::new(datasets).block(block).x_axis(x_axis).y_axis(y_axis);
  frame.render_widget(chart, area);
}

pub fn draw_bar_chart(frame: &mut Frame, area: Rect, title: &str, bars: &[(String, u64)]) {
  let block = Block::default()
    .title(format!(" {} ", title))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let bars: Vec<Bar> = bars
    .iter()
    .zip(PALETTE.iter().cycle())
    .map(|((label, value), color)| {
      Bar::default()
        .label(Line::from(label.clone()))
        .value(*value)
        .style(Style::default().fg(*color))
    })
    .collect();

  let chart = BarChart::default()
    .block(block)
    .data(BarGroup::default().bars(&bars))
    .bar_width(7)
    .bar_gap(1);
  frame.render_widget(chart, area);
}
