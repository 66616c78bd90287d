use ratatui::prelude::{Color, Rect};

use crate::feed::FeedStatus;

/// Truncate to `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for a machine or task status
pub fn status_color(status: &str) -> Color {
  match status.to_lowercase().as_str() {
    "running" | "active" | "online" | "done" | "completed" => Color::Green,
    "idle" | "scheduled" | "pending" | "in_progress" => Color::Yellow,
    "down" | "offline" | "error" | "fault" | "maintenance" | "overdue" => Color::Red,
    _ => Color::White,
  }
}

pub fn severity_color(severity: &str) -> Color {
  match severity.to_lowercase().as_str() {
    "critical" | "high" => Color::Red,
    "medium" | "warning" => Color::Yellow,
    "low" | "info" => Color::Blue,
    _ => Color::White,
  }
}

pub fn feed_color(status: FeedStatus) -> Color {
  match status {
    FeedStatus::Fresh => Color::Green,
    FeedStatus::Cached | FeedStatus::Loading => Color::Yellow,
    FeedStatus::Stale | FeedStatus::Offline => Color::Red,
  }
}

/// `value` with one decimal and `suffix`, or "-"
pub fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
  match value {
    Some(v) => format!("{:.1}{}", v, suffix),
    None => "-".to_string(),
  }
}

/// Overlay anchored at the top-left of `area` with a small margin
pub fn overlay_rect(area: Rect, height: u16) -> Rect {
  let width = (area.width * 60 / 100).clamp(30, 60).min(area.width.saturating_sub(2));
  Rect::new(
    area.x + 1,
    area.y + 1,
    width,
    height.min(area.height.saturating_sub(2)),
  )
}

/// Rectangle of at most `width` x `height` centered in `area`
pub fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect::new(
    area.x + (area.width - width) / 2,
    area.y + (area.height - height) / 2,
    width,
    height,
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate() {
    assert_eq!(truncate("hello", 5), "hello");
    assert_eq!(truncate("hello world", 8), "hello...");
    assert_eq!(truncate("Ofen °C Zone", 7), "Ofen...");
  }

  #[test]
  fn test_status_colors() {
    assert_eq!(status_color("Running"), Color::Green);
    assert_eq!(status_color("idle"), Color::Yellow);
    assert_eq!(status_color("down"), Color::Red);
    assert_eq!(status_color("unknown"), Color::White);
    assert_eq!(severity_color("HIGH"), Color::Red);
  }

  #[test]
  fn test_fmt_opt() {
    assert_eq!(fmt_opt(Some(71.46), "%"), "71.5%");
    assert_eq!(fmt_opt(None, "%"), "-");
  }

  #[test]
  fn test_rects_stay_inside_area() {
    let area = Rect::new(0, 0, 20, 5);
    let centered = centered_rect(area, 64, 10);
    assert_eq!(centered, Rect::new(0, 0, 20, 5));
    let overlay = overlay_rect(area, 3);
    assert!(overlay.right() <= area.right());
  }
}
