use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use super::utils::feed_color;
use crate::feed::FeedStatus;
use crate::ui::view::Shortcut;

/// Draw the header bar: logo, backend host, data source and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  server_url: &str,
  status: Option<FeedStatus>,
  shortcuts: &[Shortcut],
) {
  let mut spans = vec![
    Span::styled(" imcs ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", extract_host(server_url)),
      Style::default().fg(Color::White),
    ),
  ];

  if let Some(status) = status {
    spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      format!(" {} ", status.label()),
      Style::default().fg(feed_color(status)).bold(),
    ));
  }
  spans.push(Span::raw(" "));

  let mut shortcuts: Vec<&Shortcut> = shortcuts.iter().collect();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host (and port) of the backend URL
fn extract_host(url: &str) -> &str {
  let rest = url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url);
  rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extract_host() {
    assert_eq!(extract_host("http://localhost:5000"), "localhost:5000");
    assert_eq!(extract_host("https://plant.example.com/imcs"), "plant.example.com");
    assert_eq!(extract_host("10.0.0.4:8080"), "10.0.0.4:8080");
  }
}
