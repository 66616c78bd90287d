use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer: view breadcrumb on the left, transient notice on the right
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], notice: Option<&str>) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }
    let style = if i + 1 == breadcrumb.len() {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };
    spans.push(Span::styled(part.clone(), style));
  }

  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Min(10), Constraint::Length(notice_width(notice, area))])
    .split(area);

  frame.render_widget(
    Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black)),
    chunks[0],
  );

  if let Some(notice) = notice {
    frame.render_widget(
      Paragraph::new(format!(" {} ", notice))
        .alignment(Alignment::Right)
        .style(Style::default().bg(Color::Black).fg(Color::Yellow)),
      chunks[1],
    );
  }
}

fn notice_width(notice: Option<&str>, area: Rect) -> u16 {
  let wanted = notice.map(|n| n.chars().count() as u16 + 2).unwrap_or(0);
  wanted.min(area.width / 2)
}
