use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use super::utils::state_color;
use crate::lifecycle::WorkerState;

/// What the header shows about the worker and the page
pub struct HeaderInfo<'a> {
  pub origin: &'a str,
  pub version: &'a str,
  pub state: WorkerState,
  pub controller: Option<&'a str>,
  pub offline: bool,
  pub update: Option<&'a str>,
  pub install_banner: bool,
}

/// Draw the header bar with origin, worker state, the offline indicator and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, info: &HeaderInfo) {
  let mut spans = vec![
    Span::styled(" folio ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", extract_domain(info.origin)),
      Style::default().fg(Color::White),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" v{} {:?} ", info.version, info.state),
      Style::default().fg(state_color(info.state)).bold(),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      match info.controller {
        Some(version) => format!(" page: v{} ", version),
        None => " page: uncontrolled ".to_string(),
      },
      Style::default().fg(Color::White),
    ),
  ];

  if info.offline {
    spans.push(Span::styled(
      " Sin conexión ",
      Style::default().fg(Color::Black).bg(Color::Red).bold(),
    ));
  }
  if let Some(version) = info.update {
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
      format!(" Nueva versión {} <r>/<l> ", version),
      Style::default().fg(Color::Black).bg(Color::Yellow),
    ));
  }
  if info.install_banner {
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
      " Instalar app <a>/<n>/<x> ",
      Style::default().fg(Color::Black).bg(Color::Cyan),
    ));
  }

  spans.push(Span::raw("  "));
  for (key, label) in [("s", "sync"), ("o", "offline"), ("q", "quit")] {
    spans.push(Span::styled(format!("<{}>", key), Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(format!(" {}   ", label), Style::default().fg(Color::DarkGray)));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host and port of the origin
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
