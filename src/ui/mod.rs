mod panels;
mod renderfns;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use renderfns::header::HeaderInfo;

pub use renderfns::truncate;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let host = app.host();
  let lifecycle = host.worker.lifecycle();
  let update = host.bridge.update_prompt();
  let controller = host.bridge.controller();
  renderfns::draw_header(
    frame,
    chunks[0],
    &HeaderInfo {
      origin: host.origin.as_str(),
      version: lifecycle.version(),
      state: lifecycle.state(),
      controller: controller.as_deref(),
      offline: host.bridge.offline_indicator_visible(),
      update: update.as_ref().map(|u| u.version.as_str()),
      install_banner: host.bridge.install_banner_visible(),
    },
  );

  let columns = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
    .split(chunks[1]);
  let left = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Min(4), Constraint::Length(8)])
    .split(columns[0]);

  panels::draw_generations(frame, left[0], app.generations());
  panels::draw_toasts(frame, left[1], app.toasts());
  panels::draw_queue(frame, columns[1], app.requests(), app.selected());

  draw_status_bar(frame, chunks[2], app);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = if app.status().is_empty() {
    let hint = " s:sync  o:offline  r/l:update now/later  a/n/x:install  p:push  c/e:click/explore  q:quit";
    (hint.to_string(), Style::default().fg(Color::DarkGray))
  } else {
    (format!(" {}", app.status()), Style::default().fg(Color::Yellow))
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
