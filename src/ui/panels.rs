use crate::cache::GenerationInfo;
use crate::notify::Notification;
use crate::queue::QueuedRequest;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use super::renderfns::truncate;

pub fn draw_generations(frame: &mut Frame, area: Rect, generations: &[GenerationInfo]) {
  let block = Block::default()
    .title(format!(" Caches ({}) ", generations.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if generations.is_empty() {
    let paragraph = Paragraph::new("Nothing cached yet.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = generations
    .iter()
    .map(|generation| {
      let (marker, color) = if generation.current {
        ("*", Color::Green)
      } else {
        (" ", Color::DarkGray)
      };
      ListItem::new(Line::from(vec![
        Span::styled(marker, Style::default().fg(color)),
        Span::raw(" "),
        Span::styled(
          format!("{:<28}", truncate(&generation.name, 28)),
          Style::default().fg(color),
        ),
        Span::styled(
          format!("{:>5}", generation.entries),
          Style::default().fg(Color::Cyan),
        ),
      ]))
    })
    .collect();

  frame.render_widget(List::new(items).block(block), area);
}

pub fn draw_toasts(frame: &mut Frame, area: Rect, toasts: &[Notification]) {
  let block = Block::default()
    .title(" Notifications ")
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let width = area.width.saturating_sub(4) as usize;
  let lines: Vec<Line> = toasts
    .iter()
    .flat_map(|toast| {
      [
        Line::from(Span::styled(
          truncate(&toast.title, width),
          Style::default().fg(Color::Yellow).bold(),
        )),
        Line::from(Span::raw(truncate(&toast.body, width))),
      ]
    })
    .collect();

  frame.render_widget(Paragraph::new(lines).block(block), area);
}

pub fn draw_queue(frame: &mut Frame, area: Rect, requests: &[QueuedRequest], selected: usize) {
  let pending = requests.iter().filter(|r| !r.delivered).count();
  let block = Block::default()
    .title(format!(" Queue ({} pending, {} total) ", pending, requests.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if requests.is_empty() {
    let paragraph = Paragraph::new("No deferred submissions.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let width = area.width.saturating_sub(36) as usize;
  let items: Vec<ListItem> = requests
    .iter()
    .map(|request| {
      let (label, color) = if request.delivered {
        ("sent", Color::Green)
      } else {
        ("pending", Color::Yellow)
      };
      ListItem::new(Line::from(vec![
        Span::styled(format!("{:<6}", request.id), Style::default().fg(Color::Cyan)),
        Span::styled(format!("{:<8}", label), Style::default().fg(color)),
        Span::styled(
          request.created_at.format("%H:%M:%S ").to_string(),
          Style::default().fg(Color::DarkGray),
        ),
        Span::raw(truncate(&request.payload.to_string(), width)),
      ]))
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(selected));

  frame.render_stateful_widget(list, area, &mut state);
}
