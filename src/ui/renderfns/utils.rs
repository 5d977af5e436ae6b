use ratatui::prelude::Color;

use crate::lifecycle::WorkerState;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for a worker state
pub fn state_color(state: WorkerState) -> Color {
  match state {
    WorkerState::Activated => Color::Green,
    WorkerState::Installing | WorkerState::Activating => Color::Yellow,
    WorkerState::Installed => Color::Cyan,
    WorkerState::Parsed => Color::DarkGray,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hola", 10), "hola");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hola", 4), "hola");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("¡Aplicación instalada!", 9), "¡Aplic...");
  }

  #[test]
  fn test_state_color() {
    assert_eq!(state_color(WorkerState::Activated), Color::Green);
    assert_eq!(state_color(WorkerState::Installing), Color::Yellow);
    assert_eq!(state_color(WorkerState::Parsed), Color::DarkGray);
  }
}
