pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use ratatui::widgets::TableState;

/// Keep the table selection inside `0..len` (none when empty).
pub fn ensure_valid_selection(state: &mut TableState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    Some(i) if i >= len => state.select(Some(len - 1)),
    None => state.select(Some(0)),
    Some(_) => {}
  }
}

/// Move the selection by `delta` rows, clamped to `0..len`.
pub fn move_selection(state: &mut TableState, len: usize, delta: isize) {
  if len == 0 {
    state.select(None);
    return;
  }
  let current = state.selected().unwrap_or(0) as isize;
  let next = (current + delta).clamp(0, len as isize - 1);
  state.select(Some(next as usize));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ensure_valid_selection() {
    let mut state = TableState::default();
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(0));

    state.select(Some(7));
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(2));

    ensure_valid_selection(&mut state, 0);
    assert_eq!(state.selected(), None);
  }

  #[test]
  fn test_move_selection_clamps() {
    let mut state = TableState::default();
    move_selection(&mut state, 3, -1);
    assert_eq!(state.selected(), Some(0));
    move_selection(&mut state, 3, 10);
    assert_eq!(state.selected(), Some(2));
  }
}
