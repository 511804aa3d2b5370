//! TUI application state and input mapping.

use crate::dashboard::{TAB_COUNT, Tab, sort_fields};
use crate::format::RowMatrix;
use crossterm::event::KeyCode;

/// Application running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Running,
    Quitting,
}

/// Row buffer and scroll position for one tab. The buffer keeps the last
/// pushed rows, so a failed poll leaves the previous contents visible.
#[derive(Debug, Default)]
pub struct TabView {
    pub rows: RowMatrix,
    pub offset: usize,
}

/// Terminal-side state: which tab is visible, the buffered rows per tab, and
/// the sort-field cursor for the active tab.
#[derive(Debug)]
pub struct App {
    pub state: AppState,
    pub active_tab: Tab,
    /// Two-line engine version string shown in the header.
    pub version: String,
    views: [TabView; TAB_COUNT],
    pub sort_cursor: usize,
}

impl App {
    pub fn new(version: String) -> Self {
        Self {
            state: AppState::Running,
            active_tab: Tab::default(),
            version,
            views: Default::default(),
            sort_cursor: 0,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.state == AppState::Quitting
    }

    pub fn quit(&mut self) {
        self.state = AppState::Quitting;
    }

    pub fn next_tab(&mut self) {
        self.select_tab(self.active_tab.next());
    }

    pub fn prev_tab(&mut self) {
        self.select_tab(self.active_tab.prev());
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.active_tab = tab;
        self.sort_cursor = 0;
    }

    /// Store freshly pushed rows for a tab, clamping its scroll position.
    pub fn set_rows(&mut self, tab: Tab, rows: RowMatrix) {
        let view = &mut self.views[tab.index()];
        view.rows = rows;
        view.offset = view.offset.min(view.rows.len().saturating_sub(1));
    }

    pub fn view(&self, tab: Tab) -> &TabView {
        &self.views[tab.index()]
    }

    /// Scroll the active tab by `amount` rows (negative scrolls up).
    pub fn scroll_by(&mut self, amount: isize) {
        let view = &mut self.views[self.active_tab.index()];
        if view.rows.is_empty() {
            return;
        }
        let max = view.rows.len() - 1;
        view.offset = if amount < 0 {
            view.offset.saturating_sub(amount.unsigned_abs())
        } else {
            (view.offset + amount as usize).min(max)
        };
    }

    pub fn sort_cursor_next(&mut self) {
        let fields = sort_fields(self.active_tab);
        if !fields.is_empty() {
            self.sort_cursor = (self.sort_cursor + 1) % fields.len();
        }
    }

    pub fn sort_cursor_prev(&mut self) {
        let fields = sort_fields(self.active_tab);
        if !fields.is_empty() {
            self.sort_cursor = (self.sort_cursor + fields.len() - 1) % fields.len();
        }
    }

    /// The stat field the sort cursor points at, when the tab is sortable.
    pub fn sort_field(&self) -> Option<usize> {
        if sort_fields(self.active_tab).is_empty() {
            None
        } else {
            Some(self.sort_cursor)
        }
    }

    pub fn sort_field_name(&self) -> Option<&'static str> {
        sort_fields(self.active_tab).get(self.sort_cursor).copied()
    }
}

/// Discrete user inputs the terminal loop understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Quit,
    NextTab,
    PrevTab,
    SelectTab(Tab),
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    SortPrev,
    SortNext,
    SortApply,
    Clear,
    Refresh,
    Unknown,
}

impl InputEvent {
    pub fn from_key(key: KeyCode) -> Self {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Self::Quit,
            KeyCode::Tab => Self::NextTab,
            KeyCode::BackTab => Self::PrevTab,
            KeyCode::Char('1') => Self::SelectTab(Tab::Interfaces),
            KeyCode::Char('2') => Self::SelectTab(Tab::Nodes),
            KeyCode::Char('3') => Self::SelectTab(Tab::Errors),
            KeyCode::Char('4') => Self::SelectTab(Tab::Memory),
            KeyCode::Char('5') => Self::SelectTab(Tab::Threads),
            KeyCode::Up | KeyCode::Char('k') => Self::ScrollUp,
            KeyCode::Down | KeyCode::Char('j') => Self::ScrollDown,
            KeyCode::PageUp => Self::PageUp,
            KeyCode::PageDown => Self::PageDown,
            KeyCode::Left => Self::SortPrev,
            KeyCode::Right => Self::SortNext,
            KeyCode::Char('s') | KeyCode::Char('S') => Self::SortApply,
            KeyCode::Char('c') | KeyCode::Char('C') => Self::Clear,
            KeyCode::Char('r') | KeyCode::Char('R') => Self::Refresh,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> RowMatrix {
        (0..n).map(|i| vec![i.to_string()]).collect()
    }

    #[test]
    fn test_app_creation() {
        let app = App::new("fastpath version: 22.02\n2026-01-15".to_string());
        assert_eq!(app.state, AppState::Running);
        assert_eq!(app.active_tab, Tab::Interfaces);
        assert!(app.view(Tab::Interfaces).rows.is_empty());
    }

    #[test]
    fn test_tab_navigation_resets_sort_cursor() {
        let mut app = App::new(String::new());
        app.sort_cursor_next();
        assert_eq!(app.sort_cursor, 1);

        app.next_tab();
        assert_eq!(app.active_tab, Tab::Nodes);
        assert_eq!(app.sort_cursor, 0);

        app.prev_tab();
        assert_eq!(app.active_tab, Tab::Interfaces);
    }

    #[test]
    fn test_rows_persist_per_tab() {
        let mut app = App::new(String::new());
        app.set_rows(Tab::Nodes, rows(3));
        assert_eq!(app.view(Tab::Nodes).rows.len(), 3);
        assert!(app.view(Tab::Interfaces).rows.is_empty());
    }

    #[test]
    fn test_scroll_clamps_to_buffer() {
        let mut app = App::new(String::new());
        app.set_rows(Tab::Interfaces, rows(5));

        app.scroll_by(100);
        assert_eq!(app.view(Tab::Interfaces).offset, 4);
        app.scroll_by(-1);
        assert_eq!(app.view(Tab::Interfaces).offset, 3);
        app.scroll_by(-100);
        assert_eq!(app.view(Tab::Interfaces).offset, 0);

        // Shrinking the buffer pulls the offset back in range.
        app.scroll_by(4);
        app.set_rows(Tab::Interfaces, rows(2));
        assert_eq!(app.view(Tab::Interfaces).offset, 1);
    }

    #[test]
    fn test_sort_cursor_wraps_over_fields() {
        let mut app = App::new(String::new());
        app.select_tab(Tab::Errors);
        app.sort_cursor_prev();
        assert_eq!(app.sort_field(), Some(2));
        app.sort_cursor_next();
        assert_eq!(app.sort_field(), Some(0));
        assert_eq!(app.sort_field_name(), Some("Counter"));
    }

    #[test]
    fn test_sort_cursor_disabled_on_unsortable_tabs() {
        let mut app = App::new(String::new());
        app.select_tab(Tab::Memory);
        app.sort_cursor_next();
        assert_eq!(app.sort_field(), None);
        assert_eq!(app.sort_field_name(), None);
    }

    #[test]
    fn test_input_events() {
        assert_eq!(InputEvent::from_key(KeyCode::Char('q')), InputEvent::Quit);
        assert_eq!(InputEvent::from_key(KeyCode::Esc), InputEvent::Quit);
        assert_eq!(
            InputEvent::from_key(KeyCode::Char('3')),
            InputEvent::SelectTab(Tab::Errors)
        );
        assert_eq!(InputEvent::from_key(KeyCode::Char('s')), InputEvent::SortApply);
        assert_eq!(InputEvent::from_key(KeyCode::Char('c')), InputEvent::Clear);
        assert_eq!(InputEvent::from_key(KeyCode::Char('x')), InputEvent::Unknown);
    }
}
