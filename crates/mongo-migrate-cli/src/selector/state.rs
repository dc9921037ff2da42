//! Selection state machine, independent of the terminal.

use mongo_migrate::Selection;
use std::collections::BTreeSet;

/// Rows shown before the first layout pass reports the real height.
const DEFAULT_CAPACITY: usize = 10;

pub const EMPTY_SELECTION_WARNING: &str = "Select at least one collection before confirming";

/// Something the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorAction {
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Toggle,
    ToggleAll,
    Confirm,
    Quit,
    Interrupt,
}

/// Cursor, visible window and toggled items of one selection.
#[derive(Debug)]
pub struct SelectorState {
    items: Vec<String>,
    cursor: usize,
    offset: usize,
    capacity: usize,
    selected: BTreeSet<String>,
    warning: Option<&'static str>,
}

impl SelectorState {
    pub fn new(items: Vec<String>) -> Self {
        Self {
            items,
            cursor: 0,
            offset: 0,
            capacity: DEFAULT_CAPACITY,
            selected: BTreeSet::new(),
            warning: None,
        }
    }

    /// Apply one action. Returns the final selection once the user confirms
    /// a non-empty set, quits or interrupts.
    pub fn apply(&mut self, action: SelectorAction) -> Option<Selection> {
        self.warning = None;
        match action {
            SelectorAction::Up => self.move_to(self.cursor.saturating_sub(1)),
            SelectorAction::Down => self.move_to(self.cursor + 1),
            SelectorAction::PageUp => self.move_to(self.cursor.saturating_sub(self.capacity)),
            SelectorAction::PageDown => self.move_to(self.cursor + self.capacity),
            SelectorAction::Home => self.move_to(0),
            SelectorAction::End => self.move_to(self.items.len()),
            SelectorAction::Toggle => {
                if let Some(item) = self.items.get(self.cursor) {
                    if !self.selected.remove(item) {
                        self.selected.insert(item.clone());
                    }
                }
            }
            SelectorAction::ToggleAll => {
                if self.all_selected() {
                    self.selected.clear();
                } else {
                    self.selected = self.items.iter().cloned().collect();
                }
            }
            SelectorAction::Confirm => {
                if self.selected.is_empty() {
                    self.warning = Some(EMPTY_SELECTION_WARNING);
                } else {
                    return Some(Selection::Chosen(self.chosen()));
                }
            }
            SelectorAction::Quit | SelectorAction::Interrupt => return Some(Selection::Cancelled),
        }
        None
    }

    /// Number of list rows the display can show.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.scroll_to_cursor();
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_selected(&self, item: &str) -> bool {
        self.selected.contains(item)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn warning(&self) -> Option<&'static str> {
        self.warning
    }

    /// `(index, item)` pairs inside the visible window.
    pub fn visible(&self) -> impl Iterator<Item = (usize, &String)> + '_ {
        self.items
            .iter()
            .enumerate()
            .skip(self.offset)
            .take(self.capacity)
    }

    fn all_selected(&self) -> bool {
        !self.items.is_empty() && self.selected.len() == self.items.len()
    }

    /// Selected items in list order.
    fn chosen(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| self.selected.contains(*item))
            .cloned()
            .collect()
    }

    fn move_to(&mut self, index: usize) {
        self.cursor = index.min(self.items.len().saturating_sub(1));
        self.scroll_to_cursor();
    }

    fn scroll_to_cursor(&mut self) {
        self.offset = self.offset.min(self.items.len().saturating_sub(self.capacity));
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + self.capacity {
            self.offset = self.cursor + 1 - self.capacity;
        }
    }
}
