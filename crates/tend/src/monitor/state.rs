//! Monitor view state: the session table, its filter, sort and search.
//!
//! Pure data; the driver feeds it records and key presses and renders it.

use std::cmp::Ordering;

use tend_core::{SessionRecord, SessionStatus};

/// Columns of the session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Status,
    Age,
    Attached,
    Directory,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Id,
        Column::Status,
        Column::Age,
        Column::Attached,
        Column::Directory,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Column::Id => "ID",
            Column::Status => "STATUS",
            Column::Age => "AGE",
            Column::Attached => "ATT",
            Column::Directory => "DIRECTORY",
        }
    }

    fn index(self) -> usize {
        Column::ALL.iter().position(|c| *c == self).unwrap_or(0)
    }

    fn compare(self, a: &SessionRecord, b: &SessionRecord) -> Ordering {
        match self {
            Column::Id => a.id.cmp(&b.id),
            Column::Status => a
                .status
                .attention_priority()
                .cmp(&b.status.attention_priority()),
            // Youngest first reads as "ascending age"
            Column::Age => b.updated_at.cmp(&a.updated_at),
            Column::Attached => a.attached.cmp(&b.attached),
            Column::Directory => a.cwd.cmp(&b.cwd),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort settings. At most one column is active; `cursor` is the column the
/// next cycle applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub cursor: Column,
    pub active: Option<(Column, Direction)>,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            cursor: Column::Status,
            active: None,
        }
    }
}

impl Sort {
    /// none → ascending → descending → none on the cursor column.
    pub fn cycle(&mut self) {
        self.active = match self.active {
            Some((col, Direction::Asc)) if col == self.cursor => Some((col, Direction::Desc)),
            Some((col, Direction::Desc)) if col == self.cursor => None,
            _ => Some((self.cursor, Direction::Asc)),
        };
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = Column::ALL.len() as isize;
        let next = (self.cursor.index() as isize + delta).rem_euclid(len);
        self.cursor = Column::ALL[next as usize];
    }

    pub fn direction_for(&self, column: Column) -> Option<Direction> {
        self.active.filter(|(c, _)| *c == column).map(|(_, d)| d)
    }

    fn compare(&self, a: &SessionRecord, b: &SessionRecord) -> Ordering {
        match self.active {
            Some((col, Direction::Asc)) => col.compare(a, b),
            Some((col, Direction::Desc)) => col.compare(a, b).reverse(),
            None => Ordering::Equal,
        }
    }
}

/// Multi-select status filter with an "All" entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    selected: [bool; SessionStatus::ALL.len()],
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self {
            selected: [false; SessionStatus::ALL.len()],
        }
    }
}

impl StatusFilter {
    /// Entries shown in the filter list: All, then each status.
    pub const ENTRIES: usize = SessionStatus::ALL.len() + 1;

    pub fn is_all(&self) -> bool {
        !self.selected.iter().any(|s| *s)
    }

    pub fn is_selected(&self, status: SessionStatus) -> bool {
        self.position(status).is_some_and(|i| self.selected[i])
    }

    /// Toggle a filter entry; 0 is All.
    pub fn toggle(&mut self, entry: usize) {
        if entry == 0 {
            self.selected = [false; SessionStatus::ALL.len()];
        } else if let Some(slot) = self.selected.get_mut(entry - 1) {
            // Emptying the selection falls back to All.
            *slot = !*slot;
        }
    }

    pub fn matches(&self, status: SessionStatus) -> bool {
        self.is_all() || self.is_selected(status)
    }

    pub fn entry_label(entry: usize) -> &'static str {
        match entry {
            0 => "all",
            n => SessionStatus::ALL
                .get(n - 1)
                .map(|s| s.label())
                .unwrap_or("?"),
        }
    }

    pub fn entry_checked(&self, entry: usize) -> bool {
        match entry {
            0 => self.is_all(),
            n => self.selected.get(n - 1).copied().unwrap_or(false),
        }
    }

    pub fn summary(&self) -> String {
        if self.is_all() {
            return "all".to_string();
        }
        SessionStatus::ALL
            .iter()
            .filter(|s| self.is_selected(**s))
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn position(&self, status: SessionStatus) -> Option<usize> {
        SessionStatus::ALL.iter().position(|s| *s == status)
    }
}

/// State carried across attach cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub sort: Sort,
    pub filter: StatusFilter,
    pub search: String,
    pub cursor_id: Option<String>,
}

/// Confirmation dialogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    Kill { id: String },
    Detach { id: String, clients: u32 },
    /// Attach while other clients are attached; focus is the alternative.
    AttachAttached { id: String, clients: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Search,
    Filter { cursor: usize },
    Confirm(Confirm),
    Help,
}

pub struct App {
    pub view: ViewState,
    pub mode: Mode,
    records: Vec<SessionRecord>,
    /// Indices into `records`, filtered and sorted.
    visible: Vec<usize>,
    cursor: usize,
    pub notice: Option<String>,
    pub loaded: bool,
}

impl App {
    pub fn new(view: ViewState) -> Self {
        Self {
            view,
            mode: Mode::Browse,
            records: Vec::new(),
            visible: Vec::new(),
            cursor: 0,
            notice: None,
            loaded: false,
        }
    }

    pub fn into_view(mut self) -> ViewState {
        self.view.cursor_id = self.selected().map(|r| r.id.clone());
        self.view
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    /// Visible records in display order.
    pub fn rows(&self) -> impl Iterator<Item = &SessionRecord> {
        self.visible.iter().map(|i| &self.records[*i])
    }

    pub fn row_count(&self) -> usize {
        self.visible.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected(&self) -> Option<&SessionRecord> {
        self.visible.get(self.cursor).map(|i| &self.records[*i])
    }

    /// Replace every record after a full refresh.
    pub fn set_records(&mut self, records: Vec<SessionRecord>) {
        self.remember_cursor();
        self.records = records;
        self.loaded = true;
        self.recompute();
    }

    /// Apply a single-record refresh; `None` means the record is gone.
    pub fn update_record(&mut self, id: &str, record: Option<SessionRecord>) {
        self.remember_cursor();
        let existing = self.records.iter().position(|r| r.id == id);
        match (existing, record) {
            (Some(i), Some(record)) => self.records[i] = record,
            (Some(i), None) => {
                self.records.remove(i);
            }
            (None, Some(record)) => self.records.push(record),
            (None, None) => return,
        }
        self.recompute();
    }

    fn remember_cursor(&mut self) {
        if let Some(id) = self.selected().map(|r| r.id.clone()) {
            self.view.cursor_id = Some(id);
        }
    }

    /// Rebuild the visible rows, keeping the cursor on the same session.
    pub fn recompute(&mut self) {
        let needle = self.view.search.trim().to_string();
        let mut visible: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.view.filter.matches(r.status))
            .filter(|(_, r)| needle.is_empty() || r.matches(&needle))
            .map(|(i, _)| i)
            .collect();
        // Stable sort keeps store order for ties and for "no sort".
        let sort = self.view.sort;
        visible.sort_by(|a, b| sort.compare(&self.records[*a], &self.records[*b]));
        self.visible = visible;

        let wanted = self.view.cursor_id.as_deref();
        self.cursor = wanted
            .and_then(|id| self.visible.iter().position(|i| self.records[*i].id == id))
            .unwrap_or_else(|| self.cursor.min(self.visible.len().saturating_sub(1)));
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let max = self.visible.len() as isize - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, max) as usize;
        self.view.cursor_id = self.selected().map(|r| r.id.clone());
    }

    pub fn top(&mut self) {
        self.move_cursor(isize::MIN / 2);
    }

    pub fn bottom(&mut self) {
        self.move_cursor(isize::MAX / 2);
    }

    pub fn set_search(&mut self, search: String) {
        self.view.search = search;
        self.recompute();
    }

    pub fn toggle_filter(&mut self, entry: usize) {
        self.view.filter.toggle(entry);
        self.recompute();
    }

    pub fn cycle_sort(&mut self) {
        self.view.sort.cycle();
        self.recompute();
    }

    /// Count of records per status, over all records.
    pub fn status_counts(&self) -> Vec<(SessionStatus, usize)> {
        SessionStatus::ALL
            .iter()
            .map(|s| (*s, self.records.iter().filter(|r| r.status == *s).count()))
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}
