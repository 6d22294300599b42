use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::layout::{SpreadLayout, SpreadSlot};
use crate::page_map::PageMap;
use crate::store::{PersistedDocumentState, StateStore};
use crate::{DocumentBackend, DocumentInfo};

pub const MAX_SPLIT_COUNT: usize = 10;
const DEFAULT_SPLIT_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStamp {
    pub at: SystemTime,
    pub page_number: usize,
}

impl ReadStamp {
    fn now(page_number: usize) -> Self {
        Self {
            at: SystemTime::now(),
            page_number,
        }
    }
}

/// One open/close cycle of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingSession {
    pub opened: ReadStamp,
    pub closed: Option<ReadStamp>,
}

pub struct Document {
    pub info: DocumentInfo,
    backend: Arc<dyn DocumentBackend>,
    pages: PageMap,
    page_index: usize,
    split_count: usize,
    inverted: bool,
    page_number_delta: Option<i64>,
    marks: HashMap<char, usize>,
    read_log: Vec<ReadingSession>,
    restored: bool,
}

impl Document {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        let info = backend.info().clone();
        let pages = PageMap::new(info.page_count);
        Self {
            info,
            backend,
            pages,
            page_index: 0,
            split_count: DEFAULT_SPLIT_COUNT,
            inverted: false,
            page_number_delta: None,
            marks: HashMap::new(),
            read_log: Vec::new(),
            restored: false,
        }
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    pub fn pages(&self) -> &PageMap {
        &self.pages
    }

    pub fn total_pages(&self) -> usize {
        self.pages.total_pages()
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Moves to `index`; negative values count from the end. Targets outside
    /// the document are rejected and the current page is kept.
    pub fn set_page_index(&mut self, index: i64) -> bool {
        let total = self.total_pages() as i64;
        let normalized = if index < 0 { total + index } else { index };
        if normalized < 0 || normalized >= total {
            return false;
        }
        self.page_index = normalized as usize;
        true
    }

    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }

    pub fn set_page_number(&mut self, number: i64) -> bool {
        number
            .checked_sub(1)
            .is_some_and(|index| self.set_page_index(index))
    }

    /// Jumps to a 1-based page number; `0` never wraps to the end and numbers
    /// past `i64::MAX` are rejected rather than read as counting from the end.
    pub fn go_to_page_number(&mut self, number: usize) -> bool {
        match i64::try_from(number) {
            Ok(number) if number >= 1 => self.set_page_number(number),
            _ => false,
        }
    }

    pub fn page_number_delta(&self) -> Option<i64> {
        self.page_number_delta
    }

    /// Page number as printed in the document, given the declared offset.
    pub fn real_page_number(&self) -> i64 {
        (self.page_number() as i64).saturating_add(self.page_number_delta.unwrap_or(0))
    }

    pub fn set_real_page_number(&mut self, printed: i64) -> bool {
        match printed.checked_sub(self.page_number_delta.unwrap_or(0)) {
            Some(number) if number >= 1 => self.set_page_number(number),
            _ => false,
        }
    }

    /// Declares that the current page is printed as `printed`; an offset that
    /// does not fit is rejected.
    pub fn set_page_number_delta_for(&mut self, printed: i64) -> bool {
        match printed.checked_sub(self.page_number() as i64) {
            Some(delta) => {
                self.page_number_delta = Some(delta);
                true
            }
            None => false,
        }
    }

    pub fn clear_page_number_delta(&mut self) {
        self.page_number_delta = None;
    }

    pub fn forward_pages(&mut self, count: usize) -> bool {
        let target = self.page_index.saturating_add(count);
        if target >= self.total_pages() {
            return false;
        }
        self.page_index = target;
        true
    }

    pub fn back_pages(&mut self, count: usize) -> bool {
        match self.page_index.checked_sub(count) {
            Some(target) => {
                self.page_index = target;
                true
            }
            None => false,
        }
    }

    pub fn split_count(&self) -> usize {
        self.split_count
    }

    pub fn set_split_count(&mut self, count: usize) -> bool {
        if !(1..=MAX_SPLIT_COUNT).contains(&count) {
            return false;
        }
        self.split_count = count;
        true
    }

    pub fn toggle_split(&mut self) {
        self.split_count = if self.split_count > 1 { 1 } else { 2 };
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn invert(&mut self) {
        self.inverted = !self.inverted;
    }

    /// Blank slot to the left of the spread anchor, which in right-to-left
    /// order sits after it.
    pub fn insert_blank_left(&mut self) -> bool {
        self.pages.insert_blank_at(self.page_index + 1)
    }

    pub fn insert_blank_right(&mut self) -> bool {
        self.pages.insert_blank_at(self.page_index)
    }

    pub fn toggle_first_blank(&mut self) {
        self.pages.toggle_first_blank();
        if self.page_index >= self.total_pages() {
            self.page_index = self.total_pages().saturating_sub(1);
        }
    }

    pub fn mark(&mut self, label: char) {
        self.marks.insert(label, self.page_index);
    }

    pub fn jump(&mut self, label: char) -> bool {
        match self.marks.get(&label) {
            Some(&index) => self.set_page_index(index as i64),
            None => false,
        }
    }

    pub fn marks(&self) -> &HashMap<char, usize> {
        &self.marks
    }

    pub fn read_log(&self) -> &[ReadingSession] {
        &self.read_log
    }

    /// Whether the last load found stored state for this document.
    pub fn restored(&self) -> bool {
        self.restored
    }

    pub fn spread_layout(&self, width: f32, height: f32) -> Option<SpreadLayout> {
        let split = self.split_count;
        let page_size = (0..split)
            .rev()
            .filter_map(|offset| self.pages.actual_page(self.page_index + offset))
            .find_map(|page| self.backend.page_size(page).ok())?;

        let mut layout = SpreadLayout::fit(page_size, split, width, height)?;
        layout.slots = (0..split)
            .map(|position| {
                let offset = if self.inverted {
                    position
                } else {
                    split - position - 1
                };
                let virtual_index = self.page_index + offset;
                SpreadSlot {
                    virtual_index,
                    actual_page: self.pages.actual_page(virtual_index),
                }
            })
            .collect();
        Some(layout)
    }

    pub fn snapshot(&self) -> PersistedDocumentState {
        PersistedDocumentState {
            inverted: Some(self.inverted),
            split_count: Some(self.split_count),
            page_index: Some(self.page_index),
            page_number_delta: self.page_number_delta,
            marks: Some(self.marks.clone()),
            blank_pages: Some(self.pages.blank_indices()),
        }
    }

    /// Overlays the fields present in `state`; absent fields keep their
    /// current values. Blanks are replayed before the page index is checked.
    pub fn apply_snapshot(&mut self, state: &PersistedDocumentState) {
        if let Some(blanks) = &state.blank_pages {
            self.pages.replay_blanks(blanks);
            if self.page_index >= self.total_pages() {
                self.page_index = self.total_pages().saturating_sub(1);
            }
        }
        if let Some(inverted) = state.inverted {
            self.inverted = inverted;
        }
        if let Some(split) = state.split_count {
            if !self.set_split_count(split) {
                warn!(split, "ignoring stored split count out of range");
            }
        }
        if let Some(index) = state.page_index {
            if !self.set_page_index(index as i64) {
                warn!(index, "ignoring stored page outside document");
            }
        }
        if let Some(delta) = state.page_number_delta {
            self.page_number_delta = Some(delta);
        }
        if let Some(marks) = &state.marks {
            self.marks = marks.clone();
        }
    }

    /// Merges stored state for this document; returns whether any was found.
    pub fn load(&mut self, store: &dyn StateStore) -> bool {
        let state = match store.load(&self.info.path) {
            Ok(state) => state,
            Err(err) => {
                warn!(?err, path = %self.info.path.display(), "failed to load document state");
                None
            }
        };
        self.restored = state.is_some();
        if let Some(state) = state {
            self.apply_snapshot(&state);
        }
        self.restored
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        store.save(&self.info.path, &self.snapshot())
    }

    #[instrument(skip_all, fields(path = %self.info.path.display()))]
    pub fn open(&mut self, store: &dyn StateStore) {
        self.load(store);
        self.begin_reading();
    }

    pub fn begin_reading(&mut self) {
        let opened = ReadStamp::now(self.page_number());
        info!(page = opened.page_number, "document opened");
        self.read_log.push(ReadingSession {
            opened,
            closed: None,
        });
    }

    #[instrument(skip_all, fields(path = %self.info.path.display()))]
    pub fn close(&mut self, store: &dyn StateStore) -> Result<()> {
        let page_number = self.page_number();
        if let Some(session) = self.read_log.last_mut() {
            if session.closed.is_none() {
                let closed = ReadStamp::now(page_number);
                let seconds = closed
                    .at
                    .duration_since(session.opened.at)
                    .map(|elapsed| elapsed.as_secs())
                    .unwrap_or_default();
                info!(
                    from = session.opened.page_number,
                    to = closed.page_number,
                    seconds,
                    "document closed"
                );
                session.closed = Some(closed);
            }
        }
        self.save(store)
    }

    /// Status text for the title and status line.
    pub fn title(&self) -> String {
        let name = self
            .info
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>");
        let mut title = format!("{} - {}/{}", name, self.page_number(), self.total_pages());
        if self.page_number_delta.is_some() {
            title.push_str(&format!(" (p. {})", self.real_page_number()));
        }
        if self.split_count != DEFAULT_SPLIT_COUNT {
            title.push_str(&format!(" x{}", self.split_count));
        }
        if self.inverted {
            title.push_str(" [inv]");
        }
        title
    }
}
