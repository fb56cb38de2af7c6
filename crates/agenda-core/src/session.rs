use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use crate::item::{Item, Priority};
use crate::query::{
    self, DayEntry, RangeFilter, SortKey, Stats, StatusFilter, ViewState, WeekEntry,
};
use crate::store::{Store, StoreError, UndoSlot};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(
        "cannot reorder while a filter, search, sort or range is active; \
         reset them to move items"
    )]
    ReorderRefused,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyText,
    OutOfRange(usize),
    AtBoundary,
    NothingToUndo,
}

/// What a mutation did. Skipped operations leave the list and the file
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Applied,
    Moved(usize),
    Skipped(SkipReason),
}

/// One interactive session: the list, where it lives, the pending undo and
/// the current list-view parameters.
#[derive(Debug)]
pub struct Session {
    store: Store,
    items: Vec<Item>,
    undo: Option<UndoSlot>,
    view: ViewState,
    load_warning: Option<String>,
}

impl Session {
    #[instrument(skip(store, now), fields(file = %store.path.display()))]
    pub fn open(store: Store, now: NaiveDateTime) -> Self {
        let loaded = store.load(now);
        let undo = store.load_undo();
        info!(
            items = loaded.items.len(),
            pending_undo = undo.is_some(),
            "opened session"
        );
        Self {
            store,
            items: loaded.items,
            undo,
            view: ViewState::default(),
            load_warning: loaded.warning,
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn pending_undo(&self) -> Option<&UndoSlot> {
        self.undo.as_ref()
    }

    /// Set when the data file existed but could not be read as a list.
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        self.view.status = status;
    }

    pub fn set_range(&mut self, range: RangeFilter) {
        self.view.range = range;
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.view.query = query.into();
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.view.sort = sort;
    }

    pub fn set_view(&mut self, view: ViewState) {
        self.view = view;
    }

    pub fn visible(&self, today: NaiveDate) -> Vec<usize> {
        query::visible_indices(&self.items, &self.view, today)
    }

    pub fn day(&self, date: NaiveDate) -> Vec<DayEntry<'_>> {
        query::day_projection(&self.items, date)
    }

    pub fn week(&self, anchor: NaiveDate) -> Vec<WeekEntry<'_>> {
        query::week_projection(&self.items, anchor)
    }

    pub fn stats(&self) -> Stats {
        query::stats(&self.items)
    }

    #[instrument(skip(self, text, now))]
    pub fn add(
        &mut self,
        text: &str,
        priority: Priority,
        due: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Result<Change, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            debug!("refusing to add empty item");
            return Ok(Change::Skipped(SkipReason::EmptyText));
        }

        self.items.push(Item::new(text, priority, due, now));
        info!(index = self.items.len() - 1, "item added");
        self.persist()?;
        Ok(Change::Applied)
    }

    #[instrument(skip(self, new_text))]
    pub fn edit(
        &mut self,
        index: usize,
        new_text: &str,
        new_due: Option<NaiveDateTime>,
    ) -> Result<Change, SessionError> {
        let new_text = new_text.trim();
        if new_text.is_empty() {
            return Ok(Change::Skipped(SkipReason::EmptyText));
        }
        let Some(item) = self.items.get_mut(index) else {
            return Ok(out_of_range(index));
        };

        item.text = new_text.to_string();
        item.set_due(new_due);
        info!("item edited");
        self.persist()?;
        Ok(Change::Applied)
    }

    #[instrument(skip(self))]
    pub fn delete(&mut self, index: usize) -> Result<Change, SessionError> {
        if index >= self.items.len() {
            return Ok(out_of_range(index));
        }

        let item = self.items.remove(index);
        if self.undo.is_some() {
            debug!("replacing pending undo");
        }
        self.undo = Some(UndoSlot { index, item });
        info!("item deleted");
        self.persist()?;
        Ok(Change::Applied)
    }

    /// Puts the last deleted item back, at the end if the list has since
    /// shrunk below its old position.
    #[instrument(skip(self))]
    pub fn undo(&mut self) -> Result<Change, SessionError> {
        let Some(UndoSlot { index, item }) = self.undo.take() else {
            return Ok(Change::Skipped(SkipReason::NothingToUndo));
        };

        let at = index.min(self.items.len());
        self.items.insert(at, item);
        info!(index = at, "delete undone");
        self.persist()?;
        Ok(Change::Applied)
    }

    #[instrument(skip(self, now))]
    pub fn toggle_done(&mut self, index: usize, now: NaiveDateTime) -> Result<Change, SessionError> {
        let Some(item) = self.items.get_mut(index) else {
            return Ok(out_of_range(index));
        };

        let done = !item.done;
        item.set_done(done, now);
        info!(done, "item toggled");
        self.persist()?;
        Ok(Change::Applied)
    }

    #[instrument(skip(self))]
    pub fn move_up(&mut self, index: usize) -> Result<Change, SessionError> {
        self.ensure_linear()?;
        if index >= self.items.len() {
            return Ok(out_of_range(index));
        }
        if index == 0 {
            return Ok(Change::Skipped(SkipReason::AtBoundary));
        }
        self.swap(index, index - 1)
    }

    #[instrument(skip(self))]
    pub fn move_down(&mut self, index: usize) -> Result<Change, SessionError> {
        self.ensure_linear()?;
        if index >= self.items.len() {
            return Ok(out_of_range(index));
        }
        if index + 1 == self.items.len() {
            return Ok(Change::Skipped(SkipReason::AtBoundary));
        }
        self.swap(index, index + 1)
    }

    /// Writes the list and the undo slot as they are now.
    #[instrument(skip(self))]
    pub fn save(&self) -> Result<(), SessionError> {
        self.persist()
    }

    fn swap(&mut self, from: usize, to: usize) -> Result<Change, SessionError> {
        self.items.swap(from, to);
        info!(from, to, "item moved");
        self.persist()?;
        Ok(Change::Moved(to))
    }

    fn ensure_linear(&self) -> Result<(), SessionError> {
        if self.view.is_linear() {
            return Ok(());
        }
        warn!(view = ?self.view, "reorder refused");
        Err(SessionError::ReorderRefused)
    }

    fn persist(&self) -> Result<(), SessionError> {
        self.store.save(&self.items)?;
        self.store.save_undo(self.undo.as_ref())?;
        Ok(())
    }
}

fn out_of_range(index: usize) -> Change {
    debug!(index, "index out of range; ignoring");
    Change::Skipped(SkipReason::OutOfRange(index))
}
