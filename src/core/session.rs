//! In-memory state of one call session.
//!
//! Every user intent maps to one synchronous transition on [`Session`]. The
//! only asynchronous piece, the AI hint, is split into
//! [`Session::begin_hint_request`] and [`Session::complete_hint`]; the
//! [`HintTicket`] handed out by the first is checked by the second so a result
//! for a step the agent has already left is dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::core::catalog::{Catalog, Category, Script, Step};

pub const FONT_SIZE_MIN: u32 = 12;
pub const FONT_SIZE_MAX: u32 = 32;
pub const FONT_SIZE_STEP: i32 = 2;

/// Every configuration error starts with this prefix.
pub const CONFIG_ERROR_PREFIX: &str = "Помилка";
pub const CONFIG_ERROR_HINT: &str =
    "Помилка: API ключ не знайдено. Будь ласка, налаштуйте оточення.";
/// Stands in for the client's last phrase when the agent has typed nothing.
pub const LISTENING_PLACEHOLDER: &str = "Клієнт слухає...";

pub fn is_config_error(hint: &str) -> bool {
    hint.starts_with(CONFIG_ERROR_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NoteId(u64);

impl NoteId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for NoteId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: NoteId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub is_key_point: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplaySettings {
    pub font_size: u32,
    pub high_contrast: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self { font_size: 18, high_contrast: false }
    }
}

/// Identifies the cursor position a hint was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintTicket {
    pub script_id: String,
    pub step_index: usize,
    epoch: u64,
}

/// Everything the hint task needs, captured at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintRequest {
    pub ticket: HintTicket,
    pub step_content: String,
    pub last_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintDispatch {
    /// Loading flag is set; the caller must run the request and report back.
    Dispatched(HintRequest),
    /// No credential: the configuration error was stored as the hint.
    NotConfigured,
    NoActiveScript,
    /// A request is already outstanding.
    InFlight,
}

#[derive(Debug, Clone)]
pub struct Session {
    catalog: Catalog,
    active_script: Option<usize>,
    active_step: usize,
    search_query: String,
    notes: Vec<Note>,
    draft: String,
    last_hint: Option<String>,
    hint_loading: bool,
    display: DisplaySettings,
    // Bumped on every script/step change.
    cursor_epoch: u64,
    last_note_id: u64,
}

impl Session {
    pub fn new(catalog: Catalog, display: DisplaySettings) -> Self {
        let font_size = display.font_size.clamp(FONT_SIZE_MIN, FONT_SIZE_MAX);
        Self {
            catalog,
            active_script: None,
            active_step: 0,
            search_query: String::new(),
            notes: Vec::new(),
            draft: String::new(),
            last_hint: None,
            hint_loading: false,
            display: DisplaySettings { font_size, ..display },
            cursor_epoch: 0,
            last_note_id: 0,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn active_script(&self) -> Option<&Script> {
        self.active_script.map(|idx| &self.catalog.list()[idx])
    }

    pub fn active_script_id(&self) -> Option<&str> {
        self.active_script().map(|s| s.id.as_str())
    }

    pub fn active_step_index(&self) -> usize {
        self.active_step
    }

    pub fn active_step(&self) -> Option<&Step> {
        self.active_script().map(|s| &s.steps[self.active_step])
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn last_hint(&self) -> Option<&str> {
        self.last_hint.as_deref()
    }

    pub fn hint_loading(&self) -> bool {
        self.hint_loading
    }

    pub fn display(&self) -> DisplaySettings {
        self.display
    }

    pub fn visible_scripts(&self) -> Vec<(Category, Vec<&Script>)> {
        self.catalog.grouped(&self.search_query)
    }

    fn invalidate_cursor(&mut self) {
        self.last_hint = None;
        self.cursor_epoch += 1;
    }

    /// Returns `false` (and changes nothing) for an id not in the catalog.
    pub fn select_script(&mut self, id: &str) -> bool {
        let Some(idx) = self.catalog.index_of(id) else {
            log::debug!("select_script: unknown id {}", id);
            return false;
        };
        self.active_script = Some(idx);
        self.active_step = 0;
        self.invalidate_cursor();
        true
    }

    pub fn go_to_step(&mut self, index: usize) -> bool {
        let in_range = self
            .active_script()
            .is_some_and(|script| index <= script.last_step_index());
        if in_range {
            self.active_step = index;
            self.invalidate_cursor();
        }
        in_range
    }

    pub fn can_advance(&self) -> bool {
        self.active_script()
            .is_some_and(|s| self.active_step < s.last_step_index())
    }

    pub fn can_retreat(&self) -> bool {
        self.active_script.is_some() && self.active_step > 0
    }

    pub fn advance(&mut self) -> bool {
        self.can_advance() && self.go_to_step(self.active_step + 1)
    }

    pub fn retreat(&mut self) -> bool {
        self.can_retreat() && self.go_to_step(self.active_step - 1)
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn add_note(&mut self, text: &str, is_key_point: bool) -> Option<NoteId> {
        self.add_note_at(text, is_key_point, Utc::now())
    }

    /// Prepends a note created at `now`. Whitespace-only text is ignored.
    pub fn add_note_at(
        &mut self,
        text: &str,
        is_key_point: bool,
        now: DateTime<Utc>,
    ) -> Option<NoteId> {
        if text.trim().is_empty() {
            return None;
        }

        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let id = millis.max(self.last_note_id + 1);
        self.last_note_id = id;

        let note = Note {
            id: NoteId(id),
            timestamp: now,
            content: text.to_string(),
            is_key_point,
        };
        self.notes.insert(0, note);
        self.draft.clear();
        Some(NoteId(id))
    }

    /// Turns the current draft into a note.
    pub fn submit_draft(&mut self, is_key_point: bool) -> Option<NoteId> {
        let text = std::mem::take(&mut self.draft);
        let id = self.add_note(&text, is_key_point);
        if id.is_none() {
            self.draft = text;
        }
        id
    }

    pub fn delete_note(&mut self, id: NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        self.notes.len() != before
    }

    pub fn adjust_font_size(&mut self, delta: i32) {
        let size = i64::from(self.display.font_size) + i64::from(delta);
        let clamped = size.clamp(i64::from(FONT_SIZE_MIN), i64::from(FONT_SIZE_MAX));
        self.display.font_size = u32::try_from(clamped).unwrap_or(FONT_SIZE_MIN);
    }

    pub fn increase_font(&mut self) {
        self.adjust_font_size(FONT_SIZE_STEP);
    }

    pub fn decrease_font(&mut self) {
        self.adjust_font_size(-FONT_SIZE_STEP);
    }

    pub fn toggle_contrast(&mut self) {
        self.display.high_contrast = !self.display.high_contrast;
    }

    pub fn set_high_contrast(&mut self, value: bool) {
        self.display.high_contrast = value;
    }

    pub fn begin_hint_request(&mut self, configured: bool) -> HintDispatch {
        if self.active_script.is_none() {
            return HintDispatch::NoActiveScript;
        }
        if self.hint_loading {
            return HintDispatch::InFlight;
        }
        if !configured {
            self.last_hint = Some(CONFIG_ERROR_HINT.to_string());
            return HintDispatch::NotConfigured;
        }
        let Some(script) = self.active_script() else {
            return HintDispatch::NoActiveScript;
        };

        let ticket = HintTicket {
            script_id: script.id.clone(),
            step_index: self.active_step,
            epoch: self.cursor_epoch,
        };
        let step_content = script.steps[self.active_step].content.clone();
        let last_response = if self.draft.trim().is_empty() {
            LISTENING_PLACEHOLDER.to_string()
        } else {
            self.draft.clone()
        };

        self.hint_loading = true;
        HintDispatch::Dispatched(HintRequest { ticket, step_content, last_response })
    }

    /// Applies a resolved hint. Always clears the loading flag; the text is
    /// kept only if the cursor has not moved since the ticket was issued.
    pub fn complete_hint(&mut self, ticket: &HintTicket, text: String) -> bool {
        self.hint_loading = false;
        let current = ticket.epoch == self.cursor_epoch
            && self.active_script_id() == Some(ticket.script_id.as_str())
            && self.active_step == ticket.step_index;
        if current {
            self.last_hint = Some(text);
        } else {
            log::info!(
                "Discarding hint for {}#{}: cursor moved",
                ticket.script_id,
                ticket.step_index
            );
        }
        current
    }
}
