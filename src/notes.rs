//! Free-text notes attached to individual pages.

use crate::content::Course;
use crate::remote::payloads::NotesPayload;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteBook {
    cells: BTreeMap<String, BTreeMap<usize, String>>,
}

impl NoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a cached/remote map, keeping only cells the course contains.
    pub fn restore(course: &Course, notes: &NotesPayload) -> Self {
        let mut book = Self::new();
        book.absorb(course, notes);
        book
    }

    /// Remote cells win over local ones; local-only cells are kept.
    pub fn merge_remote(&mut self, course: &Course, remote: &NotesPayload) {
        self.absorb(course, remote);
    }

    fn absorb(&mut self, course: &Course, notes: &NotesPayload) {
        for (topic_id, pages) in notes {
            let Some(topic) = course.topic(topic_id) else {
                debug!(topic_id = %topic_id, "Dropping notes for unknown topic");
                continue;
            };
            for (page, text) in pages {
                if *page < topic.page_count() {
                    self.set(topic_id, *page, text);
                }
            }
        }
    }

    /// Blank text clears the cell.
    pub fn set(&mut self, topic_id: &str, page: usize, text: &str) {
        if text.trim().is_empty() {
            if let Some(pages) = self.cells.get_mut(topic_id) {
                pages.remove(&page);
                if pages.is_empty() {
                    self.cells.remove(topic_id);
                }
            }
            return;
        }
        self.cells
            .entry(topic_id.to_string())
            .or_default()
            .insert(page, text.to_string());
    }

    pub fn get(&self, topic_id: &str, page: usize) -> Option<&str> {
        self.cells
            .get(topic_id)
            .and_then(|pages| pages.get(&page))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn to_payload(&self) -> NotesPayload {
        self.cells.clone()
    }
}
