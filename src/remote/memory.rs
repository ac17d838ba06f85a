//! In-memory backend used by tests and demos. A failure switch turns every
//! call into an error so offline paths can be exercised.

use super::payloads::{
    BookmarkPayload, CoursePayload, NotePayload, NotesPayload, ProgressPayload,
};
use super::{CatalogService, ProgressRemote, RemoteProgress};
use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Store {
    courses: BTreeMap<String, CoursePayload>,
    progress: BTreeMap<String, ProgressPayload>,
    completed: BTreeMap<String, Vec<String>>,
    bookmarks: BTreeMap<String, BookmarkPayload>,
    notes: BTreeMap<String, NotesPayload>,
    writes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn insert_course(&self, course: CoursePayload) {
        self.with_store(|store| {
            store.courses.insert(course.id.clone(), course);
        });
    }

    pub fn progress(&self, course_id: &str) -> Option<ProgressPayload> {
        self.with_store(|store| store.progress.get(course_id).cloned())
    }

    pub fn completed_topics(&self, course_id: &str) -> Vec<String> {
        self.with_store(|store| store.completed.get(course_id).cloned().unwrap_or_default())
    }

    pub fn bookmark(&self, course_id: &str) -> Option<BookmarkPayload> {
        self.with_store(|store| store.bookmarks.get(course_id).cloned())
    }

    pub fn notes(&self, course_id: &str) -> NotesPayload {
        self.with_store(|store| store.notes.get(course_id).cloned().unwrap_or_default())
    }

    /// Number of successful writes applied so far.
    pub fn write_count(&self) -> usize {
        self.with_store(|store| store.writes)
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut Store) -> T) -> T {
        let mut store = match self.store.lock() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut store)
    }

    fn ensure_up(&self) -> Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(anyhow!("memory backend is failing"));
        }
        Ok(())
    }
}

impl CatalogService for MemoryBackend {
    fn get_course(&self, course_id: &str) -> Result<Option<CoursePayload>> {
        self.ensure_up()?;
        Ok(self.with_store(|store| store.courses.get(course_id).cloned()))
    }
}

impl ProgressRemote for MemoryBackend {
    fn get_progress(&self, course_id: &str) -> Result<RemoteProgress> {
        self.ensure_up()?;
        Ok(self.with_store(|store| {
            let mut progress = RemoteProgress::default();
            if let Some(saved) = store.progress.get(course_id) {
                progress.per_topic = saved
                    .per_topic
                    .iter()
                    .map(|(topic_id, percent)| (topic_id.clone(), f64::from(*percent)))
                    .collect();
                progress.viewed_pages = saved.viewed_pages.clone();
            }
            for topic_id in store.completed.get(course_id).into_iter().flatten() {
                progress.per_topic.insert(topic_id.clone(), 100.0);
            }
            progress
        }))
    }

    fn post_progress(&self, course_id: &str, payload: &ProgressPayload) -> Result<()> {
        self.ensure_up()?;
        self.with_store(|store| {
            store.progress.insert(course_id.to_string(), payload.clone());
            store.writes += 1;
        });
        Ok(())
    }

    fn complete_topic(&self, course_id: &str, topic_id: &str) -> Result<()> {
        self.ensure_up()?;
        self.with_store(|store| {
            let completed = store.completed.entry(course_id.to_string()).or_default();
            if !completed.iter().any(|id| id == topic_id) {
                completed.push(topic_id.to_string());
            }
            store.writes += 1;
        });
        Ok(())
    }

    fn get_bookmark(&self, course_id: &str) -> Result<Option<BookmarkPayload>> {
        self.ensure_up()?;
        Ok(self.bookmark(course_id))
    }

    fn post_bookmark(&self, course_id: &str, bookmark: &BookmarkPayload) -> Result<()> {
        self.ensure_up()?;
        self.with_store(|store| {
            store
                .bookmarks
                .insert(course_id.to_string(), bookmark.clone());
            store.writes += 1;
        });
        Ok(())
    }

    fn get_notes(&self, course_id: &str) -> Result<NotesPayload> {
        self.ensure_up()?;
        Ok(self.notes(course_id))
    }

    fn post_note(&self, course_id: &str, note: &NotePayload) -> Result<()> {
        self.ensure_up()?;
        self.with_store(|store| {
            let topics = store.notes.entry(course_id.to_string()).or_default();
            let pages = topics.entry(note.topic_id.clone()).or_default();
            if note.text.trim().is_empty() {
                pages.remove(&note.page_index);
            } else {
                pages.insert(note.page_index, note.text.clone());
            }
            store.writes += 1;
        });
        Ok(())
    }
}
