use crate::bookmark::{Bookmark, BookmarkManager};
use crate::cache::{CacheKey, CacheKind, LocalCache, load_json, store_json};
use crate::config::AppConfig;
use crate::content::{self, Course, Topic};
use crate::notes::NoteBook;
use crate::progress::{
    Completion, PersistedCompletedTopics, PersistedViewedPages, ProgressTracker,
};
use crate::remote::payloads::{NotePayload, NotesPayload};
use crate::remote::{AuthService, CatalogService, ProgressRemote, User};
use crate::sync::{SyncCoordinator, SyncJob, SyncStats, SyncWrite};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ts_rs::TS;

/// Collaborators injected into the reader.
#[derive(Clone)]
pub struct ReaderServices {
    pub auth: Arc<dyn AuthService>,
    pub catalog: Arc<dyn CatalogService>,
    pub remote: Arc<dyn ProgressRemote>,
    pub cache: Arc<dyn LocalCache>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub auto_complete_on_last_page: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            auto_complete_on_last_page: true,
        }
    }
}

impl From<&AppConfig> for ReaderOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            auto_complete_on_last_page: config.auto_complete_on_last_page,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct TopicSummary {
    pub id: String,
    pub title: String,
    pub page_count: usize,
    pub viewed_count: usize,
    pub percent: u32,
    pub completed: bool,
    pub unlocked: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ReaderSnapshot {
    pub course_id: String,
    pub course_title: String,
    pub user_name: String,
    pub topics: Vec<TopicSummary>,
    pub active_topic_idx: usize,
    pub active_topic_id: String,
    pub active_page: usize,
    pub page_count: usize,
    pub page_ref: Option<String>,
    pub overall_progress: u32,
    pub course_complete: bool,
    pub note: Option<String>,
    pub can_prev_page: bool,
    pub can_next_page: bool,
    pub bookmark: Bookmark,
    pub sync: SyncStats,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ReaderCommand {
    GetSnapshot,
    NextPage,
    PrevPage,
    SetPage { page: usize },
    SelectTopic { topic_idx: usize },
    MarkTopicComplete,
    SetNote { text: String },
}

impl ReaderCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetSnapshot => "reader_get_snapshot",
            Self::NextPage => "reader_next_page",
            Self::PrevPage => "reader_prev_page",
            Self::SetPage { .. } => "reader_set_page",
            Self::SelectTopic { .. } => "reader_select_topic",
            Self::MarkTopicComplete => "reader_mark_topic_complete",
            Self::SetNote { .. } => "reader_set_note",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaderEvent {
    pub action: &'static str,
    pub snapshot: ReaderSnapshot,
}

/// View-model for one open course. Owns the view state; every mutation is
/// applied locally first and mirrored through the sync coordinator.
pub struct CourseReader {
    course: Course,
    user: User,
    tracker: ProgressTracker,
    notes: NoteBook,
    bookmarks: BookmarkManager,
    cache: Arc<dyn LocalCache>,
    options: ReaderOptions,
    active_topic: usize,
    active_page: usize,
    course_complete: bool,
    sync: SyncCoordinator,
}

impl CourseReader {
    /// Open a course for the signed-in user. Fails only when nobody is signed
    /// in; every remote problem degrades to cached or built-in data.
    pub fn open(course_id: &str, services: ReaderServices, options: ReaderOptions) -> Result<Self> {
        let Some(user) = services.auth.current_user() else {
            return Err(anyhow!("sign in before opening course {course_id}"));
        };
        let course = content::load_course(services.catalog.as_ref(), course_id);
        let tracker = load_progress(&course, services.remote.as_ref(), services.cache.as_ref());
        let notes = load_notes(&course, services.remote.as_ref(), services.cache.as_ref());
        let bookmarks = BookmarkManager::new(
            course.id.clone(),
            Arc::clone(&services.remote),
            Arc::clone(&services.cache),
        );
        let (active_topic, active_page) = bookmarks
            .load_bookmark(&course)
            .and_then(|bookmark| {
                course
                    .topic_index(&bookmark.topic_id)
                    .map(|idx| (idx, bookmark.page_index))
            })
            .unwrap_or((0, 0));
        let course_complete = all_topics_complete(&course, &tracker);
        let sync = SyncCoordinator::spawn(services.remote, Arc::clone(&services.cache));

        info!(
            course_id = %course.id,
            user_id = %user.id,
            topic = active_topic,
            page = active_page,
            progress = tracker.weighted_progress(&course),
            "Opened course"
        );
        Ok(Self {
            course,
            user,
            tracker,
            notes,
            bookmarks,
            cache: services.cache,
            options,
            active_topic,
            active_page,
            course_complete,
            sync,
        })
    }

    pub fn course(&self) -> &Course {
        &self.course
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn active_position(&self) -> (usize, usize) {
        (self.active_topic, self.active_page)
    }

    pub fn weighted_progress(&self) -> u32 {
        self.tracker.weighted_progress(&self.course)
    }

    pub fn is_course_complete(&self) -> bool {
        self.course_complete
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    pub fn note(&self) -> Option<&str> {
        let topic = self.active_topic()?;
        self.notes.get(&topic.id, self.active_page)
    }

    /// Wait for queued remote writes; call before exiting.
    pub fn shutdown(&self) {
        self.sync.flush();
        debug!(course_id = %self.course.id, stats = ?self.sync.stats(), "Reader flushed");
    }

    pub fn apply_command(&mut self, command: ReaderCommand) -> ReaderEvent {
        let action = command.action();
        match command {
            ReaderCommand::GetSnapshot => {}
            ReaderCommand::NextPage => self.next_page(),
            ReaderCommand::PrevPage => self.prev_page(),
            ReaderCommand::SetPage { page } => self.set_page(page),
            ReaderCommand::SelectTopic { topic_idx } => self.select_topic(topic_idx),
            ReaderCommand::MarkTopicComplete => self.mark_topic_complete(),
            ReaderCommand::SetNote { text } => self.set_note(&text),
        }
        ReaderEvent {
            action,
            snapshot: self.snapshot(),
        }
    }

    fn active_topic(&self) -> Option<&Topic> {
        self.course.topics.get(self.active_topic)
    }

    fn active_last_page(&self) -> usize {
        self.active_topic()
            .and_then(Topic::last_page)
            .unwrap_or(0)
    }

    pub fn next_page(&mut self) {
        if self.active_page < self.active_last_page() {
            self.land_on(self.active_topic, self.active_page + 1);
        }
    }

    pub fn prev_page(&mut self) {
        if self.active_page > 0 {
            self.land_on(self.active_topic, self.active_page - 1);
        }
    }

    /// Jump within the active topic; out-of-range pages clamp to the last one.
    pub fn set_page(&mut self, page: usize) {
        let clamped = page.min(self.active_last_page());
        if clamped != page {
            debug!(requested = page, clamped, "Clamped page index");
        }
        self.land_on(self.active_topic, clamped);
    }

    pub fn select_topic(&mut self, topic_idx: usize) {
        if topic_idx >= self.course.topics.len() {
            warn!(topic_idx, "Ignoring selection of unknown topic");
            return;
        }
        self.land_on(topic_idx, 0);
    }

    /// Complete the active topic and move on to the next one. On the final
    /// topic the reader stays put and the course is flagged complete.
    pub fn mark_topic_complete(&mut self) {
        let Some(topic_id) = self.active_topic().map(|topic| topic.id.clone()) else {
            return;
        };
        match self.tracker.complete_topic(&self.course, &topic_id) {
            Completion::Unknown => {}
            Completion::Advance(next) => {
                self.sync_completion(&topic_id);
                self.refresh_course_complete();
                self.land_on(next, 0);
            }
            Completion::CourseComplete => {
                self.sync_completion(&topic_id);
                self.set_course_complete();
            }
        }
    }

    /// Flag the course once every topic is complete, however that happened.
    fn refresh_course_complete(&mut self) {
        if all_topics_complete(&self.course, &self.tracker) {
            self.set_course_complete();
        }
    }

    fn set_course_complete(&mut self) {
        if !self.course_complete {
            self.course_complete = true;
            info!(course_id = %self.course.id, "Course complete");
        }
    }

    pub fn set_note(&mut self, text: &str) {
        let Some(topic_id) = self.active_topic().map(|topic| topic.id.clone()) else {
            return;
        };
        self.notes.set(&topic_id, self.active_page, text);
        self.sync.dispatch(SyncJob::with_fallback(
            SyncWrite::Note {
                course_id: self.course.id.clone(),
                note: NotePayload {
                    topic_id,
                    page_index: self.active_page,
                    text: text.to_string(),
                },
            },
            self.cache_key(CacheKind::Notes),
            &self.notes.to_payload(),
        ));
    }

    fn land_on(&mut self, topic_idx: usize, page: usize) {
        self.active_topic = topic_idx;
        self.active_page = page;
        let visit = self.tracker.visit_page(
            &self.course,
            topic_idx,
            page,
            self.options.auto_complete_on_last_page,
        );
        debug!(topic = topic_idx, page, ?visit, "Landed on page");
        if visit.changed() {
            if visit.auto_completed {
                if let Some(topic_id) = self.active_topic().map(|topic| topic.id.clone()) {
                    self.sync_completion(&topic_id);
                }
                self.refresh_course_complete();
            } else {
                self.sync_progress();
            }
        }
        self.save_bookmark();
    }

    fn current_bookmark(&self) -> Bookmark {
        let topic_id = self
            .active_topic()
            .map(|topic| topic.id.clone())
            .unwrap_or_default();
        Bookmark::new(topic_id, self.active_page)
    }

    fn save_bookmark(&self) {
        self.bookmarks
            .save_bookmark(&self.sync, &self.current_bookmark());
    }

    fn cache_key(&self, kind: CacheKind) -> CacheKey {
        CacheKey::new(kind, self.course.id.clone())
    }

    /// Write viewed pages and overall progress through to the cache, then
    /// mirror them remotely.
    fn sync_progress(&self) {
        let cache = self.cache.as_ref();
        store_json(
            cache,
            &self.cache_key(CacheKind::ViewedPages),
            &self.tracker.persisted_viewed(),
        );
        store_json(
            cache,
            &self.cache_key(CacheKind::OverallProgress),
            &self.weighted_progress(),
        );
        self.sync.dispatch(SyncJob::remote_only(SyncWrite::Progress {
            course_id: self.course.id.clone(),
            payload: self.tracker.progress_payload(&self.course),
        }));
    }

    fn sync_completion(&self, topic_id: &str) {
        store_json(
            self.cache.as_ref(),
            &self.cache_key(CacheKind::CompletedTopics),
            &self.tracker.persisted_completed(),
        );
        self.sync.dispatch(SyncJob::remote_only(SyncWrite::CompleteTopic {
            course_id: self.course.id.clone(),
            topic_id: topic_id.to_string(),
        }));
        self.sync_progress();
    }

    fn topic_unlocked(&self, idx: usize, topic: &Topic) -> bool {
        if idx == 0 || self.tracker.viewed_count(&topic.id) > 0 {
            return true;
        }
        self.course
            .topics
            .get(idx - 1)
            .is_some_and(|previous| self.tracker.is_complete(&previous.id))
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        let topics = self
            .course
            .topics
            .iter()
            .enumerate()
            .map(|(idx, topic)| TopicSummary {
                id: topic.id.clone(),
                title: topic.title.clone(),
                page_count: topic.page_count(),
                viewed_count: self.tracker.viewed_count(&topic.id),
                percent: self.tracker.topic_percent(topic),
                completed: self.tracker.is_complete(&topic.id),
                unlocked: self.topic_unlocked(idx, topic),
            })
            .collect();
        let active = self.active_topic();
        ReaderSnapshot {
            course_id: self.course.id.clone(),
            course_title: self.course.title.clone(),
            user_name: self.user.name.clone(),
            topics,
            active_topic_idx: self.active_topic,
            active_topic_id: active.map(|topic| topic.id.clone()).unwrap_or_default(),
            active_page: self.active_page,
            page_count: active.map_or(0, Topic::page_count),
            page_ref: active.and_then(|topic| topic.pages.get(self.active_page).cloned()),
            overall_progress: self.weighted_progress(),
            course_complete: self.course_complete,
            note: self.note().map(str::to_string),
            can_prev_page: self.active_page > 0,
            can_next_page: self.active_page < self.active_last_page(),
            bookmark: self.current_bookmark(),
            sync: self.sync.stats(),
        }
    }
}

fn all_topics_complete(course: &Course, tracker: &ProgressTracker) -> bool {
    !course.topics.is_empty()
        && course
            .topics
            .iter()
            .all(|topic| tracker.is_complete(&topic.id))
}

fn load_progress(course: &Course, remote: &dyn ProgressRemote, cache: &dyn LocalCache) -> ProgressTracker {
    let viewed: PersistedViewedPages =
        load_json(cache, &CacheKey::new(CacheKind::ViewedPages, course.id.clone()))
            .unwrap_or_default();
    let completed: PersistedCompletedTopics =
        load_json(cache, &CacheKey::new(CacheKind::CompletedTopics, course.id.clone()))
            .unwrap_or_default();
    let mut tracker = ProgressTracker::restore(course, &viewed, &completed);
    match remote.get_progress(&course.id) {
        Ok(progress) => tracker.merge_remote(course, &progress),
        Err(err) => warn!(course_id = %course.id, "Remote progress unavailable; using cache: {err:#}"),
    }
    tracker
}

fn load_notes(course: &Course, remote: &dyn ProgressRemote, cache: &dyn LocalCache) -> NoteBook {
    let cached: NotesPayload = load_json(cache, &CacheKey::new(CacheKind::Notes, course.id.clone()))
        .unwrap_or_default();
    let mut notes = NoteBook::restore(course, &cached);
    match remote.get_notes(&course.id) {
        Ok(remote_notes) => notes.merge_remote(course, &remote_notes),
        Err(err) => warn!(course_id = %course.id, "Remote notes unavailable; using cache: {err:#}"),
    }
    notes
}
