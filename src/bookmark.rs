//! Resume position for a course: remote first, local cache as fallback.

use crate::cache::{CacheKey, CacheKind, LocalCache, load_json};
use crate::content::Course;
use crate::remote::ProgressRemote;
use crate::remote::payloads::BookmarkPayload;
use crate::sync::{SyncCoordinator, SyncJob, SyncWrite};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Bookmark {
    pub topic_id: String,
    pub page_index: usize,
}

impl Bookmark {
    pub fn new(topic_id: impl Into<String>, page_index: usize) -> Self {
        Self {
            topic_id: topic_id.into(),
            page_index,
        }
    }

    fn to_payload(&self) -> BookmarkPayload {
        BookmarkPayload {
            topic_id: self.topic_id.clone(),
            page_index: self.page_index,
        }
    }
}

/// Narrow a stored bookmark to the loaded course: unknown topics read as
/// absent and pages are clamped into range.
pub fn validate(course: &Course, candidate: BookmarkPayload) -> Option<Bookmark> {
    let Some(topic) = course.topic(&candidate.topic_id) else {
        debug!(topic_id = %candidate.topic_id, "Ignoring bookmark for unknown topic");
        return None;
    };
    let last_page = topic.last_page()?;
    Some(Bookmark {
        topic_id: topic.id.clone(),
        page_index: candidate.page_index.min(last_page),
    })
}

pub struct BookmarkManager {
    course_id: String,
    remote: Arc<dyn ProgressRemote>,
    cache: Arc<dyn LocalCache>,
}

impl BookmarkManager {
    pub fn new(
        course_id: impl Into<String>,
        remote: Arc<dyn ProgressRemote>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        Self {
            course_id: course_id.into(),
            remote,
            cache,
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::new(CacheKind::Bookmark, self.course_id.clone())
    }

    /// Mirror the position remotely; the cache gets it only if that fails.
    pub fn save_bookmark(&self, sync: &SyncCoordinator, bookmark: &Bookmark) {
        let payload = bookmark.to_payload();
        sync.dispatch(SyncJob::with_fallback(
            SyncWrite::Bookmark {
                course_id: self.course_id.clone(),
                bookmark: payload.clone(),
            },
            self.cache_key(),
            &payload,
        ));
    }

    pub fn load_bookmark(&self, course: &Course) -> Option<Bookmark> {
        let remote = match self.remote.get_bookmark(&self.course_id) {
            Ok(found) => found,
            Err(err) => {
                warn!(course_id = %self.course_id, "Remote bookmark unavailable: {err:#}");
                None
            }
        };
        let candidate = match remote {
            Some(payload) => {
                debug!(course_id = %self.course_id, "Using remote bookmark");
                Some(payload)
            }
            None => load_json::<BookmarkPayload>(self.cache.as_ref(), &self.cache_key()),
        };
        let bookmark = candidate.and_then(|payload| validate(course, payload));
        if let Some(bookmark) = &bookmark {
            info!(
                course_id = %self.course_id,
                topic_id = %bookmark.topic_id,
                page = bookmark.page_index,
                "Resuming from bookmark"
            );
        }
        bookmark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::content::fallback_course;
    use crate::remote::memory::MemoryBackend;

    fn payload(topic_id: &str, page_index: usize) -> BookmarkPayload {
        BookmarkPayload {
            topic_id: topic_id.to_string(),
            page_index,
        }
    }

    #[test]
    fn unknown_topic_is_absent() {
        let course = fallback_course("c");
        assert_eq!(validate(&course, payload("99", 0)), None);
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let course = fallback_course("c");
        assert_eq!(
            validate(&course, payload("2", 50)),
            Some(Bookmark::new("2", 3))
        );
    }

    #[test]
    fn round_trip_through_cache_when_remote_is_down() {
        let course = fallback_course("c1");
        let remote = Arc::new(MemoryBackend::new());
        remote.set_failing(true);
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::spawn(remote.clone(), cache.clone());
        let manager = BookmarkManager::new("c1", remote.clone(), cache.clone());

        manager.save_bookmark(&sync, &Bookmark::new("3", 7));
        sync.flush();

        assert_eq!(manager.load_bookmark(&course), Some(Bookmark::new("3", 7)));
    }

    #[test]
    fn remote_bookmark_wins_over_cache() {
        let course = fallback_course("c1");
        let remote = Arc::new(MemoryBackend::new());
        let cache = Arc::new(MemoryCache::new());
        crate::cache::store_json(
            &*cache,
            &CacheKey::new(CacheKind::Bookmark, "c1"),
            &payload("1", 1),
        );
        let sync = SyncCoordinator::spawn(remote.clone(), cache.clone());
        let manager = BookmarkManager::new("c1", remote.clone(), cache.clone());

        manager.save_bookmark(&sync, &Bookmark::new("4", 2));
        sync.flush();

        assert_eq!(manager.load_bookmark(&course), Some(Bookmark::new("4", 2)));
    }

    #[test]
    fn nothing_stored_is_absent() {
        let course = fallback_course("c1");
        let manager = BookmarkManager::new(
            "c1",
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryCache::new()),
        );
        assert_eq!(manager.load_bookmark(&course), None);
    }
}
