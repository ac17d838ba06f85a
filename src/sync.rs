//! Best-effort remote mirror for reader state.
//!
//! Callers mutate their in-memory state first and then hand a job to the
//! coordinator. Jobs run on one background worker in dispatch order, get a
//! single attempt each, and on failure write their fallback payload into the
//! local cache. Nothing here is fatal and nothing feeds back into the
//! caller's state.

use crate::cache::{CacheKey, LocalCache};
use crate::remote::ProgressRemote;
use crate::remote::payloads::{BookmarkPayload, NotePayload, ProgressPayload};
use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use tracing::{debug, warn};
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncWrite {
    Progress {
        course_id: String,
        payload: ProgressPayload,
    },
    CompleteTopic {
        course_id: String,
        topic_id: String,
    },
    Bookmark {
        course_id: String,
        bookmark: BookmarkPayload,
    },
    Note {
        course_id: String,
        note: NotePayload,
    },
}

impl SyncWrite {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::CompleteTopic { .. } => "complete_topic",
            Self::Bookmark { .. } => "bookmark",
            Self::Note { .. } => "note",
        }
    }

    pub fn course_id(&self) -> &str {
        match self {
            Self::Progress { course_id, .. }
            | Self::CompleteTopic { course_id, .. }
            | Self::Bookmark { course_id, .. }
            | Self::Note { course_id, .. } => course_id,
        }
    }

    fn send(&self, remote: &dyn ProgressRemote) -> Result<()> {
        match self {
            Self::Progress { course_id, payload } => remote.post_progress(course_id, payload),
            Self::CompleteTopic {
                course_id,
                topic_id,
            } => remote.complete_topic(course_id, topic_id),
            Self::Bookmark {
                course_id,
                bookmark,
            } => remote.post_bookmark(course_id, bookmark),
            Self::Note { course_id, note } => remote.post_note(course_id, note),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWrite {
    pub key: CacheKey,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncJob {
    pub write: SyncWrite,
    pub fallback: Option<CacheWrite>,
}

impl SyncJob {
    /// A job whose payload the caller already wrote through to the cache.
    pub fn remote_only(write: SyncWrite) -> Self {
        Self {
            write,
            fallback: None,
        }
    }

    pub fn with_fallback<T: Serialize>(write: SyncWrite, key: CacheKey, value: &T) -> Self {
        let fallback = match serde_json::to_string(value) {
            Ok(value) => Some(CacheWrite { key, value }),
            Err(err) => {
                warn!(%key, "Failed to encode sync fallback: {err}");
                None
            }
        };
        Self { write, fallback }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncStats {
    /// Jobs the remote accepted.
    #[ts(type = "number")]
    pub synced: u64,
    /// Failed jobs whose payload went to the local cache instead.
    #[ts(type = "number")]
    pub saved_locally: u64,
    /// Failed jobs with no fallback (already written through locally).
    #[ts(type = "number")]
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    synced: AtomicU64,
    saved_locally: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SyncStats {
        SyncStats {
            synced: self.synced.load(Ordering::Relaxed),
            saved_locally: self.saved_locally.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

enum Envelope {
    Job(SyncJob),
    Flush(mpsc::Sender<()>),
}

pub struct SyncCoordinator {
    sender: Option<mpsc::Sender<Envelope>>,
    worker: Option<thread::JoinHandle<()>>,
    cache: Arc<dyn LocalCache>,
    counters: Arc<Counters>,
}

impl SyncCoordinator {
    pub fn spawn(remote: Arc<dyn ProgressRemote>, cache: Arc<dyn LocalCache>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let counters = Arc::new(Counters::default());
        let worker_cache = Arc::clone(&cache);
        let worker_counters = Arc::clone(&counters);
        let spawned = thread::Builder::new()
            .name("course-sync".to_string())
            .spawn(move || run_worker(receiver, remote, worker_cache, worker_counters));
        match spawned {
            Ok(worker) => Self {
                sender: Some(sender),
                worker: Some(worker),
                cache,
                counters,
            },
            Err(err) => {
                warn!("Failed to start sync worker; writes will stay local: {err}");
                Self {
                    sender: None,
                    worker: None,
                    cache,
                    counters,
                }
            }
        }
    }

    /// Queue a job. Never blocks on I/O; if the worker is gone the fallback
    /// is written immediately.
    pub fn dispatch(&self, job: SyncJob) {
        debug!(kind = job.write.label(), course_id = job.write.course_id(), "Dispatching sync job");
        let job = match &self.sender {
            Some(sender) => match sender.send(Envelope::Job(job)) {
                Ok(()) => return,
                Err(mpsc::SendError(Envelope::Job(job))) => job,
                Err(mpsc::SendError(Envelope::Flush(_))) => return,
            },
            None => job,
        };
        warn!(kind = job.write.label(), "Sync worker unavailable; keeping write local");
        record_failure(self.cache.as_ref(), &self.counters, job);
    }

    /// Block until every job dispatched before this call has finished.
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done_tx, done_rx) = mpsc::channel();
        if sender.send(Envelope::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Sync worker panicked before draining its queue");
            }
        }
    }
}

fn run_worker(
    receiver: mpsc::Receiver<Envelope>,
    remote: Arc<dyn ProgressRemote>,
    cache: Arc<dyn LocalCache>,
    counters: Arc<Counters>,
) {
    for envelope in receiver {
        match envelope {
            Envelope::Job(job) => run_job(remote.as_ref(), cache.as_ref(), &counters, job),
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Sync worker stopped");
}

fn run_job(remote: &dyn ProgressRemote, cache: &dyn LocalCache, counters: &Counters, job: SyncJob) {
    match job.write.send(remote) {
        Ok(()) => {
            counters.synced.fetch_add(1, Ordering::Relaxed);
            debug!(
                kind = job.write.label(),
                course_id = job.write.course_id(),
                "Remote sync succeeded"
            );
        }
        Err(err) => {
            warn!(
                kind = job.write.label(),
                course_id = job.write.course_id(),
                "Remote sync failed: {err:#}"
            );
            record_failure(cache, counters, job);
        }
    }
}

fn record_failure(cache: &dyn LocalCache, counters: &Counters, job: SyncJob) {
    match job.fallback {
        Some(fallback) => {
            cache.set(&fallback.key, &fallback.value);
            counters.saved_locally.fetch_add(1, Ordering::Relaxed);
            debug!(key = %fallback.key, "Saved sync payload locally");
        }
        None => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKind, MemoryCache, load_json};
    use crate::remote::memory::MemoryBackend;

    fn bookmark_job(course_id: &str, topic_id: &str, page_index: usize) -> SyncJob {
        let bookmark = BookmarkPayload {
            topic_id: topic_id.to_string(),
            page_index,
        };
        SyncJob::with_fallback(
            SyncWrite::Bookmark {
                course_id: course_id.to_string(),
                bookmark: bookmark.clone(),
            },
            CacheKey::new(CacheKind::Bookmark, course_id),
            &bookmark,
        )
    }

    #[test]
    fn failed_write_lands_in_cache() {
        let remote = Arc::new(MemoryBackend::new());
        remote.set_failing(true);
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::spawn(remote.clone(), cache.clone());

        sync.dispatch(bookmark_job("c1", "2", 3));
        sync.flush();

        let cached: Option<BookmarkPayload> =
            load_json(&*cache, &CacheKey::new(CacheKind::Bookmark, "c1"));
        assert_eq!(
            cached,
            Some(BookmarkPayload {
                topic_id: "2".to_string(),
                page_index: 3
            })
        );
        assert_eq!(
            sync.stats(),
            SyncStats {
                synced: 0,
                saved_locally: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn successful_write_leaves_cache_alone() {
        let remote = Arc::new(MemoryBackend::new());
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::spawn(remote.clone(), cache.clone());

        sync.dispatch(bookmark_job("c1", "1", 4));
        sync.flush();

        assert!(cache.is_empty());
        assert_eq!(remote.bookmark("c1").map(|bm| bm.page_index), Some(4));
        assert_eq!(sync.stats().synced, 1);
    }

    #[test]
    fn jobs_apply_in_dispatch_order() {
        let remote = Arc::new(MemoryBackend::new());
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::spawn(remote.clone(), cache.clone());

        for page in 0..20 {
            sync.dispatch(bookmark_job("c1", "1", page));
        }
        sync.flush();

        assert_eq!(remote.bookmark("c1").map(|bm| bm.page_index), Some(19));
        assert_eq!(remote.write_count(), 20);
    }

    #[test]
    fn remote_only_failure_is_counted_without_cache_write() {
        let remote = Arc::new(MemoryBackend::new());
        remote.set_failing(true);
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::spawn(remote.clone(), cache.clone());

        sync.dispatch(SyncJob::remote_only(SyncWrite::CompleteTopic {
            course_id: "c1".to_string(),
            topic_id: "1".to_string(),
        }));
        sync.flush();

        assert!(cache.is_empty());
        assert_eq!(sync.stats().failed, 1);
    }

    #[test]
    fn drop_drains_pending_jobs() {
        let remote = Arc::new(MemoryBackend::new());
        let cache = Arc::new(MemoryCache::new());
        {
            let sync = SyncCoordinator::spawn(remote.clone(), cache.clone());
            sync.dispatch(bookmark_job("c9", "5", 1));
        }
        assert_eq!(remote.bookmark("c9").map(|bm| bm.topic_id), Some("5".to_string()));
    }
}
