//! Per-topic viewed-page tracking and weighted course progress.
//!
//! Viewed pages are held as real sets. The array form only exists at the
//! persistence boundary (`persisted_*` / `restore`), where indices are also
//! validated against the loaded course.

use crate::content::{Course, Topic};
use crate::remote::RemoteProgress;
use crate::remote::payloads::ProgressPayload;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Cached/wire form of the viewed-page sets: ascending index arrays.
pub type PersistedViewedPages = BTreeMap<String, Vec<usize>>;
pub type PersistedCompletedTopics = BTreeMap<String, bool>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageVisit {
    pub newly_viewed: bool,
    pub auto_completed: bool,
}

impl PageVisit {
    pub fn changed(self) -> bool {
        self.newly_viewed || self.auto_completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The topic is not part of the loaded course.
    Unknown,
    /// Completed; the next topic in sequence has this index.
    Advance(usize),
    /// Completed the final topic.
    CourseComplete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    viewed: BTreeMap<String, BTreeSet<usize>>,
    completed: BTreeMap<String, bool>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted arrays, dropping anything the course does not
    /// contain.
    pub fn restore(
        course: &Course,
        viewed: &PersistedViewedPages,
        completed: &PersistedCompletedTopics,
    ) -> Self {
        let mut tracker = Self::new();
        tracker.absorb_viewed(course, viewed);
        for (topic_id, done) in completed {
            if *done {
                tracker.fill_topic(course, topic_id);
            }
        }
        tracker
    }

    /// Fold remote progress in: union of viewed arrays, and topics reported at
    /// 100% become complete. A percent below 100 names no pages, so it adds
    /// nothing to the viewed sets and weighted progress only counts pages the
    /// remote or cache listed.
    pub fn merge_remote(&mut self, course: &Course, remote: &RemoteProgress) {
        self.absorb_viewed(course, &remote.viewed_pages);
        for (topic_id, percent) in &remote.per_topic {
            if *percent >= 100.0 {
                self.fill_topic(course, topic_id);
            }
        }
    }

    fn absorb_viewed(&mut self, course: &Course, viewed: &PersistedViewedPages) {
        for (topic_id, pages) in viewed {
            let Some(topic) = course.topic(topic_id) else {
                debug!(topic_id = %topic_id, "Dropping viewed pages for unknown topic");
                continue;
            };
            let valid = pages
                .iter()
                .copied()
                .filter(|page| *page < topic.page_count());
            self.viewed.entry(topic.id.clone()).or_default().extend(valid);
        }
    }

    /// Idempotently record `page` as seen. Returns whether the set grew;
    /// unknown topics and out-of-range pages are ignored.
    pub fn mark_page_viewed(&mut self, course: &Course, topic_id: &str, page: usize) -> bool {
        let Some(topic) = course.topic(topic_id) else {
            debug!(topic_id, page, "Ignoring view of unknown topic");
            return false;
        };
        if page >= topic.page_count() {
            debug!(topic_id, page, "Ignoring view of out-of-range page");
            return false;
        }
        self.viewed.entry(topic.id.clone()).or_default().insert(page)
    }

    /// Mark the topic complete and count every one of its pages as viewed.
    pub fn complete_topic(&mut self, course: &Course, topic_id: &str) -> Completion {
        let Some(idx) = course.topic_index(topic_id) else {
            return Completion::Unknown;
        };
        self.fill_topic(course, topic_id);
        info!(topic_id, "Topic completed");
        if idx + 1 < course.topics.len() {
            Completion::Advance(idx + 1)
        } else {
            Completion::CourseComplete
        }
    }

    /// Record a navigation landing. Arriving on a topic's last page completes
    /// it (when `auto_complete` is on) but never moves the reader.
    pub fn visit_page(
        &mut self,
        course: &Course,
        topic_idx: usize,
        page: usize,
        auto_complete: bool,
    ) -> PageVisit {
        let Some(topic) = course.topics.get(topic_idx) else {
            return PageVisit::default();
        };
        let newly_viewed = self.mark_page_viewed(course, &topic.id, page);
        let auto_completed = auto_complete
            && topic.last_page() == Some(page)
            && !self.is_complete(&topic.id);
        if auto_completed {
            self.fill_topic(course, &topic.id);
            info!(topic_id = %topic.id, page, "Auto-completed topic on its last page");
        }
        PageVisit {
            newly_viewed,
            auto_completed,
        }
    }

    fn fill_topic(&mut self, course: &Course, topic_id: &str) -> bool {
        let Some(topic) = course.topic(topic_id) else {
            return false;
        };
        self.viewed
            .entry(topic.id.clone())
            .or_default()
            .extend(0..topic.page_count());
        self.completed.insert(topic.id.clone(), true);
        true
    }

    pub fn is_complete(&self, topic_id: &str) -> bool {
        self.completed.get(topic_id).copied().unwrap_or(false)
    }

    pub fn viewed(&self, topic_id: &str) -> Option<&BTreeSet<usize>> {
        self.viewed.get(topic_id)
    }

    pub fn viewed_count(&self, topic_id: &str) -> usize {
        self.viewed.get(topic_id).map_or(0, BTreeSet::len)
    }

    pub fn topic_percent(&self, topic: &Topic) -> u32 {
        rounded_percent(self.viewed_count(&topic.id), topic.page_count())
    }

    pub fn per_topic_progress(&self, course: &Course) -> BTreeMap<String, u32> {
        course
            .topics
            .iter()
            .map(|topic| (topic.id.clone(), self.topic_percent(topic)))
            .collect()
    }

    /// `round(100 * viewed / total)` across every page in the course.
    pub fn weighted_progress(&self, course: &Course) -> u32 {
        let viewed = course
            .topics
            .iter()
            .map(|topic| self.viewed_count(&topic.id))
            .sum();
        rounded_percent(viewed, course.total_pages())
    }

    pub fn persisted_viewed(&self) -> PersistedViewedPages {
        self.viewed
            .iter()
            .map(|(topic_id, pages)| (topic_id.clone(), pages.iter().copied().collect()))
            .collect()
    }

    pub fn persisted_completed(&self) -> PersistedCompletedTopics {
        self.completed.clone()
    }

    pub fn progress_payload(&self, course: &Course) -> ProgressPayload {
        ProgressPayload {
            overall: self.weighted_progress(course),
            per_topic: self.per_topic_progress(course),
            viewed_pages: self.persisted_viewed(),
        }
    }
}

/// Half-up integer rounding of `100 * part / whole`; 0 when `whole` is 0.
fn rounded_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let scaled = (200 * part as u64 + whole as u64) / (2 * whole as u64);
    scaled.min(100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fallback_course;

    fn small_course() -> Course {
        Course {
            id: "c".to_string(),
            title: "C".to_string(),
            topics: vec![
                Topic {
                    id: "a".to_string(),
                    title: "A".to_string(),
                    pages: vec!["a0".into(), "a1".into(), "a2".into()],
                },
                Topic {
                    id: "b".to_string(),
                    title: "B".to_string(),
                    pages: vec!["b0".into()],
                },
            ],
        }
    }

    fn assert_in_range(tracker: &ProgressTracker, course: &Course) {
        for topic in &course.topics {
            if let Some(pages) = tracker.viewed(&topic.id) {
                assert!(pages.iter().all(|page| *page < topic.page_count()));
            }
        }
    }

    #[test]
    fn marking_a_page_twice_is_idempotent() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();

        assert!(tracker.mark_page_viewed(&course, "a", 1));
        let once = tracker.clone();
        assert!(!tracker.mark_page_viewed(&course, "a", 1));

        assert_eq!(tracker, once);
        assert_eq!(tracker.viewed_count("a"), 1);
    }

    #[test]
    fn invalid_targets_are_ignored() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();

        assert!(!tracker.mark_page_viewed(&course, "a", 3));
        assert!(!tracker.mark_page_viewed(&course, "zzz", 0));

        assert_eq!(tracker, ProgressTracker::new());
        assert_eq!(tracker.weighted_progress(&course), 0);
    }

    #[test]
    fn completion_fills_every_page() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();
        tracker.mark_page_viewed(&course, "a", 2);

        assert_eq!(tracker.complete_topic(&course, "a"), Completion::Advance(1));
        assert_eq!(tracker.viewed_count("a"), 3);
        assert!(tracker.is_complete("a"));
        assert_eq!(tracker.weighted_progress(&course), 75);

        assert_eq!(
            tracker.complete_topic(&course, "b"),
            Completion::CourseComplete
        );
        assert_eq!(tracker.weighted_progress(&course), 100);
        assert_eq!(tracker.complete_topic(&course, "nope"), Completion::Unknown);
    }

    enum Step {
        View(&'static str, usize),
        Complete(&'static str),
        Visit(usize, usize),
    }

    #[test]
    fn progress_never_decreases_over_a_sequence() {
        let course = fallback_course("seq");
        let mut tracker = ProgressTracker::new();
        let mut last = tracker.weighted_progress(&course);
        let steps = [
            Step::View("1", 0),
            Step::View("1", 0),
            Step::View("3", 11),
            Step::Complete("2"),
            Step::View("2", 1),
            Step::Visit(0, 16),
            Step::Complete("1"),
            Step::View("8", 99),
        ];
        for step in steps {
            match step {
                Step::View(topic_id, page) => {
                    tracker.mark_page_viewed(&course, topic_id, page);
                }
                Step::Complete(topic_id) => {
                    tracker.complete_topic(&course, topic_id);
                }
                Step::Visit(topic_idx, page) => {
                    tracker.visit_page(&course, topic_idx, page, true);
                }
            }
            let now = tracker.weighted_progress(&course);
            assert!(now >= last, "progress went from {last} to {now}");
            assert_in_range(&tracker, &course);
            last = now;
        }
        assert_eq!(last, rounded_percent(17 + 4 + 1, course.total_pages()));
    }

    #[test]
    fn last_page_visit_auto_completes_once() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();

        let first = tracker.visit_page(&course, 0, 2, true);
        assert_eq!(
            first,
            PageVisit {
                newly_viewed: true,
                auto_completed: true
            }
        );
        assert_eq!(tracker.topic_percent(&course.topics[0]), 100);

        let again = tracker.visit_page(&course, 0, 2, true);
        assert!(!again.changed());
    }

    #[test]
    fn auto_complete_can_be_switched_off() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();

        let visit = tracker.visit_page(&course, 0, 2, false);

        assert!(visit.newly_viewed);
        assert!(!visit.auto_completed);
        assert!(!tracker.is_complete("a"));
        assert_eq!(tracker.viewed_count("a"), 1);
    }

    #[test]
    fn empty_course_has_zero_progress() {
        let course = Course {
            id: "none".to_string(),
            title: "None".to_string(),
            topics: Vec::new(),
        };
        assert_eq!(ProgressTracker::new().weighted_progress(&course), 0);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(rounded_percent(1, 8), 13);
        assert_eq!(rounded_percent(1, 3), 33);
        assert_eq!(rounded_percent(2, 3), 67);
        assert_eq!(rounded_percent(17, 95), 18);
        assert_eq!(rounded_percent(0, 95), 0);
    }

    #[test]
    fn persisted_form_is_sorted_and_restores_with_validation() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();
        tracker.mark_page_viewed(&course, "a", 2);
        tracker.mark_page_viewed(&course, "a", 0);

        let persisted = tracker.persisted_viewed();
        assert_eq!(persisted.get("a"), Some(&vec![0, 2]));

        let mut tampered = persisted.clone();
        tampered.insert("a".to_string(), vec![2, 0, 0, 7]);
        tampered.insert("ghost".to_string(), vec![0]);
        let completed = BTreeMap::from([("b".to_string(), true), ("ghost".to_string(), true)]);

        let restored = ProgressTracker::restore(&course, &tampered, &completed);

        assert_eq!(restored.persisted_viewed().get("a"), Some(&vec![0, 2]));
        assert!(restored.viewed("ghost").is_none());
        assert!(restored.is_complete("b"));
        assert_eq!(restored.viewed_count("b"), 1);
        assert!(!restored.persisted_completed().contains_key("ghost"));
    }

    #[test]
    fn remote_progress_merges_as_union() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();
        tracker.mark_page_viewed(&course, "a", 0);

        let remote = RemoteProgress {
            per_topic: BTreeMap::from([("b".to_string(), 100.0), ("a".to_string(), 33.0)]),
            viewed_pages: BTreeMap::from([("a".to_string(), vec![1, 9])]),
        };
        tracker.merge_remote(&course, &remote);

        assert_eq!(tracker.persisted_viewed().get("a"), Some(&vec![0, 1]));
        assert!(!tracker.is_complete("a"));
        assert!(tracker.is_complete("b"));
    }

    #[test]
    fn partial_remote_percent_without_pages_adds_nothing() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();

        let remote = RemoteProgress {
            per_topic: BTreeMap::from([("a".to_string(), 66.0)]),
            viewed_pages: BTreeMap::new(),
        };
        tracker.merge_remote(&course, &remote);

        assert_eq!(tracker.viewed_count("a"), 0);
        assert!(!tracker.is_complete("a"));
        assert_eq!(tracker.weighted_progress(&course), 0);
    }

    #[test]
    fn payload_carries_overall_and_per_topic() {
        let course = small_course();
        let mut tracker = ProgressTracker::new();
        tracker.mark_page_viewed(&course, "a", 0);

        let payload = tracker.progress_payload(&course);

        assert_eq!(payload.overall, 25);
        assert_eq!(payload.per_topic.get("a"), Some(&33));
        assert_eq!(payload.per_topic.get("b"), Some(&0));
        assert_eq!(payload.viewed_pages.get("a"), Some(&vec![0]));
    }
}
