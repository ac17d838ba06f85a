//! Course structure resolution.
//!
//! The catalog is asked first. When it is unreachable, has no such course, or
//! returns nothing usable, the reader falls back to the built-in e-book
//! layout below so it is always renderable. Persisted progress and
//! bookmarks are keyed by these topic ids, so the table must not change.

use crate::remote::CatalogService;
use crate::remote::payloads::CoursePayload;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub pages: Vec<String>,
}

impl Topic {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn last_page(&self) -> Option<usize> {
        self.pages.len().checked_sub(1)
    }
}

impl Course {
    pub fn topic(&self, topic_id: &str) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.id == topic_id)
    }

    pub fn topic_index(&self, topic_id: &str) -> Option<usize> {
        self.topics.iter().position(|topic| topic.id == topic_id)
    }

    pub fn total_pages(&self) -> usize {
        self.topics.iter().map(Topic::page_count).sum()
    }
}

struct FallbackTopic {
    id: &'static str,
    title: &'static str,
    first_page: usize,
    last_page: usize,
}

const FALLBACK_PAGE_PREFIX: &str = "/ebook/page-";

const FALLBACK_TOPICS: [FallbackTopic; 8] = [
    FallbackTopic {
        id: "1",
        title: "Introduction",
        first_page: 2,
        last_page: 18,
    },
    FallbackTopic {
        id: "2",
        title: "Getting Oriented",
        first_page: 19,
        last_page: 22,
    },
    FallbackTopic {
        id: "3",
        title: "Core Concepts",
        first_page: 23,
        last_page: 34,
    },
    FallbackTopic {
        id: "4",
        title: "Working with Data",
        first_page: 35,
        last_page: 47,
    },
    FallbackTopic {
        id: "5",
        title: "Building Blocks",
        first_page: 48,
        last_page: 59,
    },
    FallbackTopic {
        id: "6",
        title: "Putting It Together",
        first_page: 60,
        last_page: 71,
    },
    FallbackTopic {
        id: "7",
        title: "Advanced Topics",
        first_page: 72,
        last_page: 84,
    },
    FallbackTopic {
        id: "8",
        title: "Review and Next Steps",
        first_page: 85,
        last_page: 96,
    },
];

static FALLBACK_STRUCTURE: Lazy<Vec<Topic>> = Lazy::new(|| {
    FALLBACK_TOPICS
        .iter()
        .map(|topic| Topic {
            id: topic.id.to_string(),
            title: topic.title.to_string(),
            pages: (topic.first_page..=topic.last_page)
                .map(|page| format!("{FALLBACK_PAGE_PREFIX}{page}.jpg"))
                .collect(),
        })
        .collect()
});

/// The built-in structure used whenever the catalog has nothing for us.
pub fn fallback_course(course_id: &str) -> Course {
    Course {
        id: course_id.to_string(),
        title: default_title(course_id),
        topics: FALLBACK_STRUCTURE.clone(),
    }
}

/// Resolve the course structure. Never fails: any catalog problem degrades to
/// the fallback layout.
pub fn load_course(catalog: &dyn CatalogService, course_id: &str) -> Course {
    match catalog.get_course(course_id) {
        Ok(Some(payload)) => match course_from_payload(course_id, payload) {
            Some(course) => {
                info!(
                    course_id,
                    topics = course.topics.len(),
                    pages = course.total_pages(),
                    "Resolved course from catalog"
                );
                course
            }
            None => {
                warn!(course_id, "Catalog course has no usable topics; using fallback layout");
                fallback_course(course_id)
            }
        },
        Ok(None) => {
            info!(course_id, "Course not in catalog; using fallback layout");
            fallback_course(course_id)
        }
        Err(err) => {
            warn!(course_id, "Catalog unavailable; using fallback layout: {err:#}");
            fallback_course(course_id)
        }
    }
}

fn course_from_payload(course_id: &str, payload: CoursePayload) -> Option<Course> {
    let mut seen = HashSet::new();
    let mut topics = Vec::with_capacity(payload.topics.len());
    for topic in payload.topics {
        let id = topic.id.trim().to_string();
        if id.is_empty() {
            warn!(course_id, title = %topic.title, "Skipping topic without id");
            continue;
        }
        if !seen.insert(id.clone()) {
            warn!(course_id, topic_id = %id, "Skipping duplicate topic id");
            continue;
        }
        if topic.pages.is_empty() {
            debug!(course_id, topic_id = %id, "Skipping topic without pages");
            continue;
        }
        let title = if topic.title.trim().is_empty() {
            format!("Topic {}", topics.len() + 1)
        } else {
            topic.title
        };
        topics.push(Topic {
            id,
            title,
            pages: topic.pages,
        });
    }
    if topics.is_empty() {
        return None;
    }
    let title = if payload.title.trim().is_empty() {
        default_title(course_id)
    } else {
        payload.title
    };
    Some(Course {
        id: course_id.to_string(),
        title,
        topics,
    })
}

fn default_title(course_id: &str) -> String {
    format!("Course {course_id}")
}
