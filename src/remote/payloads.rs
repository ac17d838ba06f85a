//! Wire schemas for the catalog, auth and progress endpoints.
//!
//! Responses are narrowed here so the rest of the crate never sees ad hoc
//! JSON shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub user: User,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoursePayload {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topics: Vec<TopicPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicPayload {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pages: Vec<String>,
}

/// Body of `postProgress`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub overall: u32,
    pub per_topic: BTreeMap<String, u32>,
    #[serde(default)]
    pub viewed_pages: BTreeMap<String, Vec<usize>>,
}

/// Narrowed result of `getProgress`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteProgress {
    pub per_topic: BTreeMap<String, f64>,
    pub viewed_pages: BTreeMap<String, Vec<usize>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProgressBody {
    Wrapped {
        #[serde(rename = "perTopic")]
        per_topic: BTreeMap<String, serde_json::Value>,
        #[serde(default, rename = "viewedPages")]
        viewed_pages: BTreeMap<String, serde_json::Value>,
    },
    Flat(BTreeMap<String, serde_json::Value>),
}

impl RemoteProgress {
    /// Accept either `{ "perTopic": {...}, "viewedPages": {...} }` or a bare
    /// `topicId -> percent` map. Non-numeric percents are dropped and the rest
    /// are clamped to `0..=100`. Viewed entries that are not non-negative
    /// integers are dropped one by one.
    pub fn from_json(value: serde_json::Value) -> anyhow::Result<Self> {
        let body: ProgressBody = serde_json::from_value(value)?;
        let (raw, viewed_pages) = match body {
            ProgressBody::Wrapped {
                per_topic,
                viewed_pages,
            } => (per_topic, narrow_viewed_pages(viewed_pages)),
            ProgressBody::Flat(per_topic) => (per_topic, BTreeMap::new()),
        };
        let per_topic = raw
            .into_iter()
            .filter_map(|(topic_id, percent)| {
                let percent = percent.as_f64().filter(|value| value.is_finite())?;
                Some((topic_id, percent.clamp(0.0, 100.0)))
            })
            .collect();
        Ok(Self {
            per_topic,
            viewed_pages,
        })
    }
}

fn narrow_viewed_pages(
    raw: BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, Vec<usize>> {
    raw.into_iter()
        .filter_map(|(topic_id, pages)| {
            let pages = pages.as_array()?;
            let mut valid: Vec<usize> = pages
                .iter()
                .filter_map(|page| page.as_u64().and_then(|page| usize::try_from(page).ok()))
                .collect();
            valid.sort_unstable();
            valid.dedup();
            Some((topic_id, valid))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BookmarkPayload {
    pub topic_id: String,
    pub page_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    pub topic_id: String,
    pub page_index: usize,
    pub text: String,
}

/// `topicId -> pageIndex -> text`, as returned by `getNotes`.
pub type NotesPayload = BTreeMap<String, BTreeMap<usize, String>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_accepts_wrapped_body() {
        let progress = RemoteProgress::from_json(json!({
            "overall": 40,
            "perTopic": { "1": 100, "2": 25.5 },
            "viewedPages": { "2": [0, 1] }
        }))
        .expect("wrapped body");

        assert_eq!(progress.per_topic.get("1"), Some(&100.0));
        assert_eq!(progress.per_topic.get("2"), Some(&25.5));
        assert_eq!(progress.viewed_pages.get("2"), Some(&vec![0, 1]));
    }

    #[test]
    fn malformed_viewed_entries_keep_the_wrapped_body() {
        let progress = RemoteProgress::from_json(json!({
            "perTopic": { "1": 100 },
            "viewedPages": { "1": [2, -1, "x", 0, 2], "2": "bad", "3": [1.5] }
        }))
        .expect("wrapped body");

        assert_eq!(progress.per_topic.get("1"), Some(&100.0));
        assert_eq!(progress.viewed_pages.get("1"), Some(&vec![0, 2]));
        assert!(!progress.viewed_pages.contains_key("2"));
        assert_eq!(progress.viewed_pages.get("3"), Some(&Vec::new()));
    }

    #[test]
    fn progress_accepts_flat_map_and_narrows_values() {
        let progress = RemoteProgress::from_json(json!({
            "1": 140,
            "2": -3,
            "3": "lots",
            "4": null
        }))
        .expect("flat body");

        assert_eq!(progress.per_topic.get("1"), Some(&100.0));
        assert_eq!(progress.per_topic.get("2"), Some(&0.0));
        assert!(!progress.per_topic.contains_key("3"));
        assert!(!progress.per_topic.contains_key("4"));
        assert!(progress.viewed_pages.is_empty());
    }

    #[test]
    fn course_payload_accepts_mongo_ids() {
        let course: CoursePayload = serde_json::from_value(json!({
            "_id": "abc",
            "title": "Rust 101",
            "topics": [{ "_id": "t1", "title": "Intro", "pages": ["/p/1.jpg"] }]
        }))
        .expect("course payload");

        assert_eq!(course.id, "abc");
        assert_eq!(course.topics[0].id, "t1");
        assert_eq!(course.topics[0].pages.len(), 1);
    }

    #[test]
    fn progress_payload_uses_camel_case() {
        let payload = ProgressPayload {
            overall: 10,
            per_topic: BTreeMap::from([("1".to_string(), 50)]),
            viewed_pages: BTreeMap::from([("1".to_string(), vec![0, 2])]),
        };
        let value = serde_json::to_value(&payload).expect("serializes");
        assert_eq!(
            value,
            json!({ "overall": 10, "perTopic": { "1": 50 }, "viewedPages": { "1": [0, 2] } })
        );
    }

    #[test]
    fn notes_payload_reads_string_page_keys() {
        let notes: NotesPayload =
            serde_json::from_value(json!({ "1": { "0": "first", "3": "later" } }))
                .expect("notes payload");
        assert_eq!(notes["1"][&3], "later");
    }
}
