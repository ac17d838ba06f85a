//! Collaborator contracts for the reader: auth, catalog and the best-effort
//! progress store. Every call may fail; callers fall back to the local cache.

pub mod http;
pub mod memory;
pub mod payloads;

use anyhow::{Result, anyhow};
use payloads::{BookmarkPayload, CoursePayload, NotePayload, NotesPayload, ProgressPayload};
use std::sync::Mutex;

pub use payloads::{RemoteProgress, User};

pub trait AuthService: Send + Sync {
    fn current_user(&self) -> Option<User>;
    fn login(&self, email: &str, password: &str) -> Result<User>;
    fn logout(&self);
}

pub trait CatalogService: Send + Sync {
    /// `Ok(None)` means the catalog answered but has no such course.
    fn get_course(&self, course_id: &str) -> Result<Option<CoursePayload>>;
}

pub trait ProgressRemote: Send + Sync {
    fn get_progress(&self, course_id: &str) -> Result<RemoteProgress>;
    fn post_progress(&self, course_id: &str, payload: &ProgressPayload) -> Result<()>;
    fn complete_topic(&self, course_id: &str, topic_id: &str) -> Result<()>;
    fn get_bookmark(&self, course_id: &str) -> Result<Option<BookmarkPayload>>;
    fn post_bookmark(&self, course_id: &str, bookmark: &BookmarkPayload) -> Result<()>;
    fn get_notes(&self, course_id: &str) -> Result<NotesPayload>;
    fn post_note(&self, course_id: &str, note: &NotePayload) -> Result<()>;
}

/// Stand-in for an unreachable backend: every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRemote;

fn offline<T>() -> Result<T> {
    Err(anyhow!("remote store disabled"))
}

impl CatalogService for OfflineRemote {
    fn get_course(&self, _course_id: &str) -> Result<Option<CoursePayload>> {
        offline()
    }
}

impl ProgressRemote for OfflineRemote {
    fn get_progress(&self, _course_id: &str) -> Result<RemoteProgress> {
        offline()
    }

    fn post_progress(&self, _course_id: &str, _payload: &ProgressPayload) -> Result<()> {
        offline()
    }

    fn complete_topic(&self, _course_id: &str, _topic_id: &str) -> Result<()> {
        offline()
    }

    fn get_bookmark(&self, _course_id: &str) -> Result<Option<BookmarkPayload>> {
        offline()
    }

    fn post_bookmark(&self, _course_id: &str, _bookmark: &BookmarkPayload) -> Result<()> {
        offline()
    }

    fn get_notes(&self, _course_id: &str) -> Result<NotesPayload> {
        offline()
    }

    fn post_note(&self, _course_id: &str, _note: &NotePayload) -> Result<()> {
        offline()
    }
}

/// Auth service with a fixed identity, used when the backend is disabled.
#[derive(Debug, Default)]
pub struct StaticAuth {
    user: Mutex<Option<User>>,
}

impl StaticAuth {
    pub fn new(user: Option<User>) -> Self {
        Self {
            user: Mutex::new(user),
        }
    }

    pub fn signed_in(id: &str, name: &str, email: &str) -> Self {
        Self::new(Some(User {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        }))
    }
}

impl AuthService for StaticAuth {
    fn current_user(&self) -> Option<User> {
        match self.user.lock() {
            Ok(user) => user.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn login(&self, _email: &str, _password: &str) -> Result<User> {
        self.current_user()
            .ok_or_else(|| anyhow!("offline mode has no account to sign in to"))
    }

    fn logout(&self) {
        match self.user.lock() {
            Ok(mut user) => *user = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}
