//! Offline-tolerant course reader.
//!
//! A course is an ordered list of topics, each a list of page images. The
//! reader tracks which pages were seen, derives weighted progress, remembers
//! the resume position and per-page notes, and mirrors all of it to a remote
//! store when one is reachable. The local cache keeps the reader usable when
//! it is not.

pub mod bookmark;
pub mod cache;
pub mod config;
pub mod content;
pub mod notes;
pub mod progress;
pub mod remote;
pub mod session;
pub mod sync;

use std::fs;
use std::path::Path;
use ts_rs::TS;

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<(), String> {
    T::export_all_to(out_dir).map_err(|err| err.to_string())
}

/// Regenerate the TypeScript view types consumed by the web front end.
pub fn export_ts_bindings(out_dir: &Path) -> Result<(), String> {
    fs::create_dir_all(out_dir)
        .map_err(|err| format!("Failed to create {}: {err}", out_dir.display()))?;

    for entry in fs::read_dir(out_dir)
        .map_err(|err| format!("Failed to list {}: {err}", out_dir.display()))?
    {
        let entry = entry.map_err(|err| format!("Failed to read entry: {err}"))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path)
                .map_err(|err| format!("Failed to remove {}: {err}", path.display()))?;
        }
    }

    export_single_type::<remote::User>(out_dir)?;
    export_single_type::<remote::payloads::BookmarkPayload>(out_dir)?;
    export_single_type::<content::Course>(out_dir)?;
    export_single_type::<content::Topic>(out_dir)?;
    export_single_type::<bookmark::Bookmark>(out_dir)?;
    export_single_type::<sync::SyncStats>(out_dir)?;
    export_single_type::<session::TopicSummary>(out_dir)?;
    export_single_type::<session::ReaderSnapshot>(out_dir)?;
    export_single_type::<session::ReaderCommand>(out_dir)?;

    let index_content = r#"export type { User } from "./User";
export type { BookmarkPayload } from "./BookmarkPayload";
export type { Course } from "./Course";
export type { Topic } from "./Topic";
export type { Bookmark } from "./Bookmark";
export type { SyncStats } from "./SyncStats";
export type { TopicSummary } from "./TopicSummary";
export type { ReaderSnapshot } from "./ReaderSnapshot";
export type { ReaderCommand } from "./ReaderCommand";
"#;

    fs::write(out_dir.join("index.ts"), index_content).map_err(|err| {
        format!(
            "Failed to write {}: {err}",
            out_dir.join("index.ts").display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn export_writes_barrel_and_replaces_stale_files() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("course-reader-ts-{nanos}"));
        fs::create_dir_all(&dir).expect("create dir");
        fs::write(dir.join("Stale.ts"), "export type Stale = never;").expect("write stale");

        export_ts_bindings(&dir).expect("export");

        assert!(!dir.join("Stale.ts").exists());
        assert!(dir.join("ReaderSnapshot.ts").exists());
        let index = fs::read_to_string(dir.join("index.ts")).expect("index");
        assert!(index.contains("./ReaderCommand"));
        let _ = fs::remove_dir_all(&dir);
    }
}
