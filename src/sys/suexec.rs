// src/sys/suexec.rs

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// The SuExec allow-list: a line-oriented file where each line is a
/// permitted document-root prefix. Shared with every other tool on the
/// host; edits are read-modify-write with no locking.
pub struct SuexecAllowList {
    path: PathBuf,
}

/// Loose membership test: a plain substring scan, not an exact line match.
/// A path that is a prefix of an already-listed path therefore counts as
/// present.
pub fn contains_entry(content: &str, entry: &str) -> bool {
    content.contains(entry)
}

impl SuexecAllowList {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensures `document_root` is covered by the allow-list, prepending it
    /// as a new first line when missing. Returns true when a line was added.
    pub async fn ensure_entry(&self, document_root: &Path) -> Result<bool, String> {
        let current = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(format!("Failed to read {}: {e}", self.path.display())),
        };

        let entry = document_root.display().to_string();
        if contains_entry(&current, &entry) {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }

        let updated = format!("{entry}\n{current}");
        fs::write(&self.path, updated)
            .await
            .map_err(|e| format!("Failed to write {}: {e}", self.path.display()))?;

        info!(path = %self.path.display(), "SuExec allow-list: added {entry}");
        Ok(true)
    }
}
