//! Session library: durable state files under the user's config root.
//!
//! Active sessions live in `<root>/ongoing/<filename>.json` and move to
//! `<root>/complete/` once the merge succeeds. Saves go through a `.tmp`
//! sibling plus rename so a crash mid-write never leaves a torn state
//! file behind.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{DownloadError, Result};
use crate::state::DownloadState;

/// Path of a part's temp file inside the session working directory.
#[must_use]
pub fn part_path(work_dir: &Path, filename: &str, id: usize) -> PathBuf {
    work_dir.join(format!("{filename}.part_{id}.tmp"))
}

#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Library under the platform config directory, falling back to the
    /// home directory when no config dir is available.
    #[must_use]
    pub fn default_location() -> Self {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("adam"))
    }

    #[must_use]
    pub fn ongoing_dir(&self) -> PathBuf {
        self.root.join("ongoing")
    }

    #[must_use]
    pub fn complete_dir(&self) -> PathBuf {
        self.root.join("complete")
    }

    #[must_use]
    pub fn state_path(&self, filename: &str) -> PathBuf {
        self.ongoing_dir().join(format!("{filename}.json"))
    }

    #[must_use]
    pub fn complete_path(&self, filename: &str) -> PathBuf {
        self.complete_dir().join(format!("{filename}.json"))
    }

    async fn ensure_dir(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).await?;
        }
        Ok(())
    }

    /// Serialize the session and atomically replace its state file.
    pub async fn save(&self, state: &DownloadState) -> Result<()> {
        Self::ensure_dir(&self.ongoing_dir()).await?;

        let path = self.state_path(&state.filename);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn load(&self, filename: &str) -> Result<DownloadState> {
        let path = self.state_path(filename);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DownloadError::SessionNotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    /// All sessions in a library directory, sorted by filename.
    pub async fn list(&self, dir: &Path) -> Result<Vec<DownloadState>> {
        let mut sessions = Vec::new();

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // Unreadable or stale entries are skipped, not fatal.
            if let Ok(json) = fs::read_to_string(&path).await {
                if let Ok(state) = serde_json::from_str::<DownloadState>(&json) {
                    sessions.push(state);
                }
            }
        }

        sessions.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(sessions)
    }

    pub async fn list_ongoing(&self) -> Result<Vec<DownloadState>> {
        self.list(&self.ongoing_dir()).await
    }

    pub async fn list_complete(&self) -> Result<Vec<DownloadState>> {
        self.list(&self.complete_dir()).await
    }

    /// Atomically move a finished session's state file into `complete/`.
    pub async fn move_to_complete(&self, filename: &str) -> Result<()> {
        Self::ensure_dir(&self.complete_dir()).await?;
        fs::rename(self.state_path(filename), self.complete_path(filename)).await?;
        Ok(())
    }

    /// Remove the ongoing state file and every part temp file.
    pub async fn cleanup(&self, work_dir: &Path, filename: &str, num_parts: usize) {
        let _ = fs::remove_file(self.state_path(filename)).await;
        remove_part_files(work_dir, filename, num_parts).await;
    }
}

/// Delete `<filename>.part_<i>.tmp` for `0 ≤ i < num_parts`.
pub async fn remove_part_files(work_dir: &Path, filename: &str, num_parts: usize) {
    for i in 0..num_parts {
        let _ = fs::remove_file(part_path(work_dir, filename, i)).await;
    }
}
