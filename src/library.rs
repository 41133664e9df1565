//! Session listing and URL rewriting for the `ls` and `update` commands.

use crate::error::Result;
use crate::state::DownloadState;
use crate::store::Library;
use crate::util::{format_bytes, truncate_str};

/// Which library directories `ls` should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsScope {
    Ongoing,
    Complete,
    Both,
}

/// Collect sessions from the requested libraries in display order.
pub async fn collect_sessions(
    library: &Library,
    scope: LsScope,
) -> Result<Vec<(DownloadState, bool)>> {
    let mut sessions = Vec::new();

    if matches!(scope, LsScope::Ongoing | LsScope::Both) {
        sessions.extend(library.list_ongoing().await?.into_iter().map(|s| (s, false)));
    }
    if matches!(scope, LsScope::Complete | LsScope::Both) {
        sessions.extend(library.list_complete().await?.into_iter().map(|s| (s, true)));
    }

    Ok(sessions)
}

/// Render the `ls` table. Completed-library sessions always show "Done".
#[must_use]
pub fn render_sessions(sessions: &[(DownloadState, bool)]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<3} | {:<25} | {:<10} | {:<8} | {}\n",
        "ID", "File Name", "Size", "Progress", "Status"
    ));
    out.push_str(&"-".repeat(66));
    out.push('\n');

    for (i, (state, completed)) in sessions.iter().enumerate() {
        let percent = state.progress_percent();
        let status = if *completed || percent >= 100.0 {
            "Done".to_string()
        } else {
            "Ongoing".to_string()
        };

        out.push_str(&format!(
            "{:<3} | {:<25} | {:<10} | {:<8} | {}\n",
            i + 1,
            truncate_str(&state.filename, 25),
            format_bytes(state.total_size),
            format!("{percent:.1}%"),
            status,
        ));
    }

    out
}

/// Rewrite the stored URL of an ongoing session (for expired signed
/// links). Returns the previous URL.
pub async fn update_session_url(
    library: &Library,
    filename: &str,
    new_url: &str,
) -> Result<String> {
    let mut state = library.load(filename).await?;
    let old_url = std::mem::replace(&mut state.url, new_url.to_string());
    library.save(&state).await?;
    Ok(old_url)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::error::DownloadError;

    fn state(filename: &str, total: u64, received: u64) -> DownloadState {
        let mut s = DownloadState::new(
            format!("http://example.com/{filename}"),
            filename.to_string(),
            total,
            1,
        );
        s.parts[0].current_offset = received;
        s
    }

    #[test]
    fn renders_progress_and_status_columns() {
        let rows = vec![
            (state("half.bin", 1000, 500), false),
            (state("finished.bin", 1000, 1000), true),
        ];
        let table = render_sessions(&rows);

        assert!(table.contains("half.bin"));
        assert!(table.contains("50.0%"));
        assert!(table.contains("Ongoing"));
        assert!(table.contains("finished.bin"));
        assert!(table.contains("Done"));
    }

    #[test]
    fn truncates_long_filenames() {
        let rows = vec![(
            state("a-spectacularly-long-filename-indeed.tar.gz", 10, 0),
            false,
        )];
        let table = render_sessions(&rows);
        assert!(table.contains("a-spectacularly-long-f..."));
        assert!(!table.contains("indeed.tar.gz"));
    }

    #[tokio::test]
    async fn update_rewrites_url_and_reports_old() {
        let dir = tempdir().unwrap();
        let library = Library::new(dir.path());
        library.save(&state("f.bin", 100, 10)).await.unwrap();

        let old = update_session_url(&library, "f.bin", "http://mirror.example.com/f.bin")
            .await
            .unwrap();
        assert_eq!(old, "http://example.com/f.bin");

        let reloaded = library.load("f.bin").await.unwrap();
        assert_eq!(reloaded.url, "http://mirror.example.com/f.bin");
        // Progress survives the rewrite.
        assert_eq!(reloaded.parts[0].current_offset, 10);
    }

    #[tokio::test]
    async fn update_unknown_session_fails() {
        let dir = tempdir().unwrap();
        let library = Library::new(dir.path());

        assert!(matches!(
            update_session_url(&library, "ghost.bin", "http://x").await,
            Err(DownloadError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn collect_scopes_libraries() {
        let dir = tempdir().unwrap();
        let library = Library::new(dir.path());
        library.save(&state("a.bin", 100, 10)).await.unwrap();
        library.save(&state("b.bin", 100, 100)).await.unwrap();
        library.move_to_complete("b.bin").await.unwrap();

        let ongoing = collect_sessions(&library, LsScope::Ongoing).await.unwrap();
        assert_eq!(ongoing.len(), 1);
        assert_eq!(ongoing[0].0.filename, "a.bin");

        let both = collect_sessions(&library, LsScope::Both).await.unwrap();
        assert_eq!(both.len(), 2);
    }
}
