//! Concatenate completed part files into the final artifact.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{DownloadError, Result};
use crate::store::part_path;

/// Copy every part file, in id order, into `<work_dir>/<filename>`.
///
/// The destination is truncated first so a retried merge can never leave
/// stale bytes behind. Parts are only deleted after the merged file
/// passes the size check; any failure leaves the parts and the session
/// state on disk so the user can retry.
pub async fn merge_parts(
    work_dir: &Path,
    filename: &str,
    num_parts: usize,
    total_size: u64,
) -> Result<()> {
    let dest_path = work_dir.join(filename);
    let mut dest = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&dest_path)
        .await?;

    for i in 0..num_parts {
        let path = part_path(work_dir, filename, i);
        let mut part = File::open(&path).await?;
        debug!(part = i, "merging part file");
        tokio::io::copy(&mut part, &mut dest).await?;
    }
    dest.flush().await?;

    let actual = dest.metadata().await?.len();
    if actual != total_size {
        return Err(DownloadError::SizeMismatch {
            expected: total_size,
            actual,
        });
    }

    for i in 0..num_parts {
        tokio::fs::remove_file(part_path(work_dir, filename, i)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn merges_parts_in_order_and_deletes_them() {
        let dir = tempdir().unwrap();
        for (i, body) in ["Hello", ", ", "World"].iter().enumerate() {
            tokio::fs::write(part_path(dir.path(), "greeting.txt", i), body)
                .await
                .unwrap();
        }

        merge_parts(dir.path(), "greeting.txt", 3, 12).await.unwrap();

        let merged = tokio::fs::read_to_string(dir.path().join("greeting.txt"))
            .await
            .unwrap();
        assert_eq!(merged, "Hello, World");

        for i in 0..3 {
            assert!(!part_path(dir.path(), "greeting.txt", i).exists());
        }
    }

    #[tokio::test]
    async fn size_mismatch_keeps_part_files() {
        let dir = tempdir().unwrap();
        tokio::fs::write(part_path(dir.path(), "f.bin", 0), b"abc")
            .await
            .unwrap();

        let err = merge_parts(dir.path(), "f.bin", 1, 999).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::SizeMismatch {
                expected: 999,
                actual: 3
            }
        ));
        assert!(part_path(dir.path(), "f.bin", 0).exists());
    }

    #[tokio::test]
    async fn missing_part_fails_fast() {
        let dir = tempdir().unwrap();
        tokio::fs::write(part_path(dir.path(), "f.bin", 0), b"abc")
            .await
            .unwrap();
        // part_1 missing

        assert!(merge_parts(dir.path(), "f.bin", 2, 6).await.is_err());
        assert!(part_path(dir.path(), "f.bin", 0).exists());
    }

    #[tokio::test]
    async fn rerun_truncates_previous_destination() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("f.bin"), b"stale-previous-content")
            .await
            .unwrap();
        tokio::fs::write(part_path(dir.path(), "f.bin", 0), b"fresh")
            .await
            .unwrap();

        merge_parts(dir.path(), "f.bin", 1, 5).await.unwrap();

        let merged = tokio::fs::read_to_string(dir.path().join("f.bin"))
            .await
            .unwrap();
        assert_eq!(merged, "fresh");
    }
}
