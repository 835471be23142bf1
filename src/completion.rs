//! Skip-if-present checks at chapter and file granularity

use std::io;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Suffix of in-progress writes; never counted as finished output.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Count finished output files in `dir`. A missing directory counts as empty.
pub async fn count_existing_files(dir: &Path) -> io::Result<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
            continue;
        }
        count += 1;
    }
    Ok(count)
}

/// Whole-batch short-circuit: does `dir` already hold exactly `expected` files?
pub async fn is_batch_complete(dir: &Path, expected: usize) -> io::Result<bool> {
    let existing = count_existing_files(dir).await?;
    debug!(dir = %dir.display(), existing, expected, "Completion check");
    Ok(existing == expected)
}

/// Per-file check run by each unit before touching the network.
pub async fn output_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
