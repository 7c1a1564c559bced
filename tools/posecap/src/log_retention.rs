use crate::errors::PosecapError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Deletes the oldest `.jsonl` logs in `dir` until their combined size fits
/// `budget_bytes`. The log currently being written is never removed.
pub fn enforce_total_budget(
    dir: &Path,
    active: &Path,
    budget_bytes: u64,
) -> Result<Vec<PathBuf>, PosecapError> {
    let mut logs = fs::read_dir(dir)
        .map_err(|e| PosecapError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_jsonl(path))
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((path, meta.len(), modified))
        })
        .collect::<Vec<_>>();

    let mut total = logs.iter().map(|(_, len, _)| *len).sum::<u64>();
    if total <= budget_bytes {
        return Ok(Vec::new());
    }

    logs.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.0.cmp(&b.0)));

    let mut deleted = Vec::new();
    for (path, len, _) in logs {
        if total <= budget_bytes {
            break;
        }
        if path == active {
            continue;
        }
        fs::remove_file(&path).map_err(|e| PosecapError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("jsonl")
}
