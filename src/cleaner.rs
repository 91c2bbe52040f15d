//! Orphan removal: entries under `seed-dir` or `watch-dir` that no longer
//! correspond to anything the daemon knows about.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Config;
use crate::errors::*;
use crate::logbuf::Logger;

/// At most this many paths go into a single `remove_file`/`remove_dir_all`
/// batch, bounding argv/syscall size.
const BATCH_SIZE: usize = 100;

/// Run both cleaner passes. `known_names` is the set of torrent names the
/// daemon currently reports.
pub fn run(
    cfg: &Config,
    known_names: &HashSet<String>,
    log: &mut Logger,
    dry_run: bool,
) -> Result<()> {
    let mut obsolete = seed_dir_orphans(&cfg.seed_dir, known_names)?;
    if let Some(watch_dir) = cfg.watch_dir_enabled() {
        obsolete.extend(empty_watch_entries(watch_dir)?);
    }

    if obsolete.is_empty() {
        return Ok(());
    }

    for path in &obsolete {
        log.remove(&path.display().to_string());
    }

    if dry_run {
        return Ok(());
    }

    delete_batched(&obsolete)
}

/// Pass 1: top-level entries of `seed-dir` whose name, and whose
/// name with a trailing `.part` stripped, is not a known torrent name.
/// Dot/hash/at-prefixed entries (lock files, partial-download markers the
/// daemon itself manages) are never candidates.
fn seed_dir_orphans(seed_dir: &Path, known_names: &HashSet<String>) -> Result<Vec<PathBuf>> {
    if !seed_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut orphans = Vec::new();
    for entry in WalkDir::new(seed_dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("walking {}", seed_dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.starts_with('#') || name.starts_with('@') {
            continue;
        }
        let stripped = name.strip_suffix(".part").unwrap_or(&name);
        if !known_names.contains(&name) && !known_names.contains(stripped) {
            orphans.push(entry.path().to_path_buf());
        }
    }
    Ok(orphans)
}

/// Pass 2: `*.torrent` files in `watch-dir` that are empty —
/// the daemon consumes a watched `.torrent` file and truncates it, leaving
/// a zero-byte marker behind once it has picked the file up.
fn empty_watch_entries(watch_dir: &Path) -> Result<Vec<PathBuf>> {
    if !watch_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut orphans = Vec::new();
    for entry in WalkDir::new(watch_dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("walking {}", watch_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_torrent = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("torrent"))
            .unwrap_or(false);
        if !is_torrent {
            continue;
        }
        if entry.metadata().map(|m| m.len() == 0).unwrap_or(false) {
            orphans.push(entry.path().to_path_buf());
        }
    }
    Ok(orphans)
}

/// Delete in chunks of `BATCH_SIZE`, directories recursively and files
/// directly; one bad entry does not stop the rest of the batch.
fn delete_batched(paths: &[PathBuf]) -> Result<()> {
    for chunk in paths.chunks(BATCH_SIZE) {
        for path in chunk {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            if let Err(err) = result {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove orphan");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "seedkeeper-cleaner-test-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&p);
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn missing_seed_dir_is_not_an_error() {
        let missing = std::env::temp_dir().join("seedkeeper-cleaner-does-not-exist");
        let known = HashSet::new();
        assert!(seed_dir_orphans(&missing, &known).unwrap().is_empty());
    }

    #[test]
    fn known_and_part_suffixed_names_survive() {
        let dir = tmp_dir("survive");
        std::fs::write(dir.join("Known.Movie.mkv"), b"x").unwrap();
        std::fs::write(dir.join("Downloading.mkv.part"), b"x").unwrap();
        std::fs::write(dir.join("Orphan.mkv"), b"x").unwrap();
        std::fs::write(dir.join(".lockfile"), b"x").unwrap();

        let mut known = HashSet::new();
        known.insert("Known.Movie.mkv".to_string());
        known.insert("Downloading.mkv".to_string());

        let orphans = seed_dir_orphans(&dir, &known).unwrap();
        assert_eq!(orphans, vec![dir.join("Orphan.mkv")]);
    }

    #[test]
    fn empty_torrent_files_are_orphans_nonempty_are_not() {
        let dir = tmp_dir("watch");
        std::fs::write(dir.join("done.torrent"), b"").unwrap();
        std::fs::write(dir.join("pending.torrent"), b"still-queued").unwrap();
        std::fs::write(dir.join("notes.txt"), b"").unwrap();

        let orphans = empty_watch_entries(&dir).unwrap();
        assert_eq!(orphans, vec![dir.join("done.torrent")]);
    }

    #[test]
    fn dry_run_reports_but_does_not_delete() {
        let dir = tmp_dir("dry-run");
        std::fs::write(dir.join("Orphan.mkv"), b"x").unwrap();

        let mut cfg = Config::default();
        cfg.seed_dir = dir.clone();
        cfg.watch_dir = PathBuf::new();

        let mut log = Logger::new();
        run(&cfg, &HashSet::new(), &mut log, true).unwrap();

        assert!(dir.join("Orphan.mkv").exists());
        assert_eq!(log.records().len(), 1);
    }
}
