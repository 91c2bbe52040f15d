//! Post-completion placement: classify a finished torrent's files, then
//! either copy the payload out to a category-specific destination (when it
//! already seeds from `seed-dir`) or relocate it into `seed-dir` and tell
//! the daemon.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use transmission_rpc::types::{Id, TorrentGetField};
use walkdir::WalkDir;

use crate::categorizer::{self, Bag, Category, Record};
use crate::config::Config;
use crate::errors::*;
use crate::logbuf::{human_bytes, Logger};
use crate::rpc::{call_retrying, TorrentCli};

/// Everything the Placer needs about the one torrent it was told just
/// finished.
pub struct FinishedTorrent {
    pub id: i64,
    pub name: Option<String>,
    pub download_dir: Option<PathBuf>,
}

/// Run placement for one finished torrent. Never aborts the tick: a
/// classification or copy failure is logged as an `Error` record and
/// returned to the caller, who decides whether to proceed.
pub fn place<C: TorrentCli>(
    client: &mut C,
    cfg: &Config,
    av_regex: &Regex,
    log: &mut Logger,
    finished: FinishedTorrent,
) -> Result<()> {
    let result = place_inner(client, cfg, av_regex, finished.id, &finished);
    match &result {
        Ok(name) => log.finish(&cfg.seed_dir.to_string_lossy(), name),
        Err(err) => {
            let name = finished.name.as_deref().unwrap_or("<unknown>");
            log.error(name, err);
        }
    }
    result.map(|_| ())
}

fn place_inner<C: TorrentCli>(
    client: &mut C,
    cfg: &Config,
    av_regex: &Regex,
    id: i64,
    finished: &FinishedTorrent,
) -> Result<String> {
    let torrents = call_retrying(|| {
        client.torrent_get(None, Some(vec![Id::Id(id)]))
    })?;
    let torrent = torrents
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("torrent {id} not found"))?;

    let name = finished
        .name
        .clone()
        .or(torrent.name.clone())
        .ok_or_else(|| anyhow!("torrent {id} has no name"))?;
    let download_dir = finished
        .download_dir
        .clone()
        .or_else(|| torrent.download_dir.clone().map(PathBuf::from))
        .ok_or_else(|| anyhow!("torrent {id} has no download_dir"))?;

    let src = download_dir.join(&name);

    if is_same_location(&download_dir, &cfg.seed_dir) {
        let bag = bag_from_files(&torrent, &name);
        let category = match categorizer::classify(&bag, av_regex) {
            Ok(cat) => cat,
            Err(_) => Category::Default,
        };

        let dest_root = cfg.destinations.for_category(category);
        let dest = if src.is_dir() {
            dest_root.to_path_buf()
        } else {
            dest_root.join(stem(&name))
        };

        copy_tree(&src, &dest)?;
    } else {
        copy_tree(&src, &cfg.seed_dir)?;
        call_retrying(|| {
            client.set_location(
                vec![torrent_hash(&torrent)?],
                cfg.seed_dir.to_string_lossy().to_string(),
            )
        })?;
    }

    Ok(name)
}

fn torrent_hash(torrent: &transmission_rpc::types::Torrent) -> Result<String> {
    torrent
        .hash_string
        .clone()
        .ok_or_else(|| anyhow!("torrent has no hash"))
}

fn bag_from_files(torrent: &transmission_rpc::types::Torrent, name: &str) -> Bag {
    match &torrent.files {
        Some(files) if !files.is_empty() => files
            .iter()
            .map(|f| Record {
                path: f.name.clone(),
                #[allow(clippy::cast_sign_loss)]
                size: f.length.max(0) as u64,
            })
            .collect(),
        _ => vec![Record {
            path: name.to_string(),
            #[allow(clippy::cast_sign_loss)]
            size: torrent.size_when_done.unwrap_or(0).max(0) as u64,
        }],
    }
}

/// `stem(name)` strips the last extension.
fn stem(name: &str) -> &str {
    let (root, ext) = crate::pathlex::split_ext(name);
    if ext.is_empty() {
        name
    } else {
        root
    }
}

/// Filesystem identity, not string equality: resolved
/// via `canonicalize` so bind-mounts/symlinks that alias the same inode
/// compare equal even when written differently.
fn is_same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => a == b,
    }
}

/// Recursive, attribute-preserving copy. Skips a destination file that
/// already matches the source's length and mtime, so re-running Placer on
/// a torrent it already placed is a cheap no-op past the first unmatched
/// file.
pub fn copy_tree(src: &Path, dest_root: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("stat {}", src.display()))?;

    if meta.is_dir() {
        fs::create_dir_all(dest_root)
            .with_context(|| format!("mkdir {}", dest_root.display()))?;
        for entry in WalkDir::new(src).min_depth(1) {
            let entry = entry.context("walking source tree")?;
            let rel = entry
                .path()
                .strip_prefix(src)
                .expect("walkdir yields paths under src");
            let dest = dest_root.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)
                    .with_context(|| format!("mkdir {}", dest.display()))?;
            } else {
                copy_file_incremental(entry.path(), &dest)?;
            }
        }
        Ok(())
    } else {
        fs::create_dir_all(dest_root)
            .with_context(|| format!("mkdir {}", dest_root.display()))?;
        let file_name = src
            .file_name()
            .ok_or_else(|| anyhow!("source has no file name: {}", src.display()))?;
        copy_file_incremental(src, &dest_root.join(file_name))
    }
}

fn copy_file_incremental(src: &Path, dest: &Path) -> Result<()> {
    let src_meta = fs::metadata(src).with_context(|| format!("stat {}", src.display()))?;

    if let Ok(dest_meta) = fs::metadata(dest) {
        if dest_meta.len() == src_meta.len() {
            if let (Ok(s), Ok(d)) = (src_meta.modified(), dest_meta.modified()) {
                if s == d {
                    tracing::debug!(
                        path = %dest.display(),
                        size = %human_bytes(dest_meta.len()),
                        "already placed, skipping"
                    );
                    return Ok(());
                }
            }
        }
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("mkdir {}", parent.display()))?;
    }
    fs::copy(src, dest)
        .with_context(|| format!("copy {} -> {}", src.display(), dest.display()))?;

    if let Ok(modified) = src_meta.modified() {
        let _ = filetime_set(dest, modified);
    }
    let perms = src_meta.permissions();
    let _ = fs::set_permissions(dest, perms);

    Ok(())
}

/// Set `dest`'s mtime to `modified`, mirroring the source's, without adding
/// a filetime crate: `std::fs` has no setter, so this shells out to the
/// portable utimensat-backed primitive the standard library does expose
/// through `File::set_times` on recent toolchains... which isn't stable
/// either, so we fall back to a best-effort `libc::utimes` call.
fn filetime_set(path: &Path, modified: std::time::SystemTime) -> Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let dur = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let tv = libc::timeval {
        tv_sec: dur.as_secs() as libc::time_t,
        tv_usec: libc::suseconds_t::from(dur.subsec_micros() as i32),
    };
    let times = [tv, tv];
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of
    // the call; `times` is a valid two-element array as required.
    let rc = unsafe { libc::utimes(c_path.as_ptr(), times.as_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error()).context("utimes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn tmp_dir(name: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "seedkeeper-placer-test-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&p);
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn stem_strips_last_extension_only() {
        assert_eq!(stem("Movie.2024.mkv"), "Movie.2024");
        assert_eq!(stem("noext"), "noext");
    }

    #[test]
    fn copy_tree_copies_single_file() {
        let src_dir = tmp_dir("single-src");
        let dst_dir = tmp_dir("single-dst");
        let src_file = src_dir.join("payload.txt");
        std::fs::File::create(&src_file)
            .unwrap()
            .write_all(b"hello")
            .unwrap();

        copy_tree(&src_file, &dst_dir).unwrap();
        let copied = std::fs::read(dst_dir.join("payload.txt")).unwrap();
        assert_eq!(copied, b"hello");
    }

    #[test]
    fn copy_tree_copies_nested_directory() {
        let src_dir = tmp_dir("nested-src");
        let dst_dir = tmp_dir("nested-dst");
        std::fs::create_dir_all(src_dir.join("sub")).unwrap();
        std::fs::File::create(src_dir.join("sub/file.txt"))
            .unwrap()
            .write_all(b"data")
            .unwrap();

        copy_tree(&src_dir, &dst_dir).unwrap();
        let copied = std::fs::read(dst_dir.join("sub/file.txt")).unwrap();
        assert_eq!(copied, b"data");
    }

    #[test]
    fn copy_file_incremental_skips_matching_destination() {
        let src_dir = tmp_dir("incr-src");
        let dst_dir = tmp_dir("incr-dst");
        let src_file = src_dir.join("a.bin");
        std::fs::write(&src_file, b"1234").unwrap();
        copy_tree(&src_file, &dst_dir).unwrap();

        // second run over the same unmodified source is a no-op, not an error
        copy_tree(&src_file, &dst_dir).unwrap();
        assert_eq!(std::fs::read(dst_dir.join("a.bin")).unwrap(), b"1234");
    }
}
