//! Orchestration: lock, Placer, inventory fetch, Cleaner, QuotaEngine, and
//! resume-paused, in that order, once per run.

use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;
use transmission_rpc::types::{Id, TorrentStatus};

use crate::cleaner;
use crate::config::Config;
use crate::errors::*;
use crate::lock::Lock;
use crate::logbuf::Logger;
use crate::placer::{self, FinishedTorrent};
use crate::quota;
use crate::rpc::{call_retrying, TorrentCli};

/// What triggered this run: a daemon `script-torrent-done` callback
/// (`TR_TORRENT_ID`/`TR_TORRENT_NAME`/`TR_TORRENT_DIR` present) carries the
/// finished torrent's details, otherwise this is a maintenance tick.
pub enum Invocation {
    TorrentDone(FinishedTorrent),
    Tick,
}

impl Invocation {
    /// Read the trigger env vars the daemon sets on a `script-torrent-done`
    /// hook invocation.
    #[must_use]
    pub fn from_env() -> Self {
        let Ok(id) = std::env::var("TR_TORRENT_ID") else {
            return Invocation::Tick;
        };
        let Ok(id) = id.parse::<i64>() else {
            return Invocation::Tick;
        };
        Invocation::TorrentDone(FinishedTorrent {
            id,
            name: std::env::var("TR_TORRENT_NAME").ok(),
            download_dir: std::env::var("TR_TORRENT_DIR").ok().map(PathBuf::from),
        })
    }
}

/// Run one tick to completion. Acquires the lock (blocking for
/// torrent-done, non-blocking for a tick — `LockHeld` from a non-blocking
/// acquire is not an error, the run just exits cleanly), then drives the
/// five-step ordering, then flushes the log regardless of how the run
/// ended.
pub fn run<C: TorrentCli>(
    client: &mut C,
    cfg: &Config,
    av_regex: &Regex,
    invocation: Invocation,
    dry_run: bool,
) -> Result<()> {
    let blocking = matches!(invocation, Invocation::TorrentDone(_));
    let lock = match Lock::acquire(&cfg.lock_file, blocking) {
        Ok(lock) => lock,
        Err(err) if err.downcast_ref::<LockHeld>().is_some() => {
            tracing::info!("run lock held elsewhere, skipping this tick");
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let mut log = Logger::new();
    let result = run_locked(client, cfg, av_regex, invocation, dry_run, &mut log);
    log.flush_prepend(&cfg.log_file)?;
    drop(lock);
    result
}

fn run_locked<C: TorrentCli>(
    client: &mut C,
    cfg: &Config,
    av_regex: &Regex,
    invocation: Invocation,
    dry_run: bool,
    log: &mut Logger,
) -> Result<()> {
    // 1. Placer, only for a torrent-done callback.
    if let Invocation::TorrentDone(finished) = invocation {
        placer::place(client, cfg, av_regex, log, finished)?;
    }

    // 2. Inventory fetch. `None` for fields asks the daemon for its default
    // set, which already covers everything Placer/Cleaner/QuotaEngine need.
    let torrents = call_retrying(|| client.torrent_get(None, None::<Vec<Id>>))?;

    // 3. Cleaner.
    let known_names: HashSet<String> = torrents
        .iter()
        .filter_map(|t| t.name.clone())
        .collect();
    cleaner::run(cfg, &known_names, log, dry_run)?;

    // 4. QuotaEngine. Disk stats come from a syscall against seed-dir, not
    // the daemon; skip it entirely when quota enforcement is disabled so a
    // disabled quota never needs seed-dir to exist yet.
    let disk = if cfg.quota_bytes() > 0 {
        quota::disk_stats(&cfg.seed_dir)?
    } else {
        (0, 0)
    };
    quota::enforce(client, cfg, &torrents, disk, log, dry_run)?;

    // 5. Resume paused torrents.
    let paused_ids: Vec<String> = torrents
        .iter()
        .filter(|t| matches!(t.status, Some(TorrentStatus::Stopped)))
        .filter_map(|t| t.hash_string.clone())
        .collect();
    if !paused_ids.is_empty() && !dry_run {
        call_retrying(|| client.torrent_start(paused_ids.clone()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockRequest;
    use transmission_rpc::types::Torrent;

    fn torrent(name: &str, status: TorrentStatus) -> Torrent {
        let mut t = crate::test_support::blank_torrent();
        t.hash_string = Some(name.to_string());
        t.name = Some(name.to_string());
        t.status = Some(status);
        t.percent_done = Some(1.0);
        t
    }

    fn regex() -> Regex {
        Regex::new("never-matches-anything-xyz").unwrap()
    }

    #[test]
    fn tick_resumes_stopped_torrents() {
        let dir = std::env::temp_dir().join(format!(
            "seedkeeper-controller-test-resume-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let mut cfg = Config::default();
        cfg.seed_dir = dir.join("seed");
        cfg.lock_file = dir.join("lock");
        cfg.log_file = dir.join("log");
        std::fs::create_dir_all(&cfg.seed_dir).unwrap();

        let mut client = MockRequest {
            torrents: vec![torrent("paused", TorrentStatus::Stopped)],
            ..Default::default()
        };

        run(&mut client, &cfg, &regex(), Invocation::Tick, false).unwrap();
        assert_eq!(client.started_ids, vec!["paused".to_string()]);
    }

    #[test]
    fn dry_run_tick_never_starts_torrents() {
        let dir = std::env::temp_dir().join(format!(
            "seedkeeper-controller-test-dry-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let mut cfg = Config::default();
        cfg.seed_dir = dir.join("seed");
        cfg.lock_file = dir.join("lock");
        cfg.log_file = dir.join("log");
        std::fs::create_dir_all(&cfg.seed_dir).unwrap();

        let mut client = MockRequest {
            torrents: vec![torrent("paused", TorrentStatus::Stopped)],
            ..Default::default()
        };

        run(&mut client, &cfg, &regex(), Invocation::Tick, true).unwrap();
        assert!(client.started_ids.is_empty());
    }

    #[test]
    fn second_tick_skips_cleanly_while_first_holds_lock() {
        let dir = std::env::temp_dir().join(format!(
            "seedkeeper-controller-test-lock-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let lock_path = dir.join("lock");
        let _held = Lock::acquire(&lock_path, false).unwrap();

        let mut cfg = Config::default();
        cfg.seed_dir = dir.join("seed");
        cfg.lock_file = lock_path;
        cfg.log_file = dir.join("log");
        std::fs::create_dir_all(&cfg.seed_dir).unwrap();

        let mut client = MockRequest::default();
        run(&mut client, &cfg, &regex(), Invocation::Tick, false).unwrap();
        assert!(client.started_ids.is_empty());
        assert!(client.removed_ids.is_empty());
    }
}
