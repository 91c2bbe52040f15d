//! Seed-space enforcement: compute bytes-to-free from disk stats, evict the
//! least-recently-active completed torrents until the constraint is met.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use transmission_rpc::types::Torrent;

use crate::config::Config;
use crate::errors::*;
use crate::logbuf::{human_bytes, Logger};
use crate::rpc::{call_retrying, TorrentCli};

/// One torrent eligible for eviction: 100% complete, seeding from
/// `seed-dir`.
struct Candidate {
    hash: String,
    name: String,
    size: u64,
    last_activity: i64,
}

/// `(disksize, freespace)` in bytes for the filesystem backing `path`, via
/// `statvfs(2)` — the df-equivalent syscall spec §4.6 calls for, independent
/// of anything the daemon itself reports.
pub fn disk_stats(path: &Path) -> Result<(u64, u64)> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("path contains NUL byte: {}", path.display()))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: `c_path` is a valid NUL-terminated string and `stat` is a
    // valid, writable `statvfs` for the duration of the call.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("statvfs {}", path.display()));
    }
    let frsize = u64::from(stat.f_frsize);
    let disksize = frsize * u64::from(stat.f_blocks);
    // f_bavail (not f_bfree) is what a `df`-equivalent reports as available:
    // it excludes the blocks reserved for the superuser.
    let freespace = frsize * u64::from(stat.f_bavail);
    Ok((disksize, freespace))
}

/// Run one quota pass against the already-fetched inventory and `disk`
/// stats (disksize, freespace). Never removes more than the first candidate
/// batch whose cumulative sum reaches `target`.
pub fn enforce<C: TorrentCli>(
    client: &mut C,
    cfg: &Config,
    torrents: &[Torrent],
    disk: (u64, u64),
    log: &mut Logger,
    dry_run: bool,
) -> Result<()> {
    let quota = cfg.quota_bytes();
    if quota == 0 {
        return Ok(());
    }

    let total_size = total_seed_dir_size(cfg, torrents);
    let (disksize, freespace) = disk;

    let by_quota_growth = i64::try_from(quota + total_size).unwrap_or(i64::MAX)
        - i64::try_from(disksize).unwrap_or(i64::MAX);
    let by_free_reserve =
        i64::try_from(quota).unwrap_or(i64::MAX) - i64::try_from(freespace).unwrap_or(i64::MAX);
    let target = by_quota_growth.max(by_free_reserve);

    if target <= 0 {
        return Ok(());
    }
    #[allow(clippy::cast_sign_loss)]
    let target = target as u64;

    let mut candidates = candidates(cfg, torrents);
    candidates.sort_by_key(|c| c.last_activity);

    let mut victims = Vec::new();
    let mut acc = 0u64;
    for candidate in candidates {
        if acc >= target {
            break;
        }
        acc += candidate.size;
        victims.push(candidate);
    }

    if victims.is_empty() {
        return Ok(());
    }

    tracing::info!(
        target = %human_bytes(target),
        freed = %human_bytes(acc),
        count = victims.len(),
        "evicting least-recently-active torrents"
    );

    if dry_run {
        for v in &victims {
            log.remove(&format!("{} (dry-run, would free {})", v.name, human_bytes(v.size)));
        }
        return Ok(());
    }

    let ids: Vec<String> = victims.iter().map(|v| v.hash.clone()).collect();
    call_retrying(|| client.torrent_remove(ids.clone(), true))?;
    for v in &victims {
        log.remove(&v.name);
    }
    Ok(())
}

fn total_seed_dir_size(cfg: &Config, torrents: &[Torrent]) -> u64 {
    torrents
        .iter()
        .filter(|t| is_complete_in_seed_dir(cfg, t))
        .map(|t| {
            #[allow(clippy::cast_sign_loss)]
            {
                t.size_when_done.unwrap_or(0).max(0) as u64
            }
        })
        .sum()
}

fn candidates(cfg: &Config, torrents: &[Torrent]) -> Vec<Candidate> {
    torrents
        .iter()
        .filter(|t| is_complete_in_seed_dir(cfg, t))
        .filter_map(|t| {
            Some(Candidate {
                hash: t.hash_string.clone()?,
                name: t.name.clone().unwrap_or_default(),
                #[allow(clippy::cast_sign_loss)]
                size: t.size_when_done.unwrap_or(0).max(0) as u64,
                last_activity: t.activity_date.unwrap_or(0),
            })
        })
        .collect()
}

fn is_complete_in_seed_dir(cfg: &Config, t: &Torrent) -> bool {
    let Some(percent_done) = t.percent_done else {
        return false;
    };
    if percent_done < 1.0 {
        return false;
    }
    let Some(download_dir) = t.download_dir.as_ref() else {
        return false;
    };
    Path::new(download_dir).starts_with(&cfg.seed_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockRequest;
    use transmission_rpc::types::TorrentStatus;

    fn torrent(hash: &str, size: i64, activity: i64, seed_dir: &str) -> Torrent {
        let mut t = crate::test_support::blank_torrent();
        t.hash_string = Some(hash.to_string());
        t.name = Some(hash.to_string());
        t.size_when_done = Some(size);
        t.percent_done = Some(1.0);
        t.activity_date = Some(activity);
        t.download_dir = Some(seed_dir.to_string());
        t.status = Some(TorrentStatus::Seeding);
        t
    }

    #[test]
    fn disk_stats_reports_disksize_at_least_freespace() {
        let dir = std::env::temp_dir();
        let (disksize, freespace) = disk_stats(&dir).unwrap();
        assert!(disksize >= freespace);
    }

    #[test]
    fn zero_quota_never_evicts() {
        let mut cfg = Config::default();
        cfg.seed_dir = "/seed".into();
        cfg.quota_gib = 0;
        let torrents = vec![torrent("a", 10, 1, "/seed")];
        let mut client = MockRequest::default();
        let mut log = Logger::new();
        // quota == 0 returns before `disk` is ever consulted; the (0, 0)
        // placeholder below would be nonsensical input otherwise.
        enforce(&mut client, &cfg, &torrents, (0, 0), &mut log, false).unwrap();
        assert!(client.removed_ids.is_empty());
    }

    #[test]
    fn evicts_oldest_activity_first_until_target_met() {
        let mut cfg = Config::default();
        cfg.seed_dir = "/seed".into();
        cfg.quota_gib = 1; // 1 GiB quota
        let gib = 1024u64 * 1024 * 1024;
        let torrents = vec![
            torrent("old", gib as i64, 1, "/seed"),
            torrent("newer", gib as i64, 100, "/seed"),
        ];
        let mut client = MockRequest::default();
        let mut log = Logger::new();
        // disksize(2 GiB), freespace(0): quota(1GiB) + total_size(2GiB) -
        // disksize(2GiB) = 1GiB target; quota(1GiB) - freespace(0) = 1GiB
        // too, so both triggers agree here.
        enforce(&mut client, &cfg, &torrents, (2 * gib, 0), &mut log, false).unwrap();
        assert_eq!(client.removed_ids, vec!["old".to_string()]);
    }

    #[test]
    fn free_reserve_trigger_fires_even_when_quota_growth_does_not() {
        let mut cfg = Config::default();
        cfg.seed_dir = "/seed".into();
        cfg.quota_gib = 1; // 1 GiB quota
        let gib = 1024u64 * 1024 * 1024;
        // A torrent list far under quota (so by_quota_growth <= 0), but a
        // physical disk with less free space than the quota reserve
        // demands: the seed-dir shares a partition with other data.
        let torrents = vec![torrent("old", gib as i64 / 10, 1, "/seed")];
        let mut client = MockRequest::default();
        let mut log = Logger::new();
        // disksize huge, freespace tiny: by_quota_growth is deeply negative,
        // by_free_reserve = quota(1GiB) - freespace(0) = 1GiB > 0.
        enforce(&mut client, &cfg, &torrents, (100 * gib, 0), &mut log, false).unwrap();
        assert_eq!(client.removed_ids, vec!["old".to_string()]);
    }

    #[test]
    fn dry_run_reports_without_removing() {
        let mut cfg = Config::default();
        cfg.seed_dir = "/seed".into();
        cfg.quota_gib = 1;
        let gib = 1024u64 * 1024 * 1024;
        let torrents = vec![torrent("a", (2 * gib) as i64, 1, "/seed")];
        let mut client = MockRequest::default();
        let mut log = Logger::new();
        enforce(&mut client, &cfg, &torrents, (2 * gib, 0), &mut log, true).unwrap();
        assert!(client.removed_ids.is_empty());
        assert_eq!(log.records().len(), 1);
    }
}
