//! Test-only helpers shared across unit tests in several modules: an
//! all-`None` `Torrent` fixture for tests to fill in selectively.

#![cfg(test)]

use transmission_rpc::types::Torrent;

#[must_use]
pub fn blank_torrent() -> Torrent {
    Torrent {
        torrent_file: None,
        bandwidth_priority: None,
        file_count: None,
        tracker_list: None,
        tracker_stats: None,
        seconds_seeding: None,
        labels: None,
        is_private: None,
        edit_date: None,
        activity_date: None,
        added_date: None,
        done_date: None,
        download_dir: None,
        error: None,
        error_string: None,
        eta: None,
        id: None,
        is_finished: None,
        is_stalled: None,
        left_until_done: None,
        metadata_percent_complete: None,
        name: None,
        hash_string: None,
        peers_connected: None,
        peers_getting_from_us: None,
        peers_sending_to_us: None,
        percent_done: None,
        rate_download: None,
        rate_upload: None,
        recheck_progress: None,
        seed_ratio_limit: None,
        size_when_done: None,
        status: None,
        total_size: None,
        trackers: None,
        upload_ratio: None,
        uploaded_ever: None,
        files: None,
        wanted: None,
        priorities: None,
        file_stats: None,
    }
}
