//! Daemon RPC surface: session header handling, bounded retry, and the four
//! calls the Controller drives (`torrent-get`, `torrent-set-location`,
//! `torrent-remove`, `torrent-start`). Disk stats for the QuotaEngine come
//! from a `statvfs(2)` syscall (see `quota::disk_stats`), not from the
//! daemon.

use tokio::runtime::Runtime;
use transmission_rpc::types::{Id, RpcResponse, RpcResponseArgument, Torrent, TorrentGetField};
use transmission_rpc::TransClient;

use crate::errors::*;

/// Attempts per RPC before the enclosing step fails.
const MAX_ATTEMPTS: u32 = 4;

/// The subset of the daemon's JSON-RPC surface this engine drives, trimmed
/// to what a batch maintenance run needs: no `torrent_add`, no interactive
/// filters.
pub trait TorrentCli {
    fn torrent_get(
        &mut self,
        fields: Option<Vec<TorrentGetField>>,
        ids: Option<Vec<Id>>,
    ) -> Result<Vec<Torrent>>;

    fn set_location(&mut self, ids: Vec<String>, location: String) -> Result<()>;

    fn torrent_remove(&mut self, ids: Vec<String>, delete_local_data: bool) -> Result<()>;

    fn torrent_start(&mut self, ids: Vec<String>) -> Result<()>;
}

/// Retries `f` up to `MAX_ATTEMPTS` times, refreshing the session token
/// implicitly between attempts (the session header renegotiation itself is
/// handled inside `transmission_rpc::TransClient`; this loop supplies the
/// "try again" half of the contract). After exhaustion the step fails and
/// control returns to the caller rather than aborting the whole tick.
pub fn call_retrying<T, F>(mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "rpc attempt failed, retrying");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("rpc call failed with no recorded error")))
}

pub struct SyncRequest {
    pub client: TransClient,
    pub tokio: Runtime,
}

fn call<RS, C>(tokio: &Runtime, f: C) -> Result<RS>
where
    C: std::future::Future<Output = transmission_rpc::types::Result<RpcResponse<RS>>>,
    RS: RpcResponseArgument,
{
    tokio.block_on(async {
        let res = f.await.map_err(|e| anyhow!("rpc call: {:#}", e))?;
        if !res.is_ok() {
            bail!("rpc request failed with: '{}'", res.result);
        }
        Ok(res.arguments)
    })
}

impl TorrentCli for SyncRequest {
    fn torrent_get(
        &mut self,
        fields: Option<Vec<TorrentGetField>>,
        ids: Option<Vec<Id>>,
    ) -> Result<Vec<Torrent>> {
        Ok(call(&self.tokio, self.client.torrent_get(fields, ids))?.torrents)
    }

    fn set_location(&mut self, ids: Vec<String>, location: String) -> Result<()> {
        call(
            &self.tokio,
            self.client
                .torrent_set_location(ids.into_iter().map(Id::Hash).collect(), location, Some(true)),
        )?;
        Ok(())
    }

    fn torrent_remove(&mut self, ids: Vec<String>, delete_local_data: bool) -> Result<()> {
        call(
            &self.tokio,
            self.client
                .torrent_remove(ids.into_iter().map(Id::Hash).collect(), delete_local_data),
        )?;
        Ok(())
    }

    fn torrent_start(&mut self, ids: Vec<String>) -> Result<()> {
        use transmission_rpc::types::TorrentAction;
        call(
            &self.tokio,
            self.client
                .torrent_action(TorrentAction::Start, ids.into_iter().map(Id::Hash).collect()),
        )?;
        Ok(())
    }
}

/// Build a `SyncRequest`: a current-thread `tokio` runtime driving the
/// async client synchronously, since this engine has no other concurrency
/// to share it with.
pub fn new_sync_client(client: TransClient) -> Result<SyncRequest> {
    let tokio = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    Ok(SyncRequest { client, tokio })
}

/// In-memory fixture used by the test suite.
#[derive(Debug, Default)]
pub struct MockRequest {
    pub torrents: Vec<Torrent>,
    pub fail_rpc: bool,
    pub removed_ids: Vec<String>,
    pub started_ids: Vec<String>,
    pub relocated: Vec<(Vec<String>, String)>,
}

impl TorrentCli for MockRequest {
    fn torrent_get(
        &mut self,
        _fields: Option<Vec<TorrentGetField>>,
        _ids: Option<Vec<Id>>,
    ) -> Result<Vec<Torrent>> {
        if self.fail_rpc {
            bail!("rpc request failed");
        }
        Ok(self.torrents.clone())
    }

    fn set_location(&mut self, ids: Vec<String>, location: String) -> Result<()> {
        if self.fail_rpc {
            bail!("rpc request failed");
        }
        self.relocated.push((ids, location));
        Ok(())
    }

    fn torrent_remove(&mut self, ids: Vec<String>, _delete_local_data: bool) -> Result<()> {
        if self.fail_rpc {
            bail!("rpc request failed");
        }
        self.removed_ids.extend(ids);
        Ok(())
    }

    fn torrent_start(&mut self, ids: Vec<String>) -> Result<()> {
        if self.fail_rpc {
            bail!("rpc request failed");
        }
        self.started_ids.extend(ids);
        Ok(())
    }
}
