//! Flat configuration: seed-dir, watch-dir, RPC endpoint, quota, per-category
//! destinations, and the paths to the regex/categorizer assets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use transmission_rpc::types::BasicAuth;
use transmission_rpc::TransClient;
use url::Url;

use crate::categorizer::Category;
use crate::errors::*;
use crate::rpc::{new_sync_client, SyncRequest};

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Destinations {
    pub default: PathBuf,
    pub movies: Option<PathBuf>,
    #[serde(rename = "tv-shows")]
    pub tv_shows: Option<PathBuf>,
    pub music: Option<PathBuf>,
    pub av: Option<PathBuf>,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            default: PathBuf::from("/var/cache/torrents/completed"),
            movies: None,
            tv_shows: None,
            music: None,
            av: None,
        }
    }
}

impl Destinations {
    /// `destinations[cat] or destinations[default]`.
    #[must_use]
    pub fn for_category(&self, cat: Category) -> &Path {
        let specific = match cat {
            Category::Film => self.movies.as_deref(),
            Category::Tv => self.tv_shows.as_deref(),
            Category::Music => self.music.as_deref(),
            Category::Av => self.av.as_deref(),
            Category::Default => None,
        };
        specific.unwrap_or(&self.default)
    }
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub seed_dir: PathBuf,
    pub watch_dir: PathBuf,
    pub rpc_url: Url,
    pub rpc_username: Option<String>,
    pub rpc_password: Option<String>,
    pub quota_gib: u64,
    pub destinations: Destinations,
    pub regex_file: PathBuf,
    pub categorizer_program: Option<PathBuf>,
    pub log_file: PathBuf,
    pub lock_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_dir: PathBuf::from("/var/cache/torrents/seed"),
            watch_dir: PathBuf::new(),
            rpc_url: Url::parse("http://127.0.0.1:9091/transmission/rpc").unwrap(),
            rpc_username: None,
            rpc_password: None,
            quota_gib: 0,
            destinations: Destinations::default(),
            regex_file: PathBuf::from("/etc/seedkeeper/av.regex"),
            categorizer_program: None,
            log_file: PathBuf::from("/var/log/seedkeeper.log"),
            lock_file: PathBuf::from("/run/seedkeeper.lock"),
        }
    }
}

impl Config {
    pub fn load(name: &str) -> Result<Self> {
        confy::load(name, Some("config")).context("config")
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self> {
        confy::load_path(path).context("config")
    }

    pub fn config_path(name: &str) -> Result<PathBuf> {
        confy::get_configuration_file_path(name, Some("config")).context("config path")
    }

    /// Fails fast on the invariants the rest of the
    /// engine assumes: `seed-dir` is required and absolute, `quota-gib` non-
    /// negative is guaranteed by the type, `destinations.default` required.
    pub fn validate(&self) -> Result<()> {
        if self.seed_dir.as_os_str().is_empty() {
            bail!(SetupError("seed-dir is required".into()));
        }
        if !self.seed_dir.is_absolute() {
            bail!(SetupError(format!(
                "seed-dir must be absolute: {}",
                self.seed_dir.display()
            )));
        }
        if self.destinations.default.as_os_str().is_empty() {
            bail!(SetupError("destinations.default is required".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn quota_bytes(&self) -> u64 {
        self.quota_gib.saturating_mul(1024 * 1024 * 1024)
    }

    #[must_use]
    pub fn watch_dir_enabled(&self) -> Option<&Path> {
        if self.watch_dir.as_os_str().is_empty() {
            None
        } else {
            Some(&self.watch_dir)
        }
    }

    pub fn new_transmission(&self) -> Result<TransClient> {
        if let (Some(user), Some(password)) = (&self.rpc_username, &self.rpc_password) {
            let basic_auth = BasicAuth {
                user: user.clone(),
                password: password.clone(),
            };
            Ok(TransClient::with_auth(self.rpc_url.clone(), basic_auth))
        } else {
            Ok(TransClient::new(self.rpc_url.clone()))
        }
    }

    pub fn new_sync_client(&self) -> Result<SyncRequest> {
        new_sync_client(self.new_transmission()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_seed_dir() {
        let mut cfg = Config::default();
        cfg.seed_dir = PathBuf::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.downcast_ref::<SetupError>().is_some());
    }

    #[test]
    fn rejects_relative_seed_dir() {
        let mut cfg = Config::default();
        cfg.seed_dir = PathBuf::from("relative/seed");
        let err = cfg.validate().unwrap_err();
        assert!(err.downcast_ref::<SetupError>().is_some());
    }

    #[test]
    fn zero_quota_is_valid_and_disables_quota() {
        let cfg = Config::default();
        assert_eq!(cfg.quota_gib, 0);
        assert_eq!(cfg.quota_bytes(), 0);
    }

    #[test]
    fn watch_dir_empty_disables_cleanup() {
        let cfg = Config::default();
        assert!(cfg.watch_dir_enabled().is_none());
    }

    #[test]
    fn destinations_fall_back_to_default() {
        let d = Destinations {
            default: PathBuf::from("/dst/default"),
            movies: Some(PathBuf::from("/dst/movies")),
            tv_shows: None,
            music: None,
            av: None,
        };
        assert_eq!(d.for_category(Category::Film), Path::new("/dst/movies"));
        assert_eq!(d.for_category(Category::Tv), Path::new("/dst/default"));
        assert_eq!(d.for_category(Category::Default), Path::new("/dst/default"));
    }
}
