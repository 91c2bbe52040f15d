pub use anyhow::{anyhow, bail, Context as _, Error, Result};

/// The bag handed to the Categorizer had no records left after dropping
/// malformed ones.
#[derive(Debug)]
pub struct EmptyBag;
impl std::error::Error for EmptyBag {}
impl std::fmt::Display for EmptyBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "empty bag: classification requires at least one record")
    }
}

/// A single `(path, size)` record could not be parsed; the record is
/// dropped and classification proceeds on the remainder.
#[derive(Debug)]
pub struct MalformedRecord(pub String);
impl std::error::Error for MalformedRecord {}
impl std::fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed record: {}", self.0)
    }
}

/// Bad configuration, unreadable regex file, missing assets: fail fast,
/// no RPC is attempted.
#[derive(Debug)]
pub struct SetupError(pub String);
impl std::error::Error for SetupError {}
impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "setup error: {}", self.0)
    }
}

/// Another instance holds the run lock; a maintenance tick exits cleanly
/// on this, a torrent-done callback instead blocks until granted.
#[derive(Debug)]
pub struct LockHeld;
impl std::error::Error for LockHeld {}
impl std::fmt::Display for LockHeld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "another instance holds the run lock")
    }
}
