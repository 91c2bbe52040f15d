//! Single advisory exclusive lock guarding a run of the Controller. A
//! maintenance tick must not wait; a torrent-done callback must block
//! until granted.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::errors::*;

pub struct Lock {
    file: File,
}

impl Lock {
    /// Acquire the lock at `path`, creating it if necessary.
    ///
    /// `blocking == true` (torrent-done invocation) waits until the lock is
    /// granted; `blocking == false` (maintenance tick) returns `LockHeld`
    /// immediately if another instance holds it.
    pub fn acquire(path: &Path, blocking: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating lock directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening lock file {}", path.display()))?;

        let op = if blocking {
            libc::LOCK_EX
        } else {
            libc::LOCK_EX | libc::LOCK_NB
        };

        // SAFETY: `file` owns a valid fd for the duration of this call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if !blocking && err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(LockHeld.into());
            }
            return Err(err).context("flock");
        }
        Ok(Self { file })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        // SAFETY: the fd is valid until the struct is dropped; flock(2) is
        // undone automatically on close(2) too, but doing it explicitly
        // documents the intent and frees other waiters sooner.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("seedkeeper-lock-test-{}-{name}", std::process::id()))
    }

    #[test]
    fn non_blocking_acquire_fails_while_held() {
        let path = tmp_path("a");
        let _first = Lock::acquire(&path, false).unwrap();
        let second = Lock::acquire(&path, false);
        assert!(second.unwrap_err().downcast_ref::<LockHeld>().is_some());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn lock_is_released_on_drop() {
        let path = tmp_path("b");
        {
            let _first = Lock::acquire(&path, false).unwrap();
        }
        let second = Lock::acquire(&path, false);
        assert!(second.is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
