use std::fs::{File, OpenOptions};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::error::{Error, ErrorKind, Result};

/// Advisory lock on a file, shared (readers) or exclusive (one
/// writer), acquired with a timeout and exponential backoff matching
/// spec.md §5: "lock acquisition has a configurable timeout (default
/// 60s) and fails with `TocLockTimeout`".
pub struct FileLock {
    file: File,
    exclusive: bool,
}

impl FileLock {
    pub fn acquire(path: &Path, exclusive: bool, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        let deadline = Instant::now() + timeout;
        let mut backoff = Duration::from_millis(5);

        loop {
            if try_flock(&file, exclusive) {
                return Ok(FileLock { file, exclusive });
            }
            if Instant::now() >= deadline {
                return Err(Error::new(
                    ErrorKind::LockTimeout,
                    format!("timed out acquiring {} lock on {}", if exclusive { "exclusive" } else { "shared" }, path.display()),
                ));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(backoff.min(remaining));
            backoff = (backoff * 2).min(Duration::from_secs(1));
        }
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

#[cfg(unix)]
fn try_flock(file: &File, exclusive: bool) -> bool {
    use libc::{flock, LOCK_EX, LOCK_NB, LOCK_SH};
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let op = (if exclusive { LOCK_EX } else { LOCK_SH }) | LOCK_NB;
    unsafe { flock(fd, op) == 0 }
}

#[cfg(not(unix))]
fn try_flock(_file: &File, _exclusive: bool) -> bool {
    true
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{flock, LOCK_UN};
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_lock_blocks_a_second_exclusive_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let _first = FileLock::acquire(&path, true, Duration::from_millis(50)).unwrap();
        let second = FileLock::acquire(&path, true, Duration::from_millis(50));
        assert!(second.is_err());
        assert_eq!(second.unwrap_err().kind, ErrorKind::LockTimeout);
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let _a = FileLock::acquire(&path, false, Duration::from_millis(50)).unwrap();
        let _b = FileLock::acquire(&path, false, Duration::from_millis(50)).unwrap();
    }
}
