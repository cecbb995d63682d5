//! Advisory per-role file locks
//!
//! Serializes the check-and-write of a role across processes sharing one
//! metadata directory. Each role has a `<role>.lock` file under
//! [`RoleLock::LOCK_DIR`]; the holder writes its pid into it so a waiting
//! process can report who it is blocked on. Waits are bounded.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock timeout after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive advisory lock on one role of a metadata directory.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RoleLock {
    path: PathBuf,
    file: File,
}

impl RoleLock {
    /// Directory holding lock files, relative to the metadata directory
    pub const LOCK_DIR: &'static str = ".locks";

    const RETRY_EVERY: Duration = Duration::from_millis(20);

    const REPORT_WAIT_AFTER: Duration = Duration::from_millis(500);

    /// Lock `role` under `metadata_dir`, giving up after `timeout`
    pub fn acquire(metadata_dir: &Path, role: &str, timeout: Duration) -> LockResult<Self> {
        let dir = metadata_dir.join(Self::LOCK_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.lock", role));

        let deadline = Instant::now() + timeout;
        let mut waiting_since: Option<Instant> = None;
        let mut reported = false;

        loop {
            if let Some(mut file) = lock_exclusive(&path)? {
                record_holder(&mut file)?;
                if let Some(since) = waiting_since {
                    tracing::debug!(
                        role,
                        waited_ms = since.elapsed().as_millis() as u64,
                        "role lock acquired"
                    );
                }
                return Ok(Self { path, file });
            }

            let since = *waiting_since.get_or_insert_with(Instant::now);
            if !reported && since.elapsed() >= Self::REPORT_WAIT_AFTER {
                reported = true;
                tracing::warn!(
                    role,
                    holder = ?read_holder(&path),
                    "waiting for role lock held by another process"
                );
            }

            if Instant::now() >= deadline {
                return Err(LockError::Timeout(timeout));
            }
            std::thread::sleep(Self::RETRY_EVERY);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid written by the process holding this lock
    pub fn holder(&self) -> Option<u32> {
        read_holder(&self.path)
    }
}

impl Drop for RoleLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// `Ok(None)` when another process holds the lock
#[cfg(unix)]
fn lock_exclusive(path: &Path) -> io::Result<Option<File>> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .open(path)?;

    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(Some(file));
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK => Ok(None),
        _ => Err(err),
    }
}

/// Without flock the lock file itself is the lock
#[cfg(not(unix))]
fn lock_exclusive(path: &Path) -> io::Result<Option<File>> {
    match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

fn record_holder(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

fn read_holder(path: &Path) -> Option<u32> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}
