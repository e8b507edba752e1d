use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Advisory lock that keeps two ingest processes from polling the same
/// account and racing each other's prune.
pub struct InstanceLock {
    lock_file: File,
    lock_path: PathBuf,
}

impl InstanceLock {
    /// Lock `<runtime dir>/<name>.lock`, using `XDG_RUNTIME_DIR` when set
    pub fn new(name: &str) -> Result<Self> {
        Self::new_in(&runtime_dir(), name)
    }

    /// Lock `<dir>/<name>.lock`
    pub fn new_in(dir: &Path, name: &str) -> Result<Self> {
        let lock_path = dir.join(format!("{}.lock", name));

        std::fs::create_dir_all(dir).context("Failed to create lock directory")?;

        // Not truncated on open: a failed attempt must not wipe the holder's PID
        let mut lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .context("Failed to open lock file")?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = lock_file.as_raw_fd();
            let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if result != 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    anyhow::bail!(
                        "Another ingest instance is already running. Lock file: {}",
                        lock_path.display()
                    );
                }
                return Err(err).context("Failed to acquire lock");
            }
        }

        let pid = std::process::id();
        lock_file.set_len(0).context("Failed to truncate lock file")?;
        writeln!(lock_file, "{}", pid).context("Failed to write PID to lock file")?;

        info!("Acquired instance lock at {}", lock_path.display());
        debug!("Process ID: {}", pid);

        Ok(Self {
            lock_file,
            lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

fn runtime_dir() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir(),
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.lock_file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }

        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            eprintln!("Failed to remove lock file: {}", e);
        } else {
            debug!("Released instance lock at {}", self.lock_path.display());
        }
    }
}
