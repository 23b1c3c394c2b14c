use std::fs::{File, OpenOptions};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;

/// Single writer process per storage root, held for the lifetime of a Database.
pub struct FileLock {
    pub file: File,
}

impl FileLock {
    pub fn acquire(storage: &StorageLayout) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(storage.lock_path())?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();
            unsafe {
                if flock(fd, LOCK_EX | LOCK_NB) != 0 {
                    return Err(Error::new(
                        ErrorKind::InvalidState,
                        format!("Storage root {} is in use by another process", storage.base_dir.display()),
                    ));
                }
            }
        }

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

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

    #[cfg(unix)]
    #[test]
    fn second_lock_on_same_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();

        let first = FileLock::acquire(&layout).unwrap();
        let second = FileLock::acquire(&layout);
        assert_eq!(second.err().map(|e| e.kind), Some(ErrorKind::InvalidState));

        drop(first);
        assert!(FileLock::acquire(&layout).is_ok());
    }
}
