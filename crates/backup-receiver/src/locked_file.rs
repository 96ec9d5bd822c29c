//! Exclusive advisory locks on the files shared between requests.
//!
//! Locks are taken per file, so writes to unrelated files never wait on each other. The lock is
//! an OS advisory lock, so it also holds against other processes writing to the same directory.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// Holds an exclusive lock on a file until dropped.
pub struct LockGuard<'a> {
    file: &'a File,
}

impl<'a> LockGuard<'a> {
    /// Blocks until an exclusive lock on `file` is held.
    pub fn acquire(file: &'a File) -> io::Result<Self> {
        file.lock()?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Creates a new file at `path` and writes `contents` to it while holding a lock.
///
/// Fails with [`io::ErrorKind::AlreadyExists`] rather than overwriting an existing file. If the
/// write fails the partially written file is removed.
pub fn create_new(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;

    let result = LockGuard::acquire(&file).and_then(|_guard| {
        let mut writer = &file;
        writer.write_all(contents)?;
        file.sync_all()
    });

    if result.is_err() {
        drop(file);
        let _ = fs::remove_file(path);
    }

    result
}

/// Appends `contents` to the file at `path` while holding a lock, creating it if needed.
pub fn append(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let _guard = LockGuard::acquire(&file)?;
    let mut writer = &file;
    writer.write_all(contents)?;
    file.sync_data()
}

/// Replaces the contents of the file at `path` with `update(current contents)` while holding a
/// lock for the whole read-modify-write, creating the file if needed.
///
/// The new contents are written over the old ones before the file is truncated, so unlocked
/// readers never see an empty file as long as the contents never shrink.
pub fn update<F>(path: &Path, update: F) -> io::Result<String>
where
    F: FnOnce(&str) -> String,
{
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let _guard = LockGuard::acquire(&file)?;
    let mut handle = &file;

    let mut current = String::new();
    handle.read_to_string(&mut current)?;

    let updated = update(&current);

    handle.seek(SeekFrom::Start(0))?;
    handle.write_all(updated.as_bytes())?;
    file.set_len(u64::try_from(updated.len()).unwrap_or(u64::MAX))?;
    file.sync_all()?;

    Ok(updated)
}
