use log::error;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An exclusive open read/write handle positioned at the end of the last
/// write. Dropping the last reference closes the file.
#[derive(Debug)]
pub(crate) struct Channel {
    file: Mutex<File>,
}

impl Channel {
    fn open(path: &Path) -> io::Result<Arc<Self>> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(Arc::new(Self {
            file: Mutex::new(file),
        }))
    }

    fn append(&self, bytes: &[u8]) -> io::Result<()> {
        self.file.lock().write_all(bytes)
    }

    /// Forces written bytes to stable storage, with or without metadata.
    pub(crate) fn force(&self, metadata: bool) -> io::Result<()> {
        let file = self.file.lock();
        if metadata {
            file.sync_all()
        } else {
            file.sync_data()
        }
    }

    fn truncate(&self) -> io::Result<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

/// Keeps one open channel per bucket file and defers fsync to callers.
///
/// Invariant: at most one live channel per path. Racing first opens
/// converge through insert-if-absent; recreates after an external delete
/// converge through a pointer-compared replace. The loser is dropped,
/// which closes its handle.
#[derive(Debug, Default)]
pub struct BufferedSync {
    channels: Mutex<HashMap<PathBuf, Arc<Channel>>>,
}

impl BufferedSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, bytes: &[u8], path: &Path) -> io::Result<()> {
        if bytes.is_empty() {
            return match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err),
            };
        }
        self.channel_for_write(path)?.append(bytes)
    }

    fn channel_for_write(&self, path: &Path) -> io::Result<Arc<Channel>> {
        let cached = self.channels.lock().get(path).cloned();
        match cached {
            None => {
                let fresh = Channel::open(path)?;
                Ok(self.intern(path, fresh))
            }
            Some(stale) if !path.exists() => {
                // The file vanished under the cached channel. A plain delete
                // does not invalidate an open handle, so writes through the
                // stale channel would target an unlinked inode. Recreate the
                // file and swap the table entry atomically.
                let fresh = Channel::open(path)?;
                let mut table = self.channels.lock();
                match table.get_mut(path) {
                    Some(current) if Arc::ptr_eq(current, &stale) => {
                        *current = fresh.clone();
                        Ok(fresh)
                    }
                    Some(current) => Ok(current.clone()),
                    None => {
                        table.insert(path.to_path_buf(), fresh.clone());
                        Ok(fresh)
                    }
                }
            }
            Some(channel) => Ok(channel),
        }
    }

    /// First-writer-wins insert; a racing loser's channel is dropped.
    fn intern(&self, path: &Path, fresh: Arc<Channel>) -> Arc<Channel> {
        let mut table = self.channels.lock();
        match table.entry(path.to_path_buf()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                slot.insert(fresh.clone());
                fresh
            }
        }
    }

    pub fn flush(&self, path: &Path) -> io::Result<()> {
        let channel = self.channels.lock().get(path).cloned();
        match channel {
            Some(channel) => channel.force(false),
            None => Ok(()),
        }
    }

    /// Clears the file by truncating to length 0 and rewinding.
    ///
    /// Deletion would hamper the cached channel: the visible file and the
    /// open handle must stay consistent for subsequent writes.
    pub fn purge(&self, path: &Path) -> io::Result<()> {
        let cached = self.channels.lock().get(path).cloned();
        let channel = match cached {
            Some(channel) => channel,
            None => {
                let fresh = Channel::open(path)?;
                self.intern(path, fresh)
            }
        };
        channel.truncate()
    }

    pub fn stop(&self) {
        let drained: Vec<(PathBuf, Arc<Channel>)> = self.channels.lock().drain().collect();
        for (path, channel) in drained {
            if let Err(err) = channel.force(true) {
                error!("error flushing channel for {}: {err}", path.display());
            }
        }
    }

    /// Snapshot of the table for the background flusher; no table lock is
    /// held while the returned channels are forced.
    pub(crate) fn snapshot(&self) -> Vec<(PathBuf, Arc<Channel>)> {
        self.channels
            .lock()
            .iter()
            .map(|(path, channel)| (path.clone(), channel.clone()))
            .collect()
    }

    /// Removes `channel` from the table if it is still the live entry for
    /// `path`; a channel swapped in the meantime is left alone.
    pub(crate) fn evict(&self, path: &Path, channel: &Arc<Channel>) {
        let mut table = self.channels.lock();
        if let Some(current) = table.get(path) {
            if Arc::ptr_eq(current, channel) {
                table.remove(path);
            }
        }
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_append_through_one_cached_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("3");
        let sync = BufferedSync::new();
        sync.write(b"abc", &path).unwrap();
        sync.write(b"def", &path).unwrap();
        assert_eq!(sync.channel_count(), 1);
        assert_eq!(fs::read(&path).unwrap(), b"abcdef");
    }

    #[test]
    fn empty_payload_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("3");
        let sync = BufferedSync::new();
        sync.write(b"abc", &path).unwrap();
        sync.write(b"", &path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn purge_truncates_and_keeps_the_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("3");
        let sync = BufferedSync::new();
        sync.write(b"stale image", &path).unwrap();
        sync.purge(&path).unwrap();
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(sync.channel_count(), 1);

        // The rewound channel writes the next image from offset zero.
        sync.write(b"fresh", &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"fresh");
    }

    #[test]
    fn purge_without_a_channel_creates_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("3");
        let sync = BufferedSync::new();
        sync.purge(&path).unwrap();
        assert!(path.exists());
        assert_eq!(sync.channel_count(), 1);
    }

    #[test]
    fn external_delete_is_recreated_on_the_next_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("3");
        let sync = BufferedSync::new();
        sync.write(b"v1", &path).unwrap();
        fs::remove_file(&path).unwrap();

        sync.write(b"v2", &path).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap(), b"v2");
        assert_eq!(sync.channel_count(), 1);
    }

    #[test]
    fn stop_forces_and_drains_every_channel() {
        let dir = tempdir().unwrap();
        let sync = BufferedSync::new();
        for id in 0..4 {
            sync.write(b"image", &dir.path().join(id.to_string())).unwrap();
        }
        assert_eq!(sync.channel_count(), 4);
        sync.stop();
        assert_eq!(sync.channel_count(), 0);
        for id in 0..4 {
            assert_eq!(fs::read(dir.path().join(id.to_string())).unwrap(), b"image");
        }
    }

    #[test]
    fn racing_writers_converge_on_one_channel() {
        use std::thread;

        let dir = tempdir().unwrap();
        let path = dir.path().join("3");
        let sync = Arc::new(BufferedSync::new());

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let sync = sync.clone();
                let path = path.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        sync.purge(&path).unwrap();
                        sync.write(b"image", &path).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(sync.channel_count(), 1);
        // Every surviving byte went through the one winning channel, so the
        // file holds only whole images and each round ends with a write.
        let content = fs::read(&path).unwrap();
        assert!(!content.is_empty());
        assert_eq!(content.len() % b"image".len(), 0);
        assert!(content
            .chunks(b"image".len())
            .all(|chunk| chunk == b"image"));
    }

    #[test]
    fn evict_ignores_a_replaced_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("3");
        let sync = BufferedSync::new();
        sync.write(b"v1", &path).unwrap();
        let old = sync.channels.lock().get(&path).cloned().unwrap();

        fs::remove_file(&path).unwrap();
        sync.write(b"v2", &path).unwrap();

        sync.evict(&path, &old);
        assert_eq!(sync.channel_count(), 1);
    }
}
