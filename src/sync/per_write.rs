use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Opens, writes and closes the target file on every call.
///
/// Bytes reach the OS before `write` returns, so `flush` has nothing left
/// to do and `stop` owns no state. A failed write may leave the file
/// partially written; the caller's retry overwrites it from the start.
#[derive(Debug, Default)]
pub struct PerWriteSync;

impl PerWriteSync {
    pub fn write(&self, bytes: &[u8], path: &Path) -> io::Result<()> {
        if bytes.is_empty() {
            return remove_if_present(path);
        }
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.flush()
    }

    pub fn flush(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    pub fn purge(&self, path: &Path) -> io::Result<()> {
        remove_if_present(path)
    }

    pub fn stop(&self) {}
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
