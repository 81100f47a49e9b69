//! Bulk stream export/import of the on-disk file layout.
//!
//! The frame is a flat catalog tied to the live layout rather than bucket
//! semantics, so an import reproduces the exporting node's directory
//! byte-for-byte without re-marshalling: a big-endian `u32` file count,
//! then per file a length-prefixed UTF-8 name, a big-endian `u32` size
//! and that many raw bytes.

use super::BucketStore;
use crate::error::LoaderError;
use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

impl BucketStore {
    /// Writes the full file catalog under the root to `output`.
    ///
    /// Fails with [`LoaderError::NotADirectory`] when the root cannot be
    /// listed. Any other error aborts the whole transfer.
    pub fn export_to(&self, output: &mut impl Write) -> Result<(), LoaderError> {
        let files = self.bucket_files().map_err(|_| LoaderError::NotADirectory {
            path: self.root().to_path_buf(),
        })?;
        let count = u32::try_from(files.len()).map_err(|_| LoaderError::EntryTooLarge {
            name: self.root().display().to_string(),
        })?;
        output.write_all(&count.to_be_bytes())?;

        let chunk = self.config().stream_buffer_size;
        let mut buffer = vec![0u8; chunk];
        for path in files {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file = File::open(&path)?;
            let declared = file.metadata()?.len();
            let declared = u32::try_from(declared)
                .map_err(|_| LoaderError::EntryTooLarge { name: name.clone() })?;
            write_utf(output, &name)?;
            output.write_all(&declared.to_be_bytes())?;

            let mut reader = BufReader::with_capacity(chunk, file);
            let mut remaining = declared as usize;
            while remaining > 0 {
                let want = remaining.min(chunk);
                let got = reader.read(&mut buffer[..want])?;
                if got == 0 {
                    // Shrunk since we sized it; the declared count is a hint.
                    break;
                }
                output.write_all(&buffer[..got])?;
                remaining -= got;
            }
        }
        Ok(())
    }

    /// Recreates a previously exported catalog under this store's root.
    ///
    /// Each entry becomes a file with exactly the declared bytes; an EOF
    /// mid-file ends that file's copy without error. Entry names must be
    /// plain file names; the catalog layout is flat.
    pub fn import_from(&self, input: &mut impl Read) -> Result<(), LoaderError> {
        let count = read_u32(input)?;
        let chunk = self.config().stream_buffer_size;
        let mut buffer = vec![0u8; chunk];
        for _ in 0..count {
            let name = read_utf(input)?;
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(LoaderError::InvalidEntryName { name });
            }
            let declared = read_u32(input)? as usize;

            let file = File::create(self.root().join(&name))?;
            let mut writer = BufWriter::with_capacity(chunk, file);
            // Scoped per file: a short read can never bleed a stale count
            // into the next catalog entry.
            let mut copied = 0usize;
            while copied < declared {
                let want = (declared - copied).min(chunk);
                let got = input.read(&mut buffer[..want])?;
                if got == 0 {
                    debug!(
                        "stream ended after {copied} of {declared} bytes for {name}"
                    );
                    break;
                }
                writer.write_all(&buffer[..got])?;
                copied += got;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

fn write_utf(output: &mut impl Write, value: &str) -> Result<(), LoaderError> {
    let len = u16::try_from(value.len()).map_err(|_| LoaderError::InvalidEntryName {
        name: value.to_string(),
    })?;
    output.write_all(&len.to_be_bytes())?;
    output.write_all(value.as_bytes())?;
    Ok(())
}

fn read_utf(input: &mut impl Read) -> Result<String, LoaderError> {
    let mut len = [0u8; 2];
    input.read_exact(&mut len)?;
    let mut bytes = vec![0u8; u16::from_be_bytes(len) as usize];
    input.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|err| LoaderError::InvalidEntryName {
        name: String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

fn read_u32(input: &mut impl Read) -> Result<u32, LoaderError> {
    let mut bytes = [0u8; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}
