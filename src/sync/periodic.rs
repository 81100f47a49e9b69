use log::{error, trace};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::buffered::BufferedSync;

/// Buffered channels plus a background flusher forcing every channel with
/// metadata at a fixed interval.
///
/// A force failure observed by the flusher must not stay silent: the error
/// is recorded per path and re-raised synchronously on the next write to
/// that path, so data loss is observable rather than hidden. The failing
/// channel is evicted and reopened by that next write.
#[derive(Debug)]
pub struct PeriodicSync {
    shared: Arc<Shared>,
    flusher: Mutex<Option<thread::JoinHandle<()>>>,
}

#[derive(Debug, Default)]
struct Shared {
    buffered: BufferedSync,
    flush_errors: Mutex<HashMap<PathBuf, io::Error>>,
    stop: StopSignal,
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

impl PeriodicSync {
    pub fn new(interval: Duration) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name("buckstore-flusher".into())
            .spawn(move || flusher_loop(&worker, interval))
            .ok();
        if handle.is_none() {
            error!("could not spawn the periodic flusher; writes will only be forced on stop");
        }
        Self {
            shared,
            flusher: Mutex::new(handle),
        }
    }

    pub fn write(&self, bytes: &[u8], path: &Path) -> io::Result<()> {
        // A recorded background failure fails this write; the slot is
        // consumed whether or not the retry below succeeds.
        if let Some(cause) = self.shared.flush_errors.lock().remove(path) {
            return Err(io::Error::new(
                cause.kind(),
                format!("periodic flush of channel for {} failed: {cause}", path.display()),
            ));
        }
        self.shared.buffered.write(bytes, path)
    }

    pub fn flush(&self, path: &Path) -> io::Result<()> {
        self.shared.buffered.flush(path)
    }

    pub fn purge(&self, path: &Path) -> io::Result<()> {
        self.shared.buffered.purge(path)
    }

    pub fn stop(&self) {
        {
            let mut stopped = self.shared.stop.stopped.lock();
            *stopped = true;
            self.shared.stop.wakeup.notify_all();
        }
        if let Some(handle) = self.flusher.lock().take() {
            if handle.join().is_err() {
                error!("periodic flusher panicked during stop");
            }
        }
        self.shared.buffered.stop();
    }
}

fn flusher_loop(shared: &Shared, interval: Duration) {
    loop {
        {
            let mut stopped = shared.stop.stopped.lock();
            if *stopped {
                return;
            }
            let _ = shared.stop.wakeup.wait_for(&mut stopped, interval);
            if *stopped {
                return;
            }
        }
        for (path, channel) in shared.buffered.snapshot() {
            trace!("flushing channel for {}", path.display());
            if let Err(err) = channel.force(true) {
                error!("error forcing channel for {}: {err}", path.display());
                // Close the channel now; the error surfaces on the next
                // write, which reopens the file.
                shared.buffered.evict(&path, &channel);
                shared.flush_errors.lock().entry(path).or_insert(err);
            }
        }
    }
}
