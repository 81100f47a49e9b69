//! Worker pool integration for multi-threaded expired-entry purges.

use log::warn;
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// A per-bucket unit of purge work.
pub type PurgeTask = Box<dyn FnOnce() + Send + 'static>;

/// Executor the store hands per-bucket purge tasks to.
///
/// Tasks are independent of each other; the store never waits on them
/// itself. Supplied by the host when it opts into multi-threaded purge.
pub trait PurgeExecutor: Send + Sync {
    fn execute(&self, task: PurgeTask);
}

/// Fixed-size thread pool with idle tracking.
///
/// `wait_idle` lets callers observe the end of a purge sweep. Dropping the
/// pool closes the task channel and joins every worker.
pub struct PurgeThreadPool {
    sender: Mutex<Option<Sender<PurgeTask>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    pending: Arc<Pending>,
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PurgeThreadPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<PurgeTask>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(Pending::default());
        let handles = (0..workers)
            .map(|index| {
                let receiver = receiver.clone();
                let pending = pending.clone();
                thread::Builder::new()
                    .name(format!("buckstore-purge-{index}"))
                    .spawn(move || worker_loop(&receiver, &pending))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!("could not spawn purge worker: {err}");
                    None
                }
            })
            .collect();
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            pending,
        }
    }

    /// Blocks until every submitted task has finished.
    pub fn wait_idle(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
    }

    fn submit(&self, task: PurgeTask) {
        {
            let mut count = self.pending.count.lock();
            *count += 1;
        }
        let rejected = match &*self.sender.lock() {
            Some(sender) => sender.send(task).err().map(|err| err.0),
            None => Some(task),
        };
        if let Some(task) = rejected {
            // Pool already stopped; run on the caller so the sweep still
            // covers this bucket.
            warn!("purge pool stopped, running task on the caller thread");
            task();
            self.pending.finish();
        }
    }
}

impl Pending {
    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

impl PurgeExecutor for PurgeThreadPool {
    fn execute(&self, task: PurgeTask) {
        self.submit(task);
    }
}

impl Drop for PurgeThreadPool {
    fn drop(&mut self) {
        self.sender.lock().take();
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<PurgeTask>>, pending: &Pending) {
    loop {
        let message = receiver.lock().recv();
        match message {
            Ok(task) => {
                task();
                pending.finish();
            }
            Err(_) => break,
        }
    }
}
