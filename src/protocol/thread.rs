use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads fed through a bounded queue.
///
/// `execute` blocks once `backlog` jobs are queued and no worker is free,
/// which is what throttles the accept loop.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::SyncSender<Job>>,
}

impl ThreadPool {
    pub fn new(size: usize, backlog: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "a thread pool needs at least one worker",
            ));
        }

        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::sync_channel(backlog);

        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Some(sender);

        for i in 0..size {
            workers.push(Worker::new(i, Arc::clone(&receiver))?);
        }

        Ok(Self { workers, sender })
    }

    pub fn execute<F>(&self, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Box::new(f);
        self.sender
            .as_ref()
            .ok_or_else(|| io::Error::other("thread pool is shut down"))?
            .send(job)
            .map_err(|_| io::Error::other("all pool workers have exited"))
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("shutting down worker {}", worker.id);

            if worker.thread.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("parcel-worker-{id}"))
            .spawn(move || {
                loop {
                    // The guard must drop before the job runs so other workers
                    // can keep pulling.
                    let msg = match receiver.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    match msg {
                        Ok(job) => {
                            debug!("worker {id} handling a connection");
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                warn!("worker {id} recovered from a panicking job");
                            }
                        }
                        Err(_) => {
                            debug!("worker {id} disconnected");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { id, thread })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_every_job_before_drop_returns() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(3, 2).unwrap();

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        drop(pool);

        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = ThreadPool::new(0, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
