//! Shared worker pool for job execution.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use tracing::warn;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to control and join a background worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: mpsc::Sender<()>, join: thread::JoinHandle<()>) -> Self {
        Self {
            shutdown,
            join: Some(join),
        }
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Bounded pool of reusable, named worker threads.
///
/// Tasks are boxed closures pulled from a shared channel; at most `size` run
/// at any moment, the rest queue. Dropping the pool stops intake, drains the
/// queue, and joins the workers.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Task>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("job-worker-{i}"))
                    .spawn(move || worker_loop(receiver))
                    .expect("failed to spawn job worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn arc(size: usize) -> Arc<Self> {
        Arc::new(Self::new(size))
    }

    /// Queue a task for execution on the next free worker.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => {
                if sender.send(Box::new(task)).is_err() {
                    warn!("worker pool is shut down, dropping task");
                }
            }
            None => warn!("worker pool is shut down, dropping task"),
        }
    }

    /// Stop accepting work, drain queued tasks, and join the workers.
    pub fn shutdown(mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.drain();
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Task>>>) {
    loop {
        let task = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            guard.recv()
        };

        match task {
            Ok(task) => task(),
            Err(_) => break,
        }
    }
}
