//! Bounded worker pool: N OS threads pulling jobs off a shared queue
//! and reporting completions back through a single MPSC channel (§5).
//!
//! Deliberately `std::thread` + `std::sync::mpsc`, not async: the
//! design notes call coroutine-style scheduling unnecessary here,
//! since workers only ever suspend waiting on a subprocess.

use crate::job::{Job, JobRunner, JobResult};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

pub struct WorkerPool {
    job_sender: Option<mpsc::Sender<Job>>,
    result_receiver: mpsc::Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` (minimum 1) worker threads, each running
    /// `runner` for every job it dequeues.
    pub fn new(worker_count: usize, runner: Arc<dyn JobRunner>) -> Self {
        let (job_sender, job_receiver) = mpsc::channel::<Job>();
        let job_receiver = Arc::new(Mutex::new(job_receiver));
        let (result_sender, result_receiver) = mpsc::channel();

        let workers = (0..worker_count.max(1))
            .map(|_| {
                let job_receiver = Arc::clone(&job_receiver);
                let result_sender = result_sender.clone();
                let runner = Arc::clone(&runner);
                thread::spawn(move || loop {
                    let job = {
                        let receiver = job_receiver.lock().unwrap();
                        receiver.recv()
                    };
                    match job {
                        Ok(job) => {
                            let result = runner.run(&job);
                            if result_sender.send(result).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                })
            })
            .collect();

        Self { job_sender: Some(job_sender), result_receiver, workers }
    }

    pub fn submit(&self, job: Job) {
        if let Some(sender) = &self.job_sender {
            let _ = sender.send(job);
        }
    }

    /// Blocks awaiting the next completion. Returns `None` once every
    /// worker has shut down and no more results are coming.
    pub fn recv(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    /// Closes the job queue and joins every worker thread.
    pub fn shutdown(mut self) {
        self.job_sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
