//! Running decode jobs off the render thread.
//!
//! A [`TaskRunner`] executes [`DecodeJob`]s somewhere and hands their
//! [`DecodeOutput`]s back through [`TaskRunner::poll`]. Polling only happens
//! from [`Display::update`](crate::Display::update) on the owning thread, so
//! that call is the only point where decoded data meets GPU state.

use std::collections::VecDeque;
use std::io;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::decode::{DecodeJob, DecodeOutput};

/// Executes decode jobs and returns their results to the owning thread.
pub trait TaskRunner {
    /// Queue a job.
    fn submit(&mut self, job: DecodeJob);

    /// Take one finished job, if any.
    fn poll(&mut self) -> Option<DecodeOutput>;
}

/// Runs each job immediately on the calling thread, but still defers its
/// completion until the next poll.
#[derive(Default)]
pub struct InlineRunner {
    finished: VecDeque<DecodeOutput>,
}

impl InlineRunner {
    /// A runner with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRunner for InlineRunner {
    fn submit(&mut self, job: DecodeJob) {
        self.finished.push_back(job.run());
    }

    fn poll(&mut self) -> Option<DecodeOutput> {
        self.finished.pop_front()
    }
}

/// A fixed pool of worker threads fed through a channel.
pub struct ThreadPoolRunner {
    jobs: Option<Sender<DecodeJob>>,
    results: Receiver<DecodeOutput>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolRunner {
    /// Spawn `threads` workers (at least one).
    ///
    /// # Errors
    ///
    /// Fails if a worker thread cannot be spawned.
    pub fn new(threads: usize) -> io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<DecodeJob>();
        let (result_tx, result_rx) = unbounded();

        let workers = (0..threads.max(1))
            .map(|index| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                std::thread::Builder::new()
                    .name(format!("orx-decode-{index}"))
                    .spawn(move || {
                        for job in &jobs {
                            if results.send(job.run()).is_err() {
                                break;
                            }
                        }
                    })
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            workers,
        })
    }
}

impl TaskRunner for ThreadPoolRunner {
    fn submit(&mut self, job: DecodeJob) {
        if let Some(jobs) = &self.jobs {
            if jobs.send(job).is_err() {
                log::error!("decode workers are gone, dropping job");
            }
        }
    }

    fn poll(&mut self) -> Option<DecodeOutput> {
        self.results.try_recv().ok()
    }
}

impl Drop for ThreadPoolRunner {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        self.jobs = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("decode worker panicked");
            }
        }
    }
}
