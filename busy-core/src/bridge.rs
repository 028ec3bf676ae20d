//! Blocking caller ↔ async runtime bridge.
//!
//! [`AsyncRunner`] hosts a current-thread tokio runtime on its own OS thread.
//! Synchronous code submits a future with [`AsyncRunner::run`] and blocks
//! until the result comes back; it never touches the runtime directly.

use std::future::Future;
use std::pin::Pin;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::BusyError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct AsyncRunner {
    jobs: Option<mpsc::UnboundedSender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl AsyncRunner {
    /// Build the runtime and start its thread.
    pub fn start(name: &str) -> Result<Self, BusyError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        tokio::spawn(job);
                    }
                });
                debug!("async runner thread exiting");
            })?;

        Ok(Self {
            jobs: Some(jobs),
            thread: Some(thread),
        })
    }

    /// Run `future` on the runner thread and block until it completes.
    ///
    /// Must not be called from inside an async context.
    pub fn run<F, T>(&self, future: F) -> Result<T, BusyError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(BusyError::RunnerStopped)?;
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = tx.send(future.await);
        });
        jobs.send(job).map_err(|_| BusyError::RunnerStopped)?;
        rx.blocking_recv().map_err(|_| BusyError::RunnerStopped)
    }

    pub fn is_running(&self) -> bool {
        self.jobs.is_some()
    }

    /// Stop accepting work and join the thread. Unfinished jobs are dropped.
    pub fn stop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("async runner thread panicked");
            }
        }
    }
}

impl Drop for AsyncRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
