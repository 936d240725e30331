//! Convergence search on a background worker
//!
//! The worker takes ownership of the learner, streams one `EpisodeRecord`
//! per finished episode and hands the learner back on `join`. Dropping the
//! sender is the completion signal. The full history is only kept when the
//! caller asks for it.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use rand::Rng;

use crate::error::{Error, Result};
use crate::history::EpisodeRecord;
use crate::rl::{ConvergenceReport, QLearning};

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Episode(EpisodeRecord),
    /// Nothing arrived within the timeout, the worker is still busy.
    Heartbeat,
    Finished,
}

pub struct ConvergenceOutcome<R> {
    pub learner: QLearning<R>,
    pub result: Result<ConvergenceReport>,
    pub history: Vec<EpisodeRecord>,
}

type WorkerOutput<R> = (QLearning<R>, Result<ConvergenceReport>, Vec<EpisodeRecord>);

pub struct ConvergenceTask<R> {
    handle: JoinHandle<WorkerOutput<R>>,
    progress: Receiver<EpisodeRecord>,
    cancel: Arc<AtomicBool>,
}

impl<R: Rng + Send + 'static> ConvergenceTask<R> {
    pub fn spawn(mut learner: QLearning<R>, threshold: usize, keep_history: bool) -> Self {
        let (tx, progress) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&cancel);

        info!("Starting convergence worker, threshold {}", threshold);
        let handle = thread::spawn(move || {
            let mut history = Vec::new();
            let result = learner.run_until_convergence_with(threshold, |record| {
                if keep_history {
                    history.push(record.clone());
                }
                // The caller may have stopped listening; keep learning anyway.
                let _ = tx.send(record.clone());
                if stop.load(Ordering::Relaxed) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
            (learner, result, history)
        });

        Self {
            handle,
            progress,
            cancel,
        }
    }

    /// Wait up to `timeout` for the next episode.
    pub fn next_event(&self, timeout: Duration) -> TaskEvent {
        match self.progress.recv_timeout(timeout) {
            Ok(record) => TaskEvent::Episode(record),
            Err(RecvTimeoutError::Timeout) => TaskEvent::Heartbeat,
            Err(RecvTimeoutError::Disconnected) => TaskEvent::Finished,
        }
    }

    /// Ask the worker to stop after the episode it is running.
    pub fn cancel(&self) {
        warn!("Cancelling convergence worker");
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Block until the worker is done and take the learner back.
    pub fn join(self) -> Result<ConvergenceOutcome<R>> {
        let (learner, result, history) = self.handle.join().map_err(|_| Error::WorkerPanicked)?;
        Ok(ConvergenceOutcome {
            learner,
            result,
            history,
        })
    }
}
