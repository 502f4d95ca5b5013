use super::Ticket;
use anyhow::{Context, Result};
use std::sync::mpsc;
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single dedicated thread for the blocking parts of clip preparation.
///
/// One worker, not a pool: prepare requests run strictly in FIFO order. Jobs
/// must not touch scheduler state; they report through the event channel.
pub struct PrepareWorker {
    tx: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

/// Cloneable submission side handed to engines
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Job>,
}

impl PrepareWorker {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();

        let thread = std::thread::Builder::new()
            .name("prepare-worker".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                log::debug!("Prepare worker drained, exiting");
            })
            .context("Failed to spawn prepare worker thread")?;

        log::info!("Prepare worker started");

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> Option<WorkerHandle> {
        self.tx.as_ref().map(|tx| WorkerHandle { tx: tx.clone() })
    }

    /// Stop accepting work and join the thread once queued jobs finish.
    ///
    /// Engines still holding a [`WorkerHandle`] keep the queue open, so they
    /// must be released first.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Prepare worker panicked");
            } else {
                log::info!("Prepare worker stopped");
            }
        }
    }
}

impl Drop for PrepareWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl WorkerHandle {
    /// Queue a job; returns false when the worker is gone
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

/// Results built on the worker, waiting for the control loop to claim them.
///
/// The worker only sends; installing a result into engine state happens on
/// the control loop, keyed by the ticket it was prepared for.
#[cfg_attr(not(feature = "video"), allow(dead_code))]
pub struct Handoff<T> {
    tx: mpsc::Sender<(Ticket, T)>,
    rx: mpsc::Receiver<(Ticket, T)>,
}

#[cfg_attr(not(feature = "video"), allow(dead_code))]
impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(not(feature = "video"), allow(dead_code))]
impl<T> Handoff<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> mpsc::Sender<(Ticket, T)> {
        self.tx.clone()
    }

    /// Drain delivered results and return the newest one for `active`.
    /// Everything else is superseded and goes to `discard`.
    pub fn claim(&self, active: Option<Ticket>, mut discard: impl FnMut(T)) -> Option<T> {
        let mut claimed = None;
        while let Ok((ticket, value)) = self.rx.try_recv() {
            if Some(ticket) == active {
                if let Some(older) = claimed.replace(value) {
                    discard(older);
                }
            } else {
                discard(value);
            }
        }
        claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceId;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_jobs_run_in_fifo_order() {
        let mut worker = PrepareWorker::spawn().unwrap();
        let handle = worker.handle().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = seen.clone();
            assert!(handle.submit(move || seen.lock().unwrap().push(i)));
        }

        drop(handle);
        worker.shutdown();
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_handoff_claims_only_active_ticket() {
        let ticket = |generation| Ticket {
            surface: SurfaceId::A,
            generation,
        };
        let mut worker = PrepareWorker::spawn().unwrap();
        let handle = worker.handle().unwrap();
        let handoff = Handoff::new();

        for generation in 1..=3 {
            let tx = handoff.sender();
            assert!(handle.submit(move || tx.send((ticket(generation), generation)).unwrap()));
        }
        drop(handle);
        worker.shutdown();

        let mut discarded = Vec::new();
        assert_eq!(handoff.claim(Some(ticket(2)), |g| discarded.push(g)), Some(2));
        assert_eq!(discarded, vec![1, 3]);

        // Nothing left once claimed
        assert_eq!(handoff.claim(Some(ticket(2)), |g| discarded.push(g)), None);
    }

    #[test]
    fn test_handoff_without_active_ticket_discards_all() {
        let handoff = Handoff::new();
        let tx = handoff.sender();
        tx.send((
            Ticket {
                surface: SurfaceId::B,
                generation: 7,
            },
            "pipeline",
        ))
        .unwrap();

        let mut discarded = Vec::new();
        assert_eq!(handoff.claim(None, |p| discarded.push(p)), None);
        assert_eq!(discarded, vec!["pipeline"]);
    }

    #[test]
    fn test_handle_unavailable_after_shutdown() {
        let mut worker = PrepareWorker::spawn().unwrap();
        worker.shutdown();
        assert!(worker.handle().is_none());
    }

    #[test]
    fn test_submit_fails_once_worker_gone() {
        let mut worker = PrepareWorker::spawn().unwrap();
        let handle = worker.handle().unwrap();
        // Simulate the thread having exited: replace the queue with a closed one
        let (tx, rx) = mpsc::channel::<Job>();
        drop(rx);
        let closed = WorkerHandle { tx };
        assert!(!closed.submit(|| {}));

        assert!(handle.submit(|| {}));
        drop(handle);
        worker.shutdown();
    }
}
