use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of a call made through [`call_with_timeout`].
#[derive(Debug, PartialEq)]
pub enum CallOutcome<T> {
    Completed(T),
    TimedOut,
    /// The worker thread panicked or could not be spawned.
    Crashed,
}

/// Run `f` on a worker thread and wait at most `timeout` for its answer.
///
/// The call is a request/response over a channel. When the deadline passes
/// the worker is abandoned and its late answer is dropped with the channel.
/// `None` waits without a deadline.
pub fn call_with_timeout<T, F>(timeout: Option<Duration>, f: F) -> CallOutcome<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("forge-call".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        });

    if spawned.is_err() {
        return CallOutcome::Crashed;
    }

    match timeout {
        Some(limit) => match rx.recv_timeout(limit) {
            Ok(value) => CallOutcome::Completed(value),
            Err(mpsc::RecvTimeoutError::Timeout) => CallOutcome::TimedOut,
            Err(mpsc::RecvTimeoutError::Disconnected) => CallOutcome::Crashed,
        },
        None => match rx.recv() {
            Ok(value) => CallOutcome::Completed(value),
            Err(_) => CallOutcome::Crashed,
        },
    }
}

/// Cap on calls still running, counting the ones a caller stopped waiting
/// for. A slot is only freed when the call itself returns.
#[derive(Debug)]
pub struct CallLimit {
    capacity: usize,
    running: Mutex<usize>,
    freed: Condvar,
}

/// Slot held by one running call. Dropping it frees the slot.
#[derive(Debug)]
pub struct CallPermit {
    limit: Arc<CallLimit>,
}

impl CallLimit {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            running: Mutex::new(0),
            freed: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn running(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a free slot, at most `timeout` when one is given.
    pub fn acquire(self: &Arc<Self>, timeout: Option<Duration>) -> Option<CallPermit> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut running = self.lock();

        while *running >= self.capacity {
            running = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.freed
                        .wait_timeout(running, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.freed.wait(running).unwrap_or_else(PoisonError::into_inner),
            };
        }

        *running += 1;
        Some(CallPermit { limit: Arc::clone(self) })
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        let mut running = self.limit.lock();
        *running = running.saturating_sub(1);
        self.limit.freed.notify_one();
    }
}
