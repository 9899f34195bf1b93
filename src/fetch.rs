use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn spawn(&self, job: Job);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn spawn(&self, job: Job) {
        thread::spawn(job);
    }
}

#[derive(Clone, Default)]
pub struct QueuedExecutor {
    jobs: Arc<Mutex<VecDeque<Job>>>,
}

impl QueuedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn run_next(&self) -> bool {
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    pub fn run_latest(&self) -> bool {
        let job = self.jobs.lock().pop_back();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Executor for QueuedExecutor {
    fn spawn(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase<T> {
    Idle,
    Pending,
    Loaded(T),
    Failed(String),
    Cancelled,
}

impl<T> Phase<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Phase::Pending)
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Phase::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn loaded_mut(&mut self) -> Option<&mut T> {
        match self {
            Phase::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Phase::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

struct Completion<T> {
    request_id: u64,
    result: Result<T>,
}

struct InFlight {
    request_id: u64,
    cancel: CancelHandle,
}

pub struct Fetch<T> {
    label: &'static str,
    phase: Phase<T>,
    in_flight: Option<InFlight>,
    next_request_id: u64,
    tx: Sender<Completion<T>>,
    rx: Receiver<Completion<T>>,
}

impl<T: Send + 'static> Fetch<T> {
    pub fn new(label: &'static str) -> Self {
        let (tx, rx) = unbounded();
        Self {
            label,
            phase: Phase::Idle,
            in_flight: None,
            next_request_id: 1,
            tx,
            rx,
        }
    }

    pub fn start<F>(&mut self, executor: &dyn Executor, job: F) -> CancelHandle
    where
        F: FnOnce(&CancelHandle) -> Result<T> + Send + 'static,
    {
        self.cancel_in_flight();

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let cancel = CancelHandle::new();
        self.in_flight = Some(InFlight {
            request_id,
            cancel: cancel.clone(),
        });
        self.phase = Phase::Pending;
        tracing::debug!(label = self.label, request_id, "request started");

        let tx = self.tx.clone();
        let handle = cancel.clone();
        let label = self.label;
        executor.spawn(Box::new(move || {
            if handle.is_cancelled() {
                return;
            }
            let result = job(&handle);
            if handle.is_cancelled() {
                tracing::debug!(label, request_id, "dropping result of cancelled request");
                return;
            }
            let _ = tx.send(Completion { request_id, result });
        }));
        cancel
    }

    // Applies finished requests. Returns true when the phase changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(completion) = self.rx.try_recv() {
            let Some(current) = &self.in_flight else {
                continue;
            };
            if current.request_id != completion.request_id || current.cancel.is_cancelled() {
                continue;
            }
            self.in_flight = None;
            self.phase = match completion.result {
                Ok(value) => Phase::Loaded(value),
                Err(err) => {
                    tracing::warn!(label = self.label, error = %format!("{err:#}"), "request failed");
                    Phase::Failed(format!("{err:#}"))
                }
            };
            changed = true;
        }
        changed
    }

    pub fn cancel(&mut self) {
        if self.cancel_in_flight() && self.phase.is_pending() {
            self.phase = Phase::Cancelled;
        }
    }

    pub fn reset(&mut self) {
        self.cancel_in_flight();
        self.phase = Phase::Idle;
    }

    pub fn take_outcome(&mut self) -> Option<std::result::Result<T, String>> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Loaded(value) => Some(Ok(value)),
            Phase::Failed(reason) => Some(Err(reason)),
            other => {
                self.phase = other;
                None
            }
        }
    }

    pub fn phase(&self) -> &Phase<T> {
        &self.phase
    }

    pub fn phase_mut(&mut self) -> &mut Phase<T> {
        &mut self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.phase.is_pending()
    }
}

impl<T> Fetch<T> {
    fn cancel_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(in_flight) => {
                in_flight.cancel.cancel();
                tracing::debug!(label = self.label, request_id = in_flight.request_id, "request cancelled");
                true
            }
            None => false,
        }
    }
}

impl<T> Drop for Fetch<T> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
    }
}

pub struct Submitter<T> {
    fetch: Fetch<T>,
    submit_count: u64,
}

impl<T: Send + 'static> Submitter<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            fetch: Fetch::new(label),
            submit_count: 0,
        }
    }

    pub fn submit<F>(&mut self, executor: &dyn Executor, job: F) -> bool
    where
        F: FnOnce(&CancelHandle) -> Result<T> + Send + 'static,
    {
        if self.is_busy() {
            return false;
        }
        self.submit_count += 1;
        self.fetch.start(executor, job);
        true
    }

    pub fn poll(&mut self) -> Option<std::result::Result<T, String>> {
        self.fetch.poll();
        self.fetch.take_outcome()
    }

    pub fn is_busy(&self) -> bool {
        self.fetch.is_pending()
    }

    pub fn submit_count(&self) -> u64 {
        self.submit_count
    }

    pub fn cancel(&mut self) {
        self.fetch.cancel();
    }
}
