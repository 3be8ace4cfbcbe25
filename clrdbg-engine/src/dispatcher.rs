// Engine dispatcher
//
// One dedicated thread owns the engine state. Native callbacks and commands share a
// single FIFO queue, and each one runs to completion before the next is admitted.
// Other threads marshal work onto it; nothing touches the state from outside.

use crate::callbacks::DebugCallback;
use crate::status::{EngineError, EngineResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// State owned by the dispatcher thread
pub trait DispatchTarget: 'static {
    fn handle_callback(&mut self, callback: DebugCallback);
}

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Command(Job<S>),
    Callback(DebugCallback),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatcherState {
    Idle,
    Executing,
    Closed,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DispatcherState::Idle,
            1 => DispatcherState::Executing,
            _ => DispatcherState::Closed,
        }
    }
}

#[derive(Debug)]
struct Shared {
    owner: OnceLock<thread::ThreadId>,
    state: AtomicU8,
}

/// Identity of the dispatcher thread, for access checks
#[derive(Debug, Clone)]
pub struct ThreadAffinity {
    shared: Arc<Shared>,
}

impl ThreadAffinity {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                owner: OnceLock::new(),
                state: AtomicU8::new(DispatcherState::Idle as u8),
            }),
        }
    }

    fn claim(&self, owner: thread::ThreadId) {
        let _ = self.shared.owner.set(owner);
    }

    fn set_state(&self, state: DispatcherState) {
        self.shared.state.store(state as u8, Ordering::SeqCst);
    }

    /// true on the dispatcher thread
    pub fn check_access(&self) -> bool {
        self.shared.owner.get() == Some(&thread::current().id())
    }

    /// Panics unless called on the dispatcher thread. Calling engine operations from
    /// any other thread is a programming error, not a recoverable condition.
    #[track_caller]
    pub fn verify_access(&self) {
        if !self.check_access() {
            panic!(
                "Dispatcher access violation: called from {:?}, dispatcher thread is {:?}",
                thread::current().id(),
                self.shared.owner.get()
            );
        }
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }
}

/// Cloneable handle for marshaling work onto the dispatcher thread
pub struct DispatcherHandle<S> {
    tx: mpsc::Sender<Message<S>>,
    affinity: ThreadAffinity,
}

impl<S> Clone for DispatcherHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            affinity: self.affinity.clone(),
        }
    }
}

impl<S: DispatchTarget> DispatcherHandle<S> {
    pub fn affinity(&self) -> &ThreadAffinity {
        &self.affinity
    }

    pub fn check_access(&self) -> bool {
        self.affinity.check_access()
    }

    #[track_caller]
    pub fn verify_access(&self) {
        self.affinity.verify_access()
    }

    pub fn state(&self) -> DispatcherState {
        self.affinity.state()
    }

    /// Run `f` on the dispatcher thread and block until it completes.
    ///
    /// Must not be called on the dispatcher thread itself (it would wait on its own
    /// queue) or from inside an async runtime; use `invoke_async` there.
    #[track_caller]
    pub fn invoke<R, F>(&self, f: F) -> EngineResult<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        assert!(
            !self.check_access(),
            "Blocking dispatch from the dispatcher thread would deadlock"
        );
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |state| {
            reply_tx.send(f(state)).ok();
        });

        self.tx
            .blocking_send(Message::Command(job))
            .map_err(|_| EngineError::DispatcherClosed)?;

        reply_rx
            .blocking_recv()
            .map_err(|_| EngineError::DispatcherClosed)
    }

    /// Like `invoke`, but skipped if `token` is cancelled by the time the command is
    /// admitted. `f` receives the token to check between its own steps.
    pub fn invoke_cancellable<R, F>(&self, token: &CancellationToken, f: F) -> EngineResult<R>
    where
        F: FnOnce(&mut S, &CancellationToken) -> EngineResult<R> + Send + 'static,
        R: Send + 'static,
    {
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let token = token.clone();
        self.invoke(move |state| {
            if token.is_cancelled() {
                debug!("Command cancelled before admission");
                return Err(EngineError::Cancelled);
            }
            f(state, &token)
        })?
    }

    /// Run `f` on the dispatcher thread without blocking the calling task
    pub async fn invoke_async<R, F>(&self, f: F) -> EngineResult<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |state| {
            reply_tx.send(f(state)).ok();
        });

        self.tx
            .send(Message::Command(job))
            .await
            .map_err(|_| EngineError::DispatcherClosed)?;

        reply_rx.await.map_err(|_| EngineError::DispatcherClosed)
    }

    /// Queue a native callback. Called from the native callback thread; blocks while
    /// the queue is full.
    pub fn post_callback(&self, callback: DebugCallback) -> EngineResult<()> {
        debug!("Posting callback {}", callback.kind());
        self.tx
            .blocking_send(Message::Callback(callback))
            .map_err(|_| EngineError::DispatcherClosed)
    }
}

/// Owner of the dispatcher thread. Dropping it shuts the thread down.
pub struct Dispatcher<S> {
    handle: DispatcherHandle<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: DispatchTarget> Dispatcher<S> {
    /// Spawn the dispatcher thread. `init` builds the state on that thread.
    pub fn start<F>(name: &str, capacity: usize, init: F) -> EngineResult<Self>
    where
        F: FnOnce(ThreadAffinity) -> S + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let affinity = ThreadAffinity::new();

        let thread_affinity = affinity.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                thread_affinity.claim(thread::current().id());
                let state = init(thread_affinity.clone());
                run(state, rx, thread_affinity);
            })?;
        affinity.claim(thread.thread().id());

        Ok(Self {
            handle: DispatcherHandle { tx, affinity },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> DispatcherHandle<S> {
        self.handle.clone()
    }

    /// Drain everything queued so far, stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop(true);
    }

    fn stop(&mut self, wait_for_queue: bool) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let sent = if wait_for_queue {
            self.handle.tx.blocking_send(Message::Shutdown).is_ok()
        } else {
            self.handle.tx.try_send(Message::Shutdown).is_ok()
        };
        if !sent && self.handle.state() != DispatcherState::Closed {
            warn!("Could not queue dispatcher shutdown; detaching thread");
            return;
        }
        if thread.join().is_err() {
            error!("Dispatcher thread panicked");
        }
    }
}

impl<S> std::ops::Deref for Dispatcher<S> {
    type Target = DispatcherHandle<S>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<S> Drop for Dispatcher<S> {
    fn drop(&mut self) {
        // May run inside an async runtime, so never block on the queue here
        if let Some(thread) = self.thread.take() {
            if self.handle.tx.try_send(Message::Shutdown).is_ok() {
                thread.join().ok();
            } else {
                warn!("Could not queue dispatcher shutdown; detaching thread");
            }
        }
    }
}

// Marks the dispatcher closed however `run` exits, including a panicking job
struct ClosedOnExit(ThreadAffinity);

impl Drop for ClosedOnExit {
    fn drop(&mut self) {
        self.0.set_state(DispatcherState::Closed);
    }
}

fn run<S: DispatchTarget>(mut state: S, mut rx: mpsc::Receiver<Message<S>>, affinity: ThreadAffinity) {
    let _closed = ClosedOnExit(affinity.clone());
    info!("Engine dispatcher started");

    while let Some(message) = rx.blocking_recv() {
        affinity.set_state(DispatcherState::Executing);
        match message {
            Message::Command(job) => job(&mut state),
            Message::Callback(callback) => state.handle_callback(callback),
            Message::Shutdown => break,
        }
        affinity.set_state(DispatcherState::Idle);
    }

    rx.close();
    drop(state);
    info!("Engine dispatcher shutting down");
}
