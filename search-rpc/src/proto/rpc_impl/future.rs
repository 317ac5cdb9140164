//! A cancellable handle to the eventual result of one unary call.
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::task::AtomicWaker;

use crate::common::scoped_task::ScopedTask;
use crate::proto::rpc_types::error::{Error, Result, TransportError};

enum State<T> {
    Pending,
    Ready(Result<T>),
    Taken,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    waker: AtomicWaker,
}

impl<T> Shared<T> {
    /// Store `result` unless the call is already resolved. Returns whether it was stored.
    fn resolve(&self, result: Result<T>) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !matches!(*state, State::Pending) {
                return false;
            }
            *state = State::Ready(result);
        }
        self.waker.wake();
        true
    }

    fn is_pending(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            State::Pending
        )
    }
}

/// Write half of a [`UnaryFuture`], owned by the task that runs the call.
///
/// Dropping it without completing resolves the future with `TransportError::Disconnected`.
pub struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
    route: String,
}

impl<T> Completer<T> {
    pub fn complete(mut self, result: Result<T>) {
        if let Some(shared) = self.shared.take() {
            if !shared.resolve(result) {
                tracing::debug!(route = %self.route, "late result discarded");
            }
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(Err(TransportError::Disconnected(format!(
                "call task for {} ended without a result",
                self.route
            ))
            .into()));
        }
    }
}

/// The eventual response of a future-style call.
///
/// Resolved exactly once: by the call, or by [`UnaryFuture::cancel`], whichever comes first.
/// Dropping an unresolved future aborts the call task.
pub struct UnaryFuture<T> {
    shared: Arc<Shared<T>>,
    task: Option<ScopedTask<()>>,
}

impl<T> std::fmt::Debug for UnaryFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnaryFuture")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T> UnaryFuture<T> {
    /// Cancel the call if it has not resolved yet.
    ///
    /// Returns `false`, and leaves the result in place, when the call had already resolved.
    pub fn cancel(&self) -> bool {
        if !self.shared.resolve(Err(Error::CallCancelled)) {
            return false;
        }
        if let Some(task) = &self.task {
            task.abort();
        }
        true
    }

    pub fn is_done(&self) -> bool {
        !self.shared.is_pending()
    }
}

impl<T: Send + 'static> UnaryFuture<T> {
    /// An unresolved future and the completer that resolves it.
    pub fn pending(route: impl Into<String>) -> (Self, Completer<T>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::Pending),
            waker: AtomicWaker::new(),
        });
        let completer = Completer {
            shared: Some(shared.clone()),
            route: route.into(),
        };
        (Self { shared, task: None }, completer)
    }

    /// A future that is already resolved with `result`.
    pub fn ready(result: Result<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Ready(result)),
                waker: AtomicWaker::new(),
            }),
            task: None,
        }
    }

    /// Run `call` on `runtime` and resolve the future with its outcome.
    pub fn spawn<F>(runtime: &tokio::runtime::Handle, route: impl Into<String>, call: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (mut fut, completer) = Self::pending(route);
        let task = runtime.spawn(async move {
            completer.complete(call.await);
        });
        fut.task = Some(task.into());
        fut
    }

    /// Block the calling thread until the call resolves.
    ///
    /// From inside a tokio runtime this fails with `TransportError::BlockingInRuntime` and the
    /// call is dropped.
    pub fn wait(self) -> Result<T> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(TransportError::BlockingInRuntime.into());
        }
        futures::executor::block_on(self)
    }
}

impl<T> Future for UnaryFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.shared.waker.register(cx.waker());
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        match std::mem::replace(&mut *state, State::Taken) {
            State::Ready(result) => Poll::Ready(result),
            State::Pending => {
                *state = State::Pending;
                Poll::Pending
            }
            State::Taken => panic!("UnaryFuture polled after completion"),
        }
    }
}
