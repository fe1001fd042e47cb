//! One-shot timer handles.
//!
//! A `TimerHandle` owns the spawned delay task and aborts it on drop,
//! so overwriting a session's timer slot (or dropping the session)
//! cancels the pending callback without extra bookkeeping. Callbacks
//! must still re-check session state at fire time: an abort that races
//! an already-started callback does not roll it back.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `callback` after `delay` unless cancelled first.
    pub fn spawn_after<F>(delay: Duration, callback: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.await;
        });
        Self { task }
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
