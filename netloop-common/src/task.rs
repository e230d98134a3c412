use futures::{future::poll_fn, FutureExt};
use std::{
    any::Any,
    collections::HashSet,
    future::Future,
    hash::Hash,
    panic::AssertUnwindSafe,
    task::{ready, Context, Poll},
};
use tokio::task::JoinSet;

/// The output of a keyed task: `Ok` with the task's value, or `Err` with the panic message if
/// the task panicked.
pub type TaskResult<V> = Result<V, String>;

/// A collection of keyed tasks spawned on a Tokio runtime.
///
/// At most one task per key can be in flight. Unlike a bare [`JoinSet`], the key of a task is
/// always released when it completes, even if the task panicked: panics are caught inside the
/// task and surfaced as `Err` alongside the key.
///
/// Dropping the map aborts all tasks that are still running, like [`JoinSet`] does.
#[derive(Debug)]
pub struct JoinMap<K, V> {
    keys: HashSet<K>,
    joinset: JoinSet<(K, TaskResult<V>)>,
}

impl<K, V> Default for JoinMap<K, V> {
    fn default() -> Self {
        Self { keys: HashSet::new(), joinset: JoinSet::new() }
    }
}

impl<K, V> JoinMap<K, V> {
    /// Create a new, empty `JoinMap`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tasks currently in flight.
    pub fn len(&self) -> usize {
        self.joinset.len()
    }

    /// Returns whether no task is in flight.
    pub fn is_empty(&self) -> bool {
        self.joinset.is_empty()
    }
}

impl<K, V> JoinMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Spawns `future` for `key` ONLY IF there is no task in flight for the same key.
    ///
    /// Returns `true` if the task was spawned.
    pub fn spawn<F>(&mut self, key: K, future: F) -> bool
    where
        F: Future<Output = V> + Send + 'static,
    {
        if !self.keys.insert(key.clone()) {
            return false;
        }

        self.joinset.spawn(async move {
            let output = AssertUnwindSafe(future).catch_unwind().await.map_err(panic_message);
            (key, output)
        });

        true
    }

    /// Returns `true` if a task for the given key is in flight.
    pub fn contains_key(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    /// Aborts every task in flight and forgets their keys.
    pub fn abort_all(&mut self) {
        self.joinset.abort_all();
        self.keys.clear();
    }

    /// Waits until one of the tasks completes and returns its key and output.
    ///
    /// Returns `None` if the map is empty.
    ///
    /// # Cancel Safety
    ///
    /// This method is cancel safe. If `join_next` is used as the event in a `tokio::select!`
    /// statement and some other branch completes first, it is guaranteed that no tasks were
    /// removed from this `JoinMap`.
    pub async fn join_next(&mut self) -> Option<(K, TaskResult<V>)> {
        poll_fn(|cx| self.poll_join_next(cx)).await
    }

    /// Polls for one of the tasks to complete.
    ///
    /// Tasks that were aborted through [`Self::abort_all`] are skipped silently.
    pub fn poll_join_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<(K, TaskResult<V>)>> {
        loop {
            match ready!(self.joinset.poll_join_next(cx)) {
                Some(Ok((key, output))) => {
                    self.keys.remove(&key);
                    return Poll::Ready(Some((key, output)));
                }
                // Panics are caught inside the task, so only aborted tasks end up here.
                Some(Err(_)) => continue,
                None => return Poll::Ready(None),
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked".to_string()
    }
}
