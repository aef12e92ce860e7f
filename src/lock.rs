use crate::path::S3Path;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

struct Waiter {
    id: u64,
    access: Access,
    waker: Option<Waker>,
}

#[derive(Default)]
struct LockState {
    queue: VecDeque<Waiter>,
    granted: HashSet<u64>,
    reads_held: usize,
    write_held: bool,
    next_id: u64,
}

/// A fair async reader/writer lock.
///
/// Grants strictly in arrival order: a reader that queues behind a waiting
/// writer waits for that writer, and a writer queues behind earlier
/// readers. This is unlike write-preferring locks, which can starve
/// readers under a steady stream of writers (and vice versa for
/// read-preferring ones).
pub(crate) struct FairRwLock {
    state: Mutex<LockState>,
}

impl FairRwLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
        }
    }

    /// The returned future resolves to an owned guard; the `Arc` keeps the
    /// lock (and its entry in the path map) alive while either is held.
    pub fn read(self: Arc<Self>) -> Acquire {
        Acquire::new(self, Access::Read)
    }

    pub fn write(self: Arc<Self>) -> Acquire {
        Acquire::new(self, Access::Write)
    }

    /// Re-applies the grant rule to the head of the queue: drain every
    /// contiguous reader, then, with nothing held, a single writer.
    fn resolve(state: &mut LockState) {
        if !state.write_held {
            while matches!(state.queue.front(), Some(w) if w.access == Access::Read) {
                let mut waiter = state.queue.pop_front().expect("front was just matched");
                state.reads_held += 1;
                state.granted.insert(waiter.id);
                if let Some(waker) = waiter.waker.take() {
                    waker.wake();
                }
            }
        }

        if !state.write_held && state.reads_held == 0 {
            if matches!(state.queue.front(), Some(w) if w.access == Access::Write) {
                let mut waiter = state.queue.pop_front().expect("front was just matched");
                state.write_held = true;
                state.granted.insert(waiter.id);
                if let Some(waker) = waiter.waker.take() {
                    waker.wake();
                }
            }
        }
    }

    fn release(state: &mut LockState, access: Access) {
        match access {
            Access::Read => state.reads_held -= 1,
            Access::Write => state.write_held = false,
        }
    }
}

pub(crate) struct Acquire {
    lock: Arc<FairRwLock>,
    access: Access,
    id: Option<u64>,
    done: bool,
}

impl Acquire {
    fn new(lock: Arc<FairRwLock>, access: Access) -> Self {
        Self {
            lock,
            access,
            id: None,
            done: false,
        }
    }
}

impl Future for Acquire {
    type Output = RwLockGuard;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut state = this.lock.state.lock().expect("lock state poisoned");

        let id = match this.id {
            Some(id) => id,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                this.id = Some(id);
                state.queue.push_back(Waiter {
                    id,
                    access: this.access,
                    waker: Some(cx.waker().clone()),
                });
                FairRwLock::resolve(&mut state);
                id
            }
        };

        if state.granted.remove(&id) {
            this.done = true;
            Poll::Ready(RwLockGuard {
                lock: this.lock.clone(),
                access: this.access,
            })
        } else {
            if let Some(waiter) = state.queue.iter_mut().find(|w| w.id == id) {
                waiter.waker = Some(cx.waker().clone());
            }
            Poll::Pending
        }
    }
}

// Dropping a pending acquisition removes it from the queue so that a
// cancelled waiter at the head cannot block its successors. If the grant
// raced the cancellation, the grant is undone as a release.
impl Drop for Acquire {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Some(id) = self.id else {
            return;
        };
        let mut state = self.lock.state.lock().expect("lock state poisoned");
        if state.granted.remove(&id) {
            FairRwLock::release(&mut state, self.access);
            FairRwLock::resolve(&mut state);
        } else if let Some(pos) = state.queue.iter().position(|w| w.id == id) {
            let _ = state.queue.remove(pos);
            FairRwLock::resolve(&mut state);
        }
    }
}

pub(crate) struct RwLockGuard {
    lock: Arc<FairRwLock>,
    access: Access,
}

impl Drop for RwLockGuard {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().expect("lock state poisoned");
        FairRwLock::release(&mut state, self.access);
        FairRwLock::resolve(&mut state);
    }
}

/// Serializes mutating operations on the path tree.
///
/// Every caller that writes `p` also read-locks each ancestor of `p`, so a
/// mutation of an ancestor directory can never interleave with mutations
/// below it. Acquisition follows one global order (shallow paths first,
/// then lexicographic), which makes cycles impossible.
#[derive(Clone, Default)]
pub struct PathLock {
    locks: Arc<Mutex<HashMap<String, Weak<FairRwLock>>>>,
}

impl PathLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires write locks on `write_to` and read locks on `read_from`
    /// plus every ancestor of both. Held until the returned guard drops.
    pub async fn lock(&self, write_to: &[S3Path], read_from: &[S3Path]) -> PathLockGuard {
        let mut guards = Vec::new();
        for (path, access) in lock_plan(write_to, read_from) {
            let lock = self.lock_for(path.as_key());
            let guard = match access {
                Access::Read => lock.read().await,
                Access::Write => lock.write().await,
            };
            guards.push(guard);
        }
        PathLockGuard { _guards: guards }
    }

    /// One live lock instance per path; entries whose scopes have all gone
    /// are reaped on the way through.
    fn lock_for(&self, key: &str) -> Arc<FairRwLock> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.retain(|_, weak| weak.strong_count() > 0);
        match locks.get(key).and_then(Weak::upgrade) {
            Some(lock) => lock,
            None => {
                let lock = Arc::new(FairRwLock::new());
                locks.insert(key.to_string(), Arc::downgrade(&lock));
                lock
            }
        }
    }
}

/// The combined (path, mode) set for one `lock` call, in acquisition
/// order: write targets in write mode, ancestors and read targets in read
/// mode, sorted shallow-first then lexicographically. Any two callers
/// produce the same order for overlapping sets.
fn lock_plan(write_to: &[S3Path], read_from: &[S3Path]) -> Vec<(S3Path, Access)> {
    let writable: BTreeSet<S3Path> = write_to.iter().cloned().collect();

    let mut readable: BTreeSet<S3Path> = BTreeSet::new();
    for path in write_to.iter().chain(read_from.iter()) {
        readable.extend(path.ancestors());
    }
    readable.extend(read_from.iter().cloned());

    let read_entries: Vec<(S3Path, Access)> = readable
        .into_iter()
        .filter(|path| !writable.contains(path))
        .map(|path| (path, Access::Read))
        .collect();
    let mut entries: Vec<(S3Path, Access)> = read_entries
        .into_iter()
        .chain(writable.into_iter().map(|path| (path, Access::Write)))
        .collect();
    entries.sort_by(|(a, _), (b, _)| {
        (a.depth(), a.as_key()).cmp(&(b.depth(), b.as_key()))
    });
    entries
}

pub struct PathLockGuard {
    _guards: Vec<RwLockGuard>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use pretty_assertions::assert_eq;

    fn paths(raw: &[&str]) -> Vec<S3Path> {
        raw.iter().map(S3Path::new).collect()
    }

    #[tokio::test]
    async fn test_readers_share() {
        let lock = Arc::new(FairRwLock::new());
        let mut r1 = lock.clone().read();
        let mut r2 = lock.clone().read();
        let g1 = (&mut r1).now_or_never().expect("uncontended read");
        let g2 = (&mut r2).now_or_never().expect("shared read");
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn test_writer_is_exclusive() {
        let lock = Arc::new(FairRwLock::new());
        let mut w1 = lock.clone().write();
        let g = (&mut w1).now_or_never().expect("uncontended write");

        let mut w2 = lock.clone().write();
        let mut r = lock.clone().read();
        assert!((&mut w2).now_or_never().is_none());
        assert!((&mut r).now_or_never().is_none());

        drop(g);
        (&mut w2).now_or_never().expect("write after release");
    }

    #[tokio::test]
    async fn test_fifo_in_both_directions() {
        let lock = Arc::new(FairRwLock::new());

        let mut r1 = lock.clone().read();
        let g1 = (&mut r1).now_or_never().expect("uncontended read");

        // writer queues behind the held read
        let mut w = lock.clone().write();
        assert!((&mut w).now_or_never().is_none());

        // a reader arriving after the waiting writer must not jump it
        let mut r2 = lock.clone().read();
        assert!((&mut r2).now_or_never().is_none());

        drop(g1);
        let gw = (&mut w).now_or_never().expect("writer next in line");
        assert!((&mut r2).now_or_never().is_none());

        drop(gw);
        (&mut r2).now_or_never().expect("reader after writer");
    }

    #[tokio::test]
    async fn test_contiguous_readers_drain_together() {
        let lock = Arc::new(FairRwLock::new());
        let mut w = lock.clone().write();
        let gw = (&mut w).now_or_never().expect("uncontended write");

        let mut r1 = lock.clone().read();
        let mut r2 = lock.clone().read();
        assert!((&mut r1).now_or_never().is_none());
        assert!((&mut r2).now_or_never().is_none());

        drop(gw);
        (&mut r1).now_or_never().expect("first queued reader");
        (&mut r2).now_or_never().expect("second queued reader");
    }

    #[tokio::test]
    async fn test_cancelled_waiter_unblocks_successors() {
        let lock = Arc::new(FairRwLock::new());
        let mut r1 = lock.clone().read();
        let g1 = (&mut r1).now_or_never().expect("uncontended read");

        let mut w = lock.clone().write();
        assert!((&mut w).now_or_never().is_none());
        let mut r2 = lock.clone().read();
        assert!((&mut r2).now_or_never().is_none());

        // cancel the queued writer; the reader behind it may now share
        drop(w);
        (&mut r2).now_or_never().expect("reader after cancelled writer");
        drop(g1);
    }

    #[tokio::test]
    async fn test_path_lock_blocks_ancestor_writes() {
        let path_lock = PathLock::new();
        let held = path_lock.lock(&paths(&["a/b"]), &[]).await;

        // writing the parent needs its write lock, which the child's
        // ancestor read lock blocks
        let parent_paths = paths(&["a"]);
        let mut fut = Box::pin(path_lock.lock(&parent_paths, &[]));
        assert!(fut.as_mut().now_or_never().is_none());

        drop(held);
        fut.as_mut().now_or_never().expect("parent write after child");
    }

    #[tokio::test]
    async fn test_path_lock_allows_sibling_writes() {
        let path_lock = PathLock::new();
        let _held = path_lock.lock(&paths(&["a/b"]), &[]).await;
        let sibling_paths = paths(&["a/c"]);
        let mut fut = Box::pin(path_lock.lock(&sibling_paths, &[]));
        fut.as_mut().now_or_never().expect("siblings do not conflict");
    }

    #[tokio::test]
    async fn test_lock_map_reaps_unused_entries() {
        let path_lock = PathLock::new();
        let guard = path_lock.lock(&paths(&["a/b"]), &[]).await;
        assert_eq!(path_lock.locks.lock().unwrap().len(), 3); // ., a, a/b

        drop(guard);
        // next acquisition purges the dead entries
        let _other = path_lock.lock(&paths(&["z"]), &[]).await;
        let live: Vec<String> = path_lock.locks.lock().unwrap().keys().cloned().collect();
        assert!(live.iter().all(|k| k.is_empty() || k == "z"));
    }

    #[test]
    fn test_lock_plan_order_is_total() {
        let plan = lock_plan(&paths(&["a/b/c", "a/x"]), &paths(&["b"]));
        let rendered: Vec<(String, Access)> = plan
            .iter()
            .map(|(p, a)| (p.as_key().to_string(), *a))
            .collect();
        assert_eq!(
            rendered,
            vec![
                (String::new(), Access::Read),
                ("a".to_string(), Access::Read),
                ("b".to_string(), Access::Read),
                ("a/b".to_string(), Access::Read),
                ("a/x".to_string(), Access::Write),
                ("a/b/c".to_string(), Access::Write),
            ]
        );

        // same set, different argument order: same sequence
        let swapped = lock_plan(&paths(&["a/x", "a/b/c"]), &paths(&["b"]));
        let rendered_swapped: Vec<(String, Access)> = swapped
            .iter()
            .map(|(p, a)| (p.as_key().to_string(), *a))
            .collect();
        assert_eq!(rendered, rendered_swapped);
    }

    #[test]
    fn test_lock_plan_write_wins_over_read() {
        let plan = lock_plan(&paths(&["a"]), &paths(&["a"]));
        assert_eq!(plan.len(), 2); // root read + a write
        assert_eq!(plan[1].1, Access::Write);
    }
}
