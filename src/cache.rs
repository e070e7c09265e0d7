//! C7 Image Buffer Cache: a keyed singleflight cache with at-most-one
//! concurrent build per key, LRU eviction under a soft byte budget, and
//! refcounted entries. Implemented as an arena of slots indexed by
//! integer handle (Design Notes: "re-express as arena-allocated nodes
//! indexed by integer handle") with an intrusive doubly-linked LRU list
//! over those handles, rather than pointers. Entries hold no reference
//! back to the cache; a waiter re-acquires the cache mutex to observe
//! state transitions (Design Notes' cycle-breaking rule).

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{MlvError, Result};

const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Building,
    Ready,
    Failed,
}

struct Slot {
    key: PathBuf,
    state: EntryState,
    buffer: Option<Arc<CachedBuffer>>,
    size: u64,
    refcount: u32,
    prev: usize,
    next: usize,
}

/// What a successful build produces: a DNG header plus image bytes,
/// addressed as one contiguous logical file by the cache's callers.
#[derive(Debug)]
pub struct CachedBuffer {
    pub header: Vec<u8>,
    pub image: Vec<u8>,
}

impl CachedBuffer {
    pub fn total_len(&self) -> u64 {
        (self.header.len() + self.image.len()) as u64
    }
}

struct Inner {
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    index: HashMap<PathBuf, usize>,
    lru_head: usize,
    lru_tail: usize,
    total_bytes: u64,
    budget_bytes: u64,
    build_count: u64,
}

impl Inner {
    fn unlink(&mut self, handle: usize) {
        let (prev, next) = (self.slots[handle].prev, self.slots[handle].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.lru_head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.lru_tail = prev;
        }
        self.slots[handle].prev = NIL;
        self.slots[handle].next = NIL;
    }

    fn push_front(&mut self, handle: usize) {
        self.slots[handle].prev = NIL;
        self.slots[handle].next = self.lru_head;
        if self.lru_head != NIL {
            self.slots[self.lru_head].prev = handle;
        }
        self.lru_head = handle;
        if self.lru_tail == NIL {
            self.lru_tail = handle;
        }
    }

    fn touch(&mut self, handle: usize) {
        self.unlink(handle);
        self.push_front(handle);
    }

    /// Frees `Ready` entries with `refcount == 0`, oldest first, until
    /// `total_bytes` is back within `budget_bytes` or nothing more can
    /// be evicted. A `Building` entry is never a candidate.
    fn evict_to_budget(&mut self) {
        let mut cursor = self.lru_tail;
        while self.total_bytes > self.budget_bytes && cursor != NIL {
            let handle = cursor;
            cursor = self.slots[handle].prev;
            if self.slots[handle].state == EntryState::Ready && self.slots[handle].refcount == 0 {
                self.remove_slot(handle);
            }
        }
    }

    fn remove_slot(&mut self, handle: usize) {
        self.unlink(handle);
        self.total_bytes = self.total_bytes.saturating_sub(self.slots[handle].size);
        self.index.remove(&self.slots[handle].key);
        self.slots[handle].buffer = None;
        self.free_list.push(handle);
    }
}

/// The image buffer cache. One instance per mounted path tree is the
/// expected usage; it is `Send + Sync` and safe under parallel
/// invocation from any number of worker threads.
pub struct Cache {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Cache {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                free_list: Vec::new(),
                index: HashMap::new(),
                lru_head: NIL,
                lru_tail: NIL,
                total_bytes: 0,
                budget_bytes,
                build_count: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    #[cfg(test)]
    fn build_count(&self) -> u64 {
        self.inner.lock().build_count
    }

    /// Gets the cached buffer for `key`, building it with `builder` on
    /// a miss. At most one concurrent call per key actually invokes
    /// `builder`; concurrent callers for the same key block on the
    /// cache condition variable until the build finishes or fails.
    pub fn get_or_build<F>(&self, key: &PathBuf, builder: F) -> Result<(Arc<CachedBuffer>, bool)>
    where
        F: FnOnce() -> Result<CachedBuffer>,
    {
        let mut guard = self.inner.lock();

        loop {
            if let Some(&handle) = guard.index.get(key) {
                match guard.slots[handle].state {
                    EntryState::Ready => {
                        guard.slots[handle].refcount += 1;
                        guard.touch(handle);
                        let buf = guard.slots[handle].buffer.clone().expect("ready entry has a buffer");
                        return Ok((buf, false));
                    }
                    EntryState::Building => {
                        self.condvar.wait(&mut guard);
                        continue;
                    }
                    EntryState::Failed => {
                        // Failed entries are removed by the failing
                        // builder before releasing the lock; seeing one
                        // here would mean a bug elsewhere. Treat
                        // defensively as a miss.
                        guard.remove_slot(handle);
                    }
                }
            }

            // Insert a Building placeholder before releasing the lock.
            let handle = if let Some(h) = guard.free_list.pop() {
                guard.slots[h] = Slot {
                    key: key.clone(),
                    state: EntryState::Building,
                    buffer: None,
                    size: 0,
                    refcount: 0,
                    prev: NIL,
                    next: NIL,
                };
                h
            } else {
                guard.slots.push(Slot {
                    key: key.clone(),
                    state: EntryState::Building,
                    buffer: None,
                    size: 0,
                    refcount: 0,
                    prev: NIL,
                    next: NIL,
                });
                guard.slots.len() - 1
            };
            guard.index.insert(key.clone(), handle);
            guard.build_count += 1;
            drop(guard);

            let built = builder();

            guard = self.inner.lock();
            match built {
                Ok(buffer) => {
                    let size = buffer.total_len();
                    guard.slots[handle].buffer = Some(Arc::new(buffer));
                    guard.slots[handle].state = EntryState::Ready;
                    guard.slots[handle].size = size;
                    guard.slots[handle].refcount = 1;
                    guard.total_bytes += size;
                    guard.push_front(handle);
                    guard.evict_to_budget();

                    if guard.total_bytes > guard.budget_bytes {
                        guard.remove_slot(handle);
                        self.condvar.notify_all();
                        return Err(out_of_memory(key));
                    }

                    let buf = guard.slots[handle].buffer.clone().unwrap();
                    self.condvar.notify_all();
                    return Ok((buf, true));
                }
                Err(e) => {
                    guard.remove_slot(handle);
                    self.condvar.notify_all();
                    return Err(e);
                }
            }
        }
    }

    /// Signals that a caller released its handle on `key`; decrements
    /// the refcount and, if it reaches zero while the cache is over
    /// budget, evicts eagerly.
    pub fn release(&self, key: &PathBuf) {
        let mut guard = self.inner.lock();
        if let Some(&handle) = guard.index.get(key) {
            if guard.slots[handle].refcount > 0 {
                guard.slots[handle].refcount -= 1;
            }
            if guard.total_bytes > guard.budget_bytes {
                guard.evict_to_budget();
            }
        }
    }

    pub fn current_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }
}

/// Returned when a build cannot proceed because the cache has nothing
/// left to evict and is still over budget.
pub fn out_of_memory(key: &PathBuf) -> MlvError {
    MlvError::OutOfMemory(format!("no evictable entries for {}", key.display()))
}
