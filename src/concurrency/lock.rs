//! Page-level shared/exclusive locks for strict two-phase locking.
//!
//! There is no wait-for graph. A request that cannot be granted waits until a release
//! wakes it or its deadline passes; the buffer pool turns a missed deadline into a
//! transaction abort, which is how deadlocks get broken.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// Access level requested when fetching a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

impl Permissions {
    pub fn lock_mode(&self) -> LockMode {
        match self {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    /// Shared holders per page. Never stores an empty set.
    shared: HashMap<PageId, HashSet<TransactionId>>,
    exclusive: HashMap<PageId, TransactionId>,
    /// Reverse index used by `release_all`.
    held: HashMap<TransactionId, HashSet<PageId>>,
}

impl LockTable {
    fn mode_held(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        if self.exclusive.get(&pid) == Some(&tid) {
            Some(LockMode::Exclusive)
        } else if self.shared.get(&pid).is_some_and(|s| s.contains(&tid)) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    fn modes_held_by_others(
        &self,
        tid: TransactionId,
        pid: PageId,
    ) -> impl Iterator<Item = LockMode> + '_ {
        let exclusive = self
            .exclusive
            .get(&pid)
            .filter(|&&holder| holder != tid)
            .map(|_| LockMode::Exclusive);
        let shared = self
            .shared
            .get(&pid)
            .into_iter()
            .flatten()
            .filter(move |&&holder| holder != tid)
            .map(|_| LockMode::Shared);
        exclusive.into_iter().chain(shared)
    }

    fn try_grant(&mut self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        match (self.mode_held(tid, pid), mode) {
            (Some(LockMode::Exclusive), _) | (Some(LockMode::Shared), LockMode::Shared) => {
                return true;
            }
            _ => {}
        }

        // A sole reader asking for exclusive access sees no conflicts and is upgraded.
        if self
            .modes_held_by_others(tid, pid)
            .any(|held| !mode.is_compatible_with(&held))
        {
            return false;
        }
        match mode {
            LockMode::Shared => {
                self.shared.entry(pid).or_default().insert(tid);
            }
            LockMode::Exclusive => {
                self.shared.remove(&pid);
                self.exclusive.insert(pid, tid);
            }
        }
        self.held.entry(tid).or_default().insert(pid);
        true
    }

    fn release(&mut self, tid: TransactionId, pid: PageId) -> bool {
        let mut released = false;
        if let Some(holders) = self.shared.get_mut(&pid) {
            released |= holders.remove(&tid);
            if holders.is_empty() {
                self.shared.remove(&pid);
            }
        }
        if self.exclusive.get(&pid) == Some(&tid) {
            self.exclusive.remove(&pid);
            released = true;
        }
        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        released
    }
}

/// Tracks which transactions hold which page locks.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to take `mode` on `pid` for `tid` without waiting.
    ///
    /// Re-requesting a lock already covered by one held is always granted; a shared
    /// holder that is the only one on the page is upgraded in place.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let granted = self.table.lock().try_grant(tid, pid, mode);
        trace!("{} {:?} lock on {}: granted={}", tid, mode, pid, granted);
        granted
    }

    /// Like [`acquire`](Self::acquire) but waits up to `timeout` for conflicting
    /// holders to release. Returns false if the lock was still unavailable.
    pub fn acquire_timeout(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();
        loop {
            if table.try_grant(tid, pid, mode) {
                trace!("{} {:?} lock on {} granted", tid, mode, pid);
                return true;
            }
            if self.released.wait_until(&mut table, deadline).timed_out() {
                // One last attempt: a release may have raced with the timeout.
                let granted = table.try_grant(tid, pid, mode);
                trace!("{} {:?} lock on {} timed out: granted={}", tid, mode, pid, granted);
                return granted;
            }
        }
    }

    /// Drops whatever lock `tid` holds on `pid`. Idempotent.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let released = self.table.lock().release(tid, pid);
        if released {
            self.released.notify_all();
        }
    }

    /// Drops every lock held by `tid`.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        let pages = table.held.remove(&tid).unwrap_or_default();
        for pid in &pages {
            table.release(tid, *pid);
        }
        drop(table);
        if !pages.is_empty() {
            trace!("{} released {} locks", tid, pages.len());
            self.released.notify_all();
        }
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_mode(tid, pid).is_some()
    }

    pub fn lock_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        self.table.lock().mode_held(tid, pid)
    }

    /// Pages on which `tid` currently holds any lock.
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<PageId> = table
            .held
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}
