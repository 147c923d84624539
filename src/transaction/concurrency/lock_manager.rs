// Page-granularity shared/exclusive lock manager
//
// All lock state (lock records, the per-transaction index and the wait-for
// graph) lives behind one mutex, so every grant, denial and release is a
// single critical section. Blocked requests sleep on a condition variable
// owned by the page they wait for; releasing a page wakes only its waiters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::{PageId, Permissions, TransactionId};
use crate::transaction::concurrency::deadlock::WaitForGraph;

/// Lock strength. `Exclusive` subsumes `Shared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    /// Does holding `self` already cover a request for `requested`?
    pub fn satisfies(self, requested: LockMode) -> bool {
        matches!(
            (self, requested),
            (LockMode::Exclusive, _) | (LockMode::Shared, LockMode::Shared)
        )
    }

    /// May two distinct transactions hold `self` and `other` at once?
    pub fn is_compatible_with(self, other: LockMode) -> bool {
        self == LockMode::Shared && other == LockMode::Shared
    }
}

impl From<Permissions> for LockMode {
    fn from(perm: Permissions) -> Self {
        match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Outcome of a single non-blocking lock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockGrant {
    Granted,
    Denied,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Deadlock detected: {txn} aborted while waiting for page {page}")]
    Deadlock { txn: TransactionId, page: PageId },
}

/// One granted lock on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    pub holder: TransactionId,
    pub mode: LockMode,
}

/// Lock records of one page.
///
/// Either a single `Exclusive` record or any number of `Shared` records from
/// distinct transactions.
#[derive(Debug, Default, Clone)]
pub struct PageLocks {
    records: Vec<LockRecord>,
}

impl PageLocks {
    pub fn records(&self) -> &[LockRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn mode_of(&self, txn: TransactionId) -> Option<LockMode> {
        self.records
            .iter()
            .find(|record| record.holder == txn)
            .map(|record| record.mode)
    }

    pub fn holders(&self) -> impl Iterator<Item = TransactionId> + '_ {
        self.records.iter().map(|record| record.holder)
    }

    /// Record `mode` for `txn`, strengthening an existing record in place
    pub(crate) fn grant(&mut self, txn: TransactionId, mode: LockMode) {
        match self.records.iter_mut().find(|record| record.holder == txn) {
            Some(record) => {
                if !record.mode.satisfies(mode) {
                    record.mode = mode;
                }
            }
            None => self.records.push(LockRecord { holder: txn, mode }),
        }
    }

    fn remove(&mut self, txn: TransactionId) -> bool {
        let before = self.records.len();
        self.records.retain(|record| record.holder != txn);
        before != self.records.len()
    }

    /// Grant table for a request by `txn`. Only decides; never mutates.
    fn admits(&self, txn: TransactionId, mode: LockMode) -> bool {
        match self.records.as_slice() {
            [] => true,
            // sole holder: already covered, or upgrade in place
            [only] if only.holder == txn => true,
            [only] => only.mode == LockMode::Shared && mode == LockMode::Shared,
            // several records are necessarily all shared; nobody may upgrade
            _ => mode == LockMode::Shared,
        }
    }

    /// True if the records obey the shared/exclusive invariant
    pub fn is_consistent(&self) -> bool {
        let exclusive = self
            .records
            .iter()
            .filter(|record| record.mode == LockMode::Exclusive)
            .count();
        let distinct: HashSet<TransactionId> = self.holders().collect();
        distinct.len() == self.records.len()
            && (exclusive == 0 || (exclusive == 1 && self.records.len() == 1))
    }
}

#[derive(Debug, Default)]
struct LockTable {
    pages: HashMap<PageId, PageLocks>,
    held: HashMap<TransactionId, HashSet<PageId>>,
    graph: WaitForGraph,
    signals: HashMap<PageId, Arc<Condvar>>,
}

impl LockTable {
    fn try_acquire(&mut self, page: PageId, txn: TransactionId, mode: LockMode) -> LockGrant {
        let locks = self.pages.entry(page).or_default();

        if locks.admits(txn, mode) {
            locks.grant(txn, mode);
            self.held.entry(txn).or_default().insert(page);
            self.graph.clear_waits(txn);
            debug!("Granted {:?} lock on page {} to {}", mode, page, txn);
            return LockGrant::Granted;
        }

        let holders: Vec<TransactionId> = locks.holders().collect();
        self.graph.record_wait(txn, page, mode, holders);
        debug!("Denied {:?} lock on page {} to {}", mode, page, txn);
        LockGrant::Denied
    }

    fn release(&mut self, page: PageId, txn: TransactionId) {
        let Some(locks) = self.pages.get_mut(&page) else {
            return;
        };
        if !locks.remove(txn) {
            return;
        }
        if locks.is_empty() {
            self.pages.remove(&page);
        }
        if let Some(held) = self.held.get_mut(&txn) {
            held.remove(&page);
            if held.is_empty() {
                self.held.remove(&txn);
            }
        }
        if let Some(signal) = self.signals.get(&page) {
            signal.notify_all();
        }
    }

    fn signal_for(&mut self, page: PageId) -> Arc<Condvar> {
        self.signals.entry(page).or_default().clone()
    }
}

/// Lock manager shared by every transaction of one buffer pool
pub struct LockManager {
    table: Mutex<LockTable>,
    wait_interval: Duration,
}

impl LockManager {
    /// Create a lock manager whose blocked requests re-check at least every
    /// `wait_interval`
    pub fn new(wait_interval: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            wait_interval,
        }
    }

    /// Try once to lock `page` for `txn`.
    ///
    /// A denial records a wait edge from `txn` to every current holder; a
    /// grant clears all of `txn`'s wait edges.
    pub fn try_acquire(&self, page: PageId, txn: TransactionId, mode: LockMode) -> LockGrant {
        self.table.lock().try_acquire(page, txn, mode)
    }

    /// Lock `page` for `txn`, blocking until granted.
    ///
    /// After every denial the wait-for graph is searched from `txn`. If a
    /// cycle is reachable, `txn` is the victim: its wait edges are dropped and
    /// `LockError::Deadlock` is returned. Locks it already holds are kept
    /// until the caller completes the transaction.
    pub fn acquire(&self, page: PageId, txn: TransactionId, mode: LockMode) -> Result<(), LockError> {
        let mut table = self.table.lock();

        loop {
            if table.try_acquire(page, txn, mode) == LockGrant::Granted {
                return Ok(());
            }

            if table.graph.has_cycle_reachable_from(txn, &table.pages) {
                table.graph.clear_waits(txn);
                warn!("Deadlock detected, aborting {} (waiting for page {})", txn, page);
                return Err(LockError::Deadlock { txn, page });
            }

            let signal = table.signal_for(page);
            signal.wait_for(&mut table, self.wait_interval);
        }
    }

    /// Search the wait-for graph for a cycle reachable from `txn`
    pub fn has_cycle_reachable_from(&self, txn: TransactionId) -> bool {
        let table = self.table.lock();
        table.graph.has_cycle_reachable_from(txn, &table.pages)
    }

    /// Release `txn`'s lock on `page`, waking that page's waiters
    pub fn release(&self, page: PageId, txn: TransactionId) {
        self.table.lock().release(page, txn);
    }

    /// Release every lock `txn` holds and forget its wait edges
    pub fn release_all(&self, txn: TransactionId) {
        let mut table = self.table.lock();
        let pages: Vec<PageId> = table
            .held
            .get(&txn)
            .map(|held| held.iter().copied().collect())
            .unwrap_or_default();

        for page in pages {
            table.release(page, txn);
        }
        table.graph.clear_waits(txn);

        // drop wake-up channels nobody can be waiting on any more
        let LockTable { pages, signals, .. } = &mut *table;
        signals.retain(|page, signal| pages.contains_key(page) || Arc::strong_count(signal) > 1);
    }

    pub fn holds(&self, page: PageId, txn: TransactionId) -> bool {
        self.lock_mode(page, txn).is_some()
    }

    pub fn lock_mode(&self, page: PageId, txn: TransactionId) -> Option<LockMode> {
        self.table
            .lock()
            .pages
            .get(&page)
            .and_then(|locks| locks.mode_of(txn))
    }

    /// Every page `txn` holds a lock on
    pub fn held_pages(&self, txn: TransactionId) -> HashSet<PageId> {
        self.table.lock().held.get(&txn).cloned().unwrap_or_default()
    }

    /// Snapshot of the lock records of `page`
    pub fn holders(&self, page: PageId) -> Vec<LockRecord> {
        self.table
            .lock()
            .pages
            .get(&page)
            .map(|locks| locks.records().to_vec())
            .unwrap_or_default()
    }

    /// The page `txn` is blocked on and the transactions it waits for
    pub fn waiting_for(&self, txn: TransactionId) -> Option<(PageId, HashSet<TransactionId>)> {
        self.table
            .lock()
            .graph
            .waits_of(txn)
            .map(|edges| (edges.page, edges.blockers.clone()))
    }

    /// Check the shared/exclusive invariant on every locked page
    pub fn is_consistent(&self) -> bool {
        self.table.lock().pages.values().all(PageLocks::is_consistent)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn page(no: u32) -> PageId {
        PageId::new(7, no)
    }

    #[test]
    fn test_lock_mode_table() {
        assert!(LockMode::Exclusive.satisfies(LockMode::Shared));
        assert!(LockMode::Exclusive.satisfies(LockMode::Exclusive));
        assert!(LockMode::Shared.satisfies(LockMode::Shared));
        assert!(!LockMode::Shared.satisfies(LockMode::Exclusive));

        assert!(LockMode::Shared.is_compatible_with(LockMode::Shared));
        assert!(!LockMode::Shared.is_compatible_with(LockMode::Exclusive));
        assert!(!LockMode::Exclusive.is_compatible_with(LockMode::Shared));
        assert!(!LockMode::Exclusive.is_compatible_with(LockMode::Exclusive));

        assert_eq!(LockMode::from(Permissions::ReadOnly), LockMode::Shared);
        assert_eq!(LockMode::from(Permissions::ReadWrite), LockMode::Exclusive);
    }

    #[test]
    fn test_free_page_is_granted() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();

        assert_eq!(lm.try_acquire(page(1), t1, LockMode::Exclusive), LockGrant::Granted);
        assert!(lm.holds(page(1), t1));
        assert_eq!(lm.lock_mode(page(1), t1), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_sole_holder_reacquire_is_noop() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Exclusive);
        assert_eq!(lm.try_acquire(page(1), t1, LockMode::Shared), LockGrant::Granted);
        assert_eq!(lm.try_acquire(page(1), t1, LockMode::Exclusive), LockGrant::Granted);

        let holders = lm.holders(page(1));
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].mode, LockMode::Exclusive);
    }

    #[test]
    fn test_sole_shared_holder_upgrades_in_place() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Shared);
        assert_eq!(lm.try_acquire(page(1), t1, LockMode::Exclusive), LockGrant::Granted);

        let holders = lm.holders(page(1));
        assert_eq!(holders, vec![LockRecord { holder: t1, mode: LockMode::Exclusive }]);
    }

    #[test]
    fn test_exclusive_holder_blocks_everyone_else() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Exclusive);
        assert_eq!(lm.try_acquire(page(1), t2, LockMode::Shared), LockGrant::Denied);
        assert_eq!(lm.try_acquire(page(1), t2, LockMode::Exclusive), LockGrant::Denied);

        let (waited_page, blockers) = lm.waiting_for(t2).unwrap();
        assert_eq!(waited_page, page(1));
        assert_eq!(blockers, HashSet::from([t1]));
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        let t3 = TransactionId::new();

        assert_eq!(lm.try_acquire(page(1), t1, LockMode::Shared), LockGrant::Granted);
        assert_eq!(lm.try_acquire(page(1), t2, LockMode::Shared), LockGrant::Granted);
        assert_eq!(lm.try_acquire(page(1), t3, LockMode::Shared), LockGrant::Granted);
        // already a shared holder among several
        assert_eq!(lm.try_acquire(page(1), t2, LockMode::Shared), LockGrant::Granted);

        assert_eq!(lm.holders(page(1)).len(), 3);
        assert!(lm.is_consistent());
    }

    #[test]
    fn test_no_upgrade_with_other_shared_holders() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Shared);
        lm.try_acquire(page(1), t2, LockMode::Shared);

        assert_eq!(lm.try_acquire(page(1), t1, LockMode::Exclusive), LockGrant::Denied);
        assert_eq!(lm.lock_mode(page(1), t1), Some(LockMode::Shared));

        // the waiter points at the other holder only
        let (_, blockers) = lm.waiting_for(t1).unwrap();
        assert_eq!(blockers, HashSet::from([t2]));
    }

    #[test]
    fn test_exclusive_request_denied_by_single_foreign_shared() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Shared);
        assert_eq!(lm.try_acquire(page(1), t2, LockMode::Exclusive), LockGrant::Denied);
    }

    #[test]
    fn test_grant_clears_wait_edges() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Exclusive);
        lm.try_acquire(page(1), t2, LockMode::Shared);
        assert!(lm.waiting_for(t2).is_some());

        lm.release(page(1), t1);
        assert_eq!(lm.try_acquire(page(1), t2, LockMode::Shared), LockGrant::Granted);
        assert!(lm.waiting_for(t2).is_none());
    }

    #[test]
    fn test_release_and_held_pages() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Shared);
        lm.try_acquire(page(2), t1, LockMode::Exclusive);
        assert_eq!(lm.held_pages(t1), HashSet::from([page(1), page(2)]));

        lm.release(page(1), t1);
        assert!(!lm.holds(page(1), t1));
        assert!(lm.holders(page(1)).is_empty());
        assert_eq!(lm.held_pages(t1), HashSet::from([page(2)]));

        lm.release_all(t1);
        assert!(lm.held_pages(t1).is_empty());
        assert!(!lm.holds(page(2), t1));
    }

    #[test]
    fn test_release_of_unheld_page_is_harmless() {
        let lm = LockManager::default();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.try_acquire(page(1), t1, LockMode::Shared);
        lm.release(page(1), t2);
        lm.release(page(9), t1);
        assert!(lm.holds(page(1), t1));
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let lm = Arc::new(LockManager::new(Duration::from_secs(5)));
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.acquire(page(1), t1, LockMode::Exclusive).unwrap();

        let waiter = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || lm.acquire(page(1), t2, LockMode::Shared))
        };

        while lm.waiting_for(t2).is_none() {
            thread::sleep(Duration::from_millis(1));
        }
        lm.release_all(t1);

        assert!(waiter.join().unwrap().is_ok());
        assert!(lm.holds(page(1), t2));
    }

    #[test]
    fn test_deadlock_victim_is_requester() {
        let lm = Arc::new(LockManager::new(Duration::from_millis(10)));
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.acquire(page(1), t1, LockMode::Exclusive).unwrap();
        lm.acquire(page(2), t2, LockMode::Exclusive).unwrap();

        let first = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || lm.acquire(page(2), t1, LockMode::Exclusive))
        };
        while lm.waiting_for(t1).is_none() {
            thread::sleep(Duration::from_millis(1));
        }

        let err = lm.acquire(page(1), t2, LockMode::Exclusive).unwrap_err();
        assert_eq!(err, LockError::Deadlock { txn: t2, page: page(1) });
        assert!(!lm.has_cycle_reachable_from(t1));

        lm.release_all(t2);
        assert!(first.join().unwrap().is_ok());
        assert!(lm.holds(page(2), t1));
        assert!(lm.is_consistent());
    }

    #[test]
    fn test_concurrent_lockers_keep_invariant() {
        let lm = Arc::new(LockManager::new(Duration::from_millis(1)));
        let mut handles = Vec::new();

        for i in 0..8 {
            let lm = Arc::clone(&lm);
            handles.push(thread::spawn(move || {
                for round in 0..50 {
                    let txn = TransactionId::new();
                    let mode = if (i + round) % 3 == 0 { LockMode::Exclusive } else { LockMode::Shared };
                    if lm.acquire(page(round % 2), txn, mode).is_ok() {
                        assert!(lm.is_consistent());
                    }
                    lm.release_all(txn);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(lm.is_consistent());
        assert!(lm.holders(page(0)).is_empty());
        assert!(lm.holders(page(1)).is_empty());
    }
}
