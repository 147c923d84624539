// Wait-for graph and deadlock detection
//
// An edge `waiter -> blocker` is recorded when `waiter` is denied a lock that
// `blocker` holds. Edges are only followed while the blocker still holds a
// conflicting lock on the page the waiter asked for, so edges left behind by a
// release never produce a phantom cycle.

use std::collections::{HashMap, HashSet};

use crate::common::types::{PageId, TransactionId};
use crate::transaction::concurrency::lock_manager::{LockMode, PageLocks};

/// The outstanding request of one blocked transaction
#[derive(Debug, Clone)]
pub struct WaitEdges {
    pub page: PageId,
    pub mode: LockMode,
    pub blockers: HashSet<TransactionId>,
}

#[derive(Debug, Default)]
pub struct WaitForGraph {
    waits: HashMap<TransactionId, WaitEdges>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `waiter`'s outgoing edges with one edge per blocker.
    /// A transaction never waits on itself.
    pub fn record_wait(
        &mut self,
        waiter: TransactionId,
        page: PageId,
        mode: LockMode,
        blockers: impl IntoIterator<Item = TransactionId>,
    ) {
        let blockers = blockers.into_iter().filter(|b| *b != waiter).collect();
        self.waits.insert(waiter, WaitEdges { page, mode, blockers });
    }

    /// Drop every outgoing edge of `waiter`
    pub fn clear_waits(&mut self, waiter: TransactionId) {
        self.waits.remove(&waiter);
    }

    pub fn waits_of(&self, waiter: TransactionId) -> Option<&WaitEdges> {
        self.waits.get(&waiter)
    }

    pub fn is_waiting(&self, waiter: TransactionId) -> bool {
        self.waits.contains_key(&waiter)
    }

    /// Blockers of `waiter` that still hold a lock conflicting with its request
    fn live_blockers(
        &self,
        waiter: TransactionId,
        pages: &HashMap<PageId, PageLocks>,
    ) -> Vec<TransactionId> {
        let Some(edges) = self.waits.get(&waiter) else {
            return Vec::new();
        };
        let Some(locks) = pages.get(&edges.page) else {
            return Vec::new();
        };

        edges
            .blockers
            .iter()
            .copied()
            .filter(|blocker| {
                locks
                    .mode_of(*blocker)
                    .is_some_and(|held| !held.is_compatible_with(edges.mode))
            })
            .collect()
    }

    /// Depth-first search from `start` over live edges.
    ///
    /// Returns true if any cycle is reachable, including a self-loop. The
    /// search is iterative and every node is expanded at most once.
    pub fn has_cycle_reachable_from(
        &self,
        start: TransactionId,
        pages: &HashMap<PageId, PageLocks>,
    ) -> bool {
        let mut finished: HashSet<TransactionId> = HashSet::new();
        let mut on_path: HashSet<TransactionId> = HashSet::new();
        let mut stack: Vec<(TransactionId, Vec<TransactionId>)> = Vec::new();

        on_path.insert(start);
        stack.push((start, self.live_blockers(start, pages)));

        loop {
            let next = match stack.last_mut() {
                Some((_, pending)) => pending.pop(),
                None => break,
            };

            match next {
                Some(next) => {
                    if on_path.contains(&next) {
                        return true;
                    }
                    if finished.contains(&next) {
                        continue;
                    }
                    on_path.insert(next);
                    stack.push((next, self.live_blockers(next, pages)));
                }
                None => {
                    if let Some((node, _)) = stack.pop() {
                        on_path.remove(&node);
                        finished.insert(node);
                    }
                }
            }
        }

        false
    }
}
