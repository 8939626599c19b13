// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-lane token counters shared by producers and the streaming thread.

use sluice_core::{LoadPriority, SyncToken};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

type Lanes = [AtomicU64; LoadPriority::COUNT];

fn load(lanes: &Lanes) -> SyncToken {
    SyncToken::from_lanes([
        lanes[0].load(Ordering::Acquire),
        lanes[1].load(Ordering::Acquire),
        lanes[2].load(Ordering::Acquire),
    ])
}

/// Issued, submitted and completed counters of every lane.
///
/// `completed <= submitted <= issued` holds lane by lane. The completed and
/// submitted counters only grow, and are published under the token lock so
/// waiters never miss a wake-up.
#[derive(Debug, Default)]
pub struct TokenLedger {
    issued: Lanes,
    submitted: Lanes,
    completed: Lanes,
    lock: Mutex<()>,
    cond: Condvar,
    waiters: AtomicUsize,
}

impl TokenLedger {
    /// A ledger with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next wait index of `priority`.
    ///
    /// Callers must hold the queue lock so indices reach the queue in the
    /// order they are issued.
    pub fn next_wait_index(&self, priority: LoadPriority) -> u64 {
        self.issued[priority.index()].fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Highest index issued on every lane.
    pub fn last_issued(&self) -> SyncToken {
        load(&self.issued)
    }

    /// Highest index whose commands were submitted, on every lane.
    pub fn last_submitted(&self) -> SyncToken {
        load(&self.submitted)
    }

    /// Highest index whose commands executed, on every lane.
    pub fn last_completed(&self) -> SyncToken {
        load(&self.completed)
    }

    /// `true` once every request contributing to `token` has resolved.
    pub fn is_completed(&self, token: &SyncToken) -> bool {
        self.last_completed().covers(token)
    }

    /// `true` once every request contributing to `token` was submitted.
    pub fn is_submitted(&self, token: &SyncToken) -> bool {
        self.last_submitted().covers(token)
    }

    /// `true` when nothing issued is still outstanding.
    pub fn all_completed(&self) -> bool {
        self.last_completed().covers(&self.last_issued())
    }

    /// Raises the completed counters to `token` and wakes every waiter.
    pub fn publish_completed(&self, token: SyncToken) {
        self.publish(&self.completed, token);
    }

    /// Raises the submitted counters to `token` and wakes every waiter.
    pub fn publish_submitted(&self, token: SyncToken) {
        self.publish(&self.submitted, token);
    }

    fn publish(&self, lanes: &Lanes, token: SyncToken) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        for priority in LoadPriority::ALL {
            let value = token[priority];
            debug_assert!(
                value <= self.issued[priority.index()].load(Ordering::Acquire),
                "published {value} on {priority:?} beyond the issued counter"
            );
            lanes[priority.index()].fetch_max(value, Ordering::AcqRel);
        }
        self.cond.notify_all();
    }

    /// Blocks until `token` is completed.
    pub fn wait_completed(&self, token: &SyncToken) {
        self.wait_until(&self.completed, token);
    }

    /// Blocks until `token` is submitted.
    pub fn wait_submitted(&self, token: &SyncToken) {
        self.wait_until(&self.submitted, token);
    }

    fn wait_until(&self, lanes: &Lanes, token: &SyncToken) {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if load(lanes).covers(token) {
            return;
        }
        self.waiters.fetch_add(1, Ordering::SeqCst);
        while !load(lanes).covers(token) {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Threads currently blocked in a wait.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}
