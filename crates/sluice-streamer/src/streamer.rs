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

//! The streaming thread: rotates resource sets, drains the request queues
//! and publishes token progress.

use crate::copy_engine::CopyEngine;
use crate::handlers::{dispatch, UploadContext};
use crate::ledger::TokenLedger;
use crate::queue::RequestQueue;
use crate::request::{QueuedRequest, UploadResult};
use crate::stats::{DispatchRecord, StreamerStats};
use sluice_core::device::{DeviceCapabilities, FenceId, GraphicsDevice, ResourceError};
use sluice_core::{LoadPriority, LoaderConfig, SyncToken};
use sluice_io::ContainerRegistry;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Producer-visible queue state, guarded by the queue lock.
#[derive(Debug)]
pub(crate) struct QueueState {
    pub requests: RequestQueue,
    /// A producer waits on a token and wants the loop to run once more.
    pub wake_requested: bool,
    pub running: bool,
}

/// State shared between the loader handle and the streaming thread.
#[derive(Debug)]
pub(crate) struct Shared {
    pub device: Arc<dyn GraphicsDevice>,
    pub config: LoaderConfig,
    pub caps: DeviceCapabilities,
    pub queue: Mutex<QueueState>,
    pub queue_cond: Condvar,
    pub ledger: TokenLedger,
    pub stats: Mutex<StreamerStats>,
    pub last_fences: Mutex<Vec<Option<FenceId>>>,
}

impl Shared {
    pub fn new(device: Arc<dyn GraphicsDevice>, config: LoaderConfig) -> Self {
        let caps = device.capabilities();
        let node_count = caps.node_count.max(1);
        Self {
            device,
            config,
            caps,
            queue: Mutex::new(QueueState {
                requests: RequestQueue::new(node_count),
                wake_requested: false,
                running: true,
            }),
            queue_cond: Condvar::new(),
            ledger: TokenLedger::new(),
            stats: Mutex::new(StreamerStats::default()),
            last_fences: Mutex::new(vec![None; node_count as usize]),
        }
    }

    pub fn node_count(&self) -> u32 {
        self.caps.node_count.max(1)
    }

    pub fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lock_stats(&self) -> MutexGuard<'_, StreamerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks the loop to run at least once more.
    pub fn request_wake(&self) {
        let mut queue = self.lock_queue();
        queue.wake_requested = true;
        self.queue_cond.notify_one();
    }
}

/// The loop body. Owned by the streaming thread, or by the loader itself
/// in single-threaded mode.
#[derive(Debug)]
pub(crate) struct StreamerLoop {
    shared: Arc<Shared>,
    engines: Vec<CopyEngine>,
    containers: ContainerRegistry,
    next_set: usize,
    /// Highest token recorded into each resource set.
    token_states: Vec<SyncToken>,
    rotation: u64,
}

impl StreamerLoop {
    /// Creates one copy engine per device node.
    pub fn new(shared: Arc<Shared>, containers: ContainerRegistry) -> Result<Self, ResourceError> {
        let mut engines: Vec<CopyEngine> = Vec::with_capacity(shared.node_count() as usize);
        for node in 0..shared.node_count() {
            match CopyEngine::new(&*shared.device, node, &shared.config) {
                Ok(engine) => engines.push(engine),
                Err(e) => {
                    for engine in engines {
                        engine.destroy(&*shared.device);
                    }
                    return Err(e);
                }
            }
        }
        let set_count = shared.config.buffer_count.max(1) as usize;
        Ok(Self {
            shared,
            engines,
            containers,
            next_set: 0,
            token_states: vec![SyncToken::ZERO; set_count],
            rotation: 0,
        })
    }

    /// `true` when a rotation would make progress. Clears a pending wake
    /// request.
    fn take_work(&self, queue: &mut QueueState) -> bool {
        let wake = std::mem::take(&mut queue.wake_requested);
        wake || queue.requests.has_pending() || !self.shared.ledger.all_completed()
    }

    /// Parks until there is work. Returns `false` once the loader stops.
    fn wait_for_work(&self) -> bool {
        let mut queue = self.shared.lock_queue();
        loop {
            if !queue.running {
                return false;
            }
            if self.take_work(&mut queue) {
                return true;
            }
            queue = self
                .shared
                .queue_cond
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Runs one rotation if there is work. Returns whether it ran.
    pub fn pump(&mut self) -> bool {
        let has_work = {
            let mut queue = self.shared.lock_queue();
            queue.running && self.take_work(&mut queue)
        };
        if has_work {
            self.step();
        }
        has_work
    }

    /// Thread body.
    pub fn run(mut self) {
        log::info!(
            "Streamer: thread started ({} node(s), {} resource set(s) of {} bytes)",
            self.engines.len(),
            self.token_states.len(),
            self.shared.config.effective_staging_size()
        );
        while self.wait_for_work() {
            self.step();
        }
        self.finish();
        log::info!("Streamer: thread stopped");
    }

    /// One rotation: recycle the next set, publish what it completed, drain
    /// every queue into it, submit, and publish what was submitted.
    pub fn step(&mut self) {
        let shared = Arc::clone(&self.shared);
        let device = &*shared.device;

        self.next_set = (self.next_set + 1) % self.token_states.len();
        self.rotation += 1;
        let set = self.next_set;

        let mut recycled = 0usize;
        for engine in &mut self.engines {
            match engine.wait_and_reset(device, set, true) {
                Ok(freed) => recycled += freed.unwrap_or(0),
                Err(e) => log::error!(
                    "Streamer: node {} failed to recycle set {set}: {e}",
                    engine.node_index()
                ),
            }
        }
        shared.ledger.publish_completed(self.token_states[set]);
        log::trace!(
            "Streamer: rotation {} on set {set}, completed {:?}",
            self.rotation,
            shared.ledger.last_completed()
        );

        let mut records = Vec::new();
        for node in 0..self.engines.len() as u32 {
            let mut ctx = UploadContext {
                device,
                engine: &mut self.engines[node as usize],
                set,
                containers: &self.containers,
                caps: shared.caps,
            };
            let mut node_token = SyncToken::ZERO;
            let mut resolve = |priority: LoadPriority,
                               queued: &QueuedRequest,
                               result: UploadResult,
                               pending: usize| {
                if result.is_resolved() {
                    assert!(
                        queued.wait_index > node_token[priority],
                        "{priority:?} request #{} resolved after #{}",
                        queued.wait_index,
                        node_token[priority]
                    );
                    node_token[priority] = queued.wait_index;
                }
                records.push(DispatchRecord {
                    node,
                    priority,
                    kind: queued.request.kind(),
                    wait_index: queued.wait_index,
                    result,
                    pending_at_dispatch: pending,
                    rotation: self.rotation,
                });
            };

            // Update requests reference producer-filled memory: run the
            // whole batch, in order.
            let batch = shared.lock_queue().requests.take_update_lane(node);
            let batch_len = batch.len();
            for (i, mut queued) in batch.into_iter().enumerate() {
                let result = dispatch(&mut ctx, &queued);
                assert!(
                    result != UploadResult::StagingBufferFull,
                    "update request #{} ran out of staging memory",
                    queued.wait_index
                );
                resolve(LoadPriority::Update, &queued, result, batch_len - i);
                if let Some(buffer) = queued.upload_buffer.take() {
                    ctx.engine.adopt_temporary(set, buffer);
                }
            }

            // Load requests leave their lane only once resolved.
            for priority in [LoadPriority::Normal, LoadPriority::Low] {
                loop {
                    let (queued, pending) = {
                        let mut queue = shared.lock_queue();
                        let pending = queue.requests.pending(node, priority);
                        match queue.requests.checkout(node, priority) {
                            Some(queued) => (queued, pending),
                            None => break,
                        }
                    };
                    let result = dispatch(&mut ctx, &queued);
                    resolve(priority, &queued, result, pending);
                    let mut queue = shared.lock_queue();
                    if result.is_resolved() {
                        queue.requests.commit(node, priority);
                    } else {
                        log::debug!(
                            "Streamer: {} request #{} waits for the next rotation",
                            queued.request.kind(),
                            queued.wait_index
                        );
                        queue.requests.give_back(node, priority, queued);
                        break;
                    }
                }
            }
        }

        for engine in &mut self.engines {
            if let Err(e) = engine.flush(device, set) {
                log::error!(
                    "Streamer: node {} failed to submit set {set}: {e}",
                    engine.node_index()
                );
            }
        }
        {
            let mut fences = shared.last_fences.lock().unwrap_or_else(PoisonError::into_inner);
            for engine in &self.engines {
                fences[engine.node_index() as usize] = engine.last_fence_submitted();
            }
        }

        let next_token = self.resolved_token().max(shared.ledger.last_completed());
        self.token_states[set] = next_token;
        shared.ledger.publish_submitted(next_token);

        let mut stats = shared.lock_stats();
        stats.rotations += 1;
        stats.temporary_buffers += recycled as u64;
        for record in records {
            stats.record(record);
        }
    }

    /// Highest index of every lane below which all requests are resolved.
    ///
    /// Wait indices are shared by every node, so a request still queued on
    /// one node caps its lane even when another node resolved later ones.
    fn resolved_token(&self) -> SyncToken {
        let queue = self.shared.lock_queue();
        let issued = self.shared.ledger.last_issued();
        let mut token = SyncToken::ZERO;
        for priority in LoadPriority::ALL {
            token[priority] = queue
                .requests
                .oldest_pending(priority)
                .map_or(issued[priority], |oldest| oldest - 1);
        }
        token
    }

    /// Drains the device queues, releases every engine and drops what is
    /// still queued.
    pub fn finish(mut self) {
        let shared = Arc::clone(&self.shared);
        let device = &*shared.device;
        for engine in &mut self.engines {
            if let Err(e) = engine.wait_idle(device, self.next_set) {
                log::error!("Streamer: node {} did not drain: {e}", engine.node_index());
            }
        }
        for engine in self.engines.drain(..) {
            engine.destroy(device);
        }

        let dropped = shared.lock_queue().requests.drain_all();
        if !dropped.is_empty() {
            log::warn!(
                "Streamer: dropping {} queued request(s) at shutdown",
                dropped.len()
            );
        }
        for queued in dropped {
            if let Some(buffer) = queued.upload_buffer {
                if let Err(e) = device.destroy_buffer(buffer) {
                    log::error!("Streamer: failed to free upload buffer {buffer:?}: {e}");
                }
            }
        }

        // Nothing runs after this point; release every waiter.
        let issued = shared.ledger.last_issued();
        shared.ledger.publish_submitted(issued);
        shared.ledger.publish_completed(issued);
    }
}
