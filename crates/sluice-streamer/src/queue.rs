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

//! Per-node, per-lane FIFO queues of upload requests.

use crate::request::QueuedRequest;
use sluice_core::LoadPriority;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct NodeQueues {
    lanes: [VecDeque<QueuedRequest>; LoadPriority::COUNT],
    /// A load request is being dispatched outside the lock.
    checked_out: [bool; LoadPriority::COUNT],
}

/// Pending requests of every node and lane.
///
/// The update lane is drained as a batch. Load lanes hand out one request
/// at a time; the request counts as pending until it is committed, and is
/// put back at the front of its lane when it has to be retried.
#[derive(Debug)]
pub struct RequestQueue {
    nodes: Vec<NodeQueues>,
}

impl RequestQueue {
    /// Empty queues for `node_count` nodes.
    pub fn new(node_count: u32) -> Self {
        Self {
            nodes: (0..node_count).map(|_| NodeQueues::default()).collect(),
        }
    }

    /// Number of nodes served.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Appends `request` to the tail of `node`'s `priority` lane.
    ///
    /// # Panics
    ///
    /// Panics if `node` is out of range; callers validate it beforehand.
    pub fn push(&mut self, node: u32, priority: LoadPriority, request: QueuedRequest) {
        self.nodes[node as usize].lanes[priority.index()].push_back(request);
    }

    /// Moves every update request of `node` out, in submission order.
    pub fn take_update_lane(&mut self, node: u32) -> VecDeque<QueuedRequest> {
        std::mem::take(&mut self.nodes[node as usize].lanes[LoadPriority::Update.index()])
    }

    /// Hands out the front request of a load lane. The lane still reports it
    /// as pending until [`RequestQueue::commit`] or [`RequestQueue::give_back`].
    pub fn checkout(&mut self, node: u32, priority: LoadPriority) -> Option<QueuedRequest> {
        debug_assert!(!priority.is_update());
        let queues = &mut self.nodes[node as usize];
        let lane = priority.index();
        debug_assert!(!queues.checked_out[lane], "lane already has a request in flight");
        let request = queues.lanes[lane].pop_front()?;
        queues.checked_out[lane] = true;
        Some(request)
    }

    /// Marks the checked out request of a lane as resolved.
    pub fn commit(&mut self, node: u32, priority: LoadPriority) {
        self.nodes[node as usize].checked_out[priority.index()] = false;
    }

    /// Returns a checked out request to the front of its lane.
    pub fn give_back(&mut self, node: u32, priority: LoadPriority, request: QueuedRequest) {
        let queues = &mut self.nodes[node as usize];
        queues.checked_out[priority.index()] = false;
        queues.lanes[priority.index()].push_front(request);
    }

    /// Requests waiting in one lane, the checked out one included.
    pub fn pending(&self, node: u32, priority: LoadPriority) -> usize {
        let queues = &self.nodes[node as usize];
        let lane = priority.index();
        queues.lanes[lane].len() + usize::from(queues.checked_out[lane])
    }

    /// `true` if any lane of any node holds a request.
    pub fn has_pending(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.lanes.iter().any(|l| !l.is_empty()) || n.checked_out.iter().any(|&c| c))
    }

    /// Lowest wait index still queued in `priority` on any node.
    pub fn oldest_pending(&self, priority: LoadPriority) -> Option<u64> {
        self.nodes
            .iter()
            .filter_map(|n| n.lanes[priority.index()].front())
            .map(|r| r.wait_index)
            .min()
    }

    /// Removes every queued request. Checked out requests are not included.
    pub fn drain_all(&mut self) -> Vec<QueuedRequest> {
        self.nodes
            .iter_mut()
            .flat_map(|n| n.lanes.iter_mut().flat_map(|l| l.drain(..)))
            .collect()
    }
}
