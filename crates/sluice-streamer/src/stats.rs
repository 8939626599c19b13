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

//! Counters kept by the streaming thread.

use crate::request::{RequestKind, UploadResult};
use sluice_core::LoadPriority;
use std::collections::VecDeque;

/// Dispatch records kept before the oldest are dropped.
pub const DISPATCH_LOG_CAPACITY: usize = 1024;

/// One dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Node the request ran on.
    pub node: u32,
    /// Lane it was queued on.
    pub priority: LoadPriority,
    /// What it was.
    pub kind: RequestKind,
    /// Its wait index.
    pub wait_index: u64,
    /// How it resolved.
    pub result: UploadResult,
    /// Requests left in its lane when it was dispatched, itself included.
    pub pending_at_dispatch: usize,
    /// Rotation it was dispatched in.
    pub rotation: u64,
}

/// Running totals of the streaming thread.
#[derive(Debug, Clone, Default)]
pub struct StreamerStats {
    /// Loop iterations that rotated the resource sets.
    pub rotations: u64,
    /// Requests that recorded commands.
    pub completed: u64,
    /// Requests dropped as invalid.
    pub invalid: u64,
    /// Load requests put back because staging memory ran out.
    pub staging_full_retries: u64,
    /// Temporary staging buffers destroyed on reset.
    pub temporary_buffers: u64,
    /// Most recent dispatches, oldest first.
    pub dispatch_log: VecDeque<DispatchRecord>,
}

impl StreamerStats {
    pub(crate) fn record(&mut self, record: DispatchRecord) {
        match record.result {
            UploadResult::Completed => self.completed += 1,
            UploadResult::InvalidRequest => self.invalid += 1,
            UploadResult::StagingBufferFull => self.staging_full_retries += 1,
        }
        if self.dispatch_log.len() == DISPATCH_LOG_CAPACITY {
            self.dispatch_log.pop_front();
        }
        self.dispatch_log.push_back(record);
    }

    /// Dispatches of `kind`, oldest first.
    pub fn dispatches_of(&self, kind: RequestKind) -> impl Iterator<Item = &DispatchRecord> + '_ {
        self.dispatch_log.iter().filter(move |r| r.kind == kind)
    }
}
